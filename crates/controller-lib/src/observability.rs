//! Observability infrastructure for the capacity controller
//!
//! Provides:
//! - Prometheus metrics (cycle latency, actuation counters, per-node signals)
//! - Structured JSON logging with tracing

use crate::models::CapacityLabel;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds); a cycle is bounded by
/// a handful of external calls with multi-second timeouts
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ControllerMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    skipped_entries_total: IntCounter,
    label_errors_total: IntCounter,
    power_errors_total: IntCounter,
    state_errors_total: IntCounter,
    power_actions_total: IntCounterVec,
    node_ewma_cpu: GaugeVec,
    node_ewma_memory: GaugeVec,
    node_upper_threshold: GaugeVec,
    nodes_by_label: IntGaugeVec,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "capacity_controller_cycle_duration_seconds",
                "Time spent running one full control cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter!(
                "capacity_controller_cycles_total",
                "Total number of completed control cycles"
            )
            .expect("Failed to register cycles_total"),

            skipped_entries_total: register_int_counter!(
                "capacity_controller_skipped_entries_total",
                "Snapshot entries dropped as malformed or out of range"
            )
            .expect("Failed to register skipped_entries_total"),

            label_errors_total: register_int_counter!(
                "capacity_controller_label_errors_total",
                "Total number of failed node label updates"
            )
            .expect("Failed to register label_errors_total"),

            power_errors_total: register_int_counter!(
                "capacity_controller_power_errors_total",
                "Total number of failed power status queries or commands"
            )
            .expect("Failed to register power_errors_total"),

            state_errors_total: register_int_counter!(
                "capacity_controller_state_errors_total",
                "Total number of smoothed state load or save failures"
            )
            .expect("Failed to register state_errors_total"),

            power_actions_total: register_int_counter_vec!(
                "capacity_controller_power_actions_total",
                "Power commands issued, by action",
                &["action"]
            )
            .expect("Failed to register power_actions_total"),

            node_ewma_cpu: register_gauge_vec!(
                "capacity_controller_node_ewma_cpu_percent",
                "Smoothed CPU utilization per node",
                &["node"]
            )
            .expect("Failed to register node_ewma_cpu"),

            node_ewma_memory: register_gauge_vec!(
                "capacity_controller_node_ewma_memory_percent",
                "Smoothed memory utilization per node",
                &["node"]
            )
            .expect("Failed to register node_ewma_memory"),

            node_upper_threshold: register_gauge_vec!(
                "capacity_controller_node_upper_threshold_percent",
                "Adaptive overload threshold per node",
                &["node"]
            )
            .expect("Failed to register node_upper_threshold"),

            nodes_by_label: register_int_gauge_vec!(
                "capacity_controller_nodes_by_label",
                "Nodes assigned each capacity label in the last cycle",
                &["label"]
            )
            .expect("Failed to register nodes_by_label"),
        }
    }
}

/// Controller metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a completed cycle and its duration
    pub fn observe_cycle(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
        self.inner().cycles_total.inc();
    }

    pub fn add_skipped_entries(&self, count: usize) {
        self.inner().skipped_entries_total.inc_by(count as u64);
    }

    pub fn inc_label_errors(&self) {
        self.inner().label_errors_total.inc();
    }

    pub fn inc_power_errors(&self) {
        self.inner().power_errors_total.inc();
    }

    pub fn inc_state_errors(&self) {
        self.inner().state_errors_total.inc();
    }

    /// Count an issued power command (`power_on` / `power_off`)
    pub fn inc_power_action(&self, action: &str) {
        self.inner()
            .power_actions_total
            .with_label_values(&[action])
            .inc();
    }

    /// Publish the smoothed signals and threshold of a node
    pub fn set_node_signals(&self, node: &str, ewma_cpu: f64, ewma_mem: f64, upper: f64) {
        let inner = self.inner();
        inner.node_ewma_cpu.with_label_values(&[node]).set(ewma_cpu);
        inner.node_ewma_memory.with_label_values(&[node]).set(ewma_mem);
        inner.node_upper_threshold.with_label_values(&[node]).set(upper);
    }

    /// Publish how many nodes ended the cycle with a given label
    pub fn set_label_count(&self, label: CapacityLabel, count: usize) {
        self.inner()
            .nodes_by_label
            .with_label_values(&[label.as_str()])
            .set(count as i64);
    }
}

/// Structured logger for controller events
///
/// Provides consistent JSON-formatted logging for labeling, power actions
/// and cycle summaries.
#[derive(Clone)]
pub struct StructuredLogger {
    controller_id: String,
}

impl StructuredLogger {
    pub fn new(controller_id: impl Into<String>) -> Self {
        Self {
            controller_id: controller_id.into(),
        }
    }

    /// Log a node's smoothed signals for the cycle
    pub fn log_node_signals(
        &self,
        node: &str,
        cpu: f64,
        ewma_cpu: f64,
        mem: f64,
        ewma_mem: f64,
        upper: f64,
    ) {
        info!(
            event = "node_signals",
            controller = %self.controller_id,
            node = %node,
            cpu = cpu,
            ewma_cpu = ewma_cpu,
            memory = mem,
            ewma_memory = ewma_mem,
            upper_threshold = upper,
            "Node utilization smoothed"
        );
    }

    /// Log a label update
    pub fn log_label(&self, node: &str, label: CapacityLabel, error: Option<&str>) {
        match error {
            None => info!(
                event = "label_applied",
                controller = %self.controller_id,
                node = %node,
                label = %label,
                "Node labeled"
            ),
            Some(error) => warn!(
                event = "label_failed",
                controller = %self.controller_id,
                node = %node,
                label = %label,
                error = %error,
                "Failed to label node"
            ),
        }
    }

    /// Log a power command
    pub fn log_power_action(&self, node: &str, action: &str, error: Option<&str>) {
        match error {
            None => info!(
                event = "power_action",
                controller = %self.controller_id,
                node = %node,
                action = %action,
                "Power command issued"
            ),
            Some(error) => warn!(
                event = "power_action_failed",
                controller = %self.controller_id,
                node = %node,
                action = %action,
                error = %error,
                "Power command failed"
            ),
        }
    }

    /// Log a completed cycle
    pub fn log_cycle(
        &self,
        cycle: u64,
        primary: Option<&str>,
        overloaded: &[String],
        waiting: &[String],
        failures: usize,
    ) {
        info!(
            event = "cycle_complete",
            controller = %self.controller_id,
            cycle = cycle,
            primary = ?primary,
            overloaded = ?overloaded,
            waiting = ?waiting,
            failures = failures,
            "Control cycle complete"
        );
    }

    /// Log controller startup
    pub fn log_startup(&self, version: &str, fleet_size: usize) {
        info!(
            event = "controller_started",
            controller = %self.controller_id,
            version = %version,
            fleet_size = fleet_size,
            "Capacity controller started"
        );
    }

    /// Log controller shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            controller = %self.controller_id,
            reason = %reason,
            "Capacity controller shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_metrics_creation() {
        let metrics = ControllerMetrics::new();

        metrics.observe_cycle(0.2);
        metrics.add_skipped_entries(3);
        metrics.inc_label_errors();
        metrics.inc_power_errors();
        metrics.inc_state_errors();
        metrics.inc_power_action("power_on");
        metrics.set_node_signals("worker-1", 80.0, 40.0, 45.0);
        metrics.set_label_count(CapacityLabel::Active, 1);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-controller");
        assert_eq!(logger.controller_id, "test-controller");
    }
}
