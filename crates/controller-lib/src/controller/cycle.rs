//! One control cycle
//!
//! ingest → smooth → adapt → classify → select → actuate → persist.
//! Every failure along the way is absorbed here: the cycle always runs to
//! completion and reports what happened.

use super::clock::{Clock, SystemClock};
use crate::actuator::{ActionReport, Actuator};
use crate::control::{
    classify, plan_capacity, select, CapacityPlan, ScoredNode, Smoother, ThresholdState,
};
use crate::health::{components, HealthRegistry};
use crate::ingest::{SnapshotIngestor, UtilizationSnapshot};
use crate::models::{CapacityLabel, FleetMember, SmoothedValue, WorkloadPlacement};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::store::{MetricsLog, NodeMetricsRow, SmoothedState, StateStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of a single cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Nodes labeled `high`
    pub overloaded: Vec<String>,
    /// Newly designated primary active node
    pub primary: Option<String>,
    /// Waiting node recruited as extra active capacity
    pub recruited: Option<String>,
    /// Candidates left waiting after the rotation pass
    pub waiting: Vec<String>,
    pub powered_on: Vec<String>,
    pub powered_off: Vec<String>,
    pub skipped_entries: usize,
    pub ingest_errors: usize,
    pub state_errors: usize,
    pub label_failures: usize,
    pub power_failures: usize,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.ingest_errors + self.state_errors + self.label_failures + self.power_failures
    }

    fn absorb(&mut self, node_id: &str, action: ActionReport) {
        if action.powered_on {
            self.powered_on.push(node_id.to_string());
        }
        if action.powered_off {
            self.powered_off.push(node_id.to_string());
        }
        self.label_failures += action.label_failures;
        self.power_failures += action.power_failures;
    }
}

/// The capacity controller
///
/// Owns the adaptive state (thresholds live only for the process lifetime,
/// smoothed values round-trip through the [`StateStore`] every cycle).
pub struct Controller {
    ingestor: SnapshotIngestor,
    store: StateStore,
    actuator: Actuator,
    fleet: Vec<FleetMember>,
    metrics_log: Option<MetricsLog>,
    smoother: Smoother,
    thresholds: ThresholdState,
    clock: Arc<dyn Clock>,
    health: Option<HealthRegistry>,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    cycles: u64,
}

impl Controller {
    pub fn new(
        ingestor: SnapshotIngestor,
        store: StateStore,
        actuator: Actuator,
        fleet: Vec<FleetMember>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            ingestor,
            store,
            actuator,
            fleet,
            metrics_log: None,
            smoother: Smoother::default(),
            thresholds: ThresholdState::new(),
            clock: Arc::new(SystemClock),
            health: None,
            metrics: ControllerMetrics::new(),
            logger,
            cycles: 0,
        }
    }

    /// Append per-node rows to the CSV metrics logs every cycle
    pub fn with_metrics_log(mut self, log: MetricsLog) -> Self {
        self.metrics_log = Some(log);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report component health to a registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_smoother(mut self, smoother: Smoother) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn thresholds(&self) -> &ThresholdState {
        &self.thresholds
    }

    pub fn fleet(&self) -> &[FleetMember] {
        &self.fleet
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run one full cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        self.cycles += 1;
        let mut report = CycleReport {
            cycle: self.cycles,
            ..Default::default()
        };

        let mut state = self.load_state(&mut report);
        let (snapshot, placement) = self.ingest(&mut report).await;

        let scored = self.score(snapshot, &mut state);

        let classification = classify(&scored, &self.fleet);
        for node in &classification.overloaded {
            let action = self.actuator.apply_label(node, CapacityLabel::High).await;
            report.absorb(node, action);
        }
        report.overloaded = classification.overloaded.clone();

        let selection = select(&classification);
        match &selection.primary {
            Some(primary) => {
                let action = self.actuator.ensure_active(&primary.node_id).await;
                report.absorb(&primary.node_id, action);
                report.primary = Some(primary.node_id.clone());

                for node in &selection.waiting {
                    let action = self
                        .actuator
                        .apply_label(&node.node_id, CapacityLabel::Wait)
                        .await;
                    report.absorb(&node.node_id, action);
                }
                report.waiting = selection
                    .waiting
                    .iter()
                    .map(|c| c.node_id.clone())
                    .collect();
            }
            None => info!("No candidate nodes, skipping power management"),
        }

        let primary_smoothed = selection.primary.as_ref().and_then(|primary| {
            scored
                .iter()
                .find(|n| n.sample.node_id == primary.node_id)
                .map(|n| n.smoothed)
        });

        match plan_capacity(&selection, primary_smoothed) {
            CapacityPlan::Hold => {}
            CapacityPlan::Recruit(node) => {
                info!(node = %node.node_id, "Primary node is busy, recruiting waiting node");
                let action = self.actuator.ensure_active(&node.node_id).await;
                report.absorb(&node.node_id, action);
                report.recruited = Some(node.node_id);
            }
            CapacityPlan::Release(nodes) => match &placement {
                Some(placement) => {
                    for node in &nodes {
                        let action = self
                            .actuator
                            .ensure_released(&node.node_id, placement)
                            .await;
                        report.absorb(&node.node_id, action);
                    }
                }
                None => {
                    if !nodes.is_empty() {
                        warn!(
                            nodes = nodes.len(),
                            "Workload placement unknown, not powering off any waiting node"
                        );
                    }
                }
            },
        }

        self.persist_state(&state, &mut report);
        self.publish(&report, started).await;
        report
    }

    fn load_state(&self, report: &mut CycleReport) -> SmoothedState {
        match self.store.load() {
            Ok(state) => {
                if state.is_empty() {
                    debug!("No smoothed history, first samples are taken as-is");
                }
                state
            }
            Err(e) => {
                warn!(error = %e, "Failed to load smoothed state, starting from empty state");
                self.metrics.inc_state_errors();
                report.state_errors += 1;
                SmoothedState::new()
            }
        }
    }

    async fn ingest(
        &self,
        report: &mut CycleReport,
    ) -> (UtilizationSnapshot, Option<WorkloadPlacement>) {
        let snapshot = match self.ingestor.read_utilization().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Failed to read utilization snapshot");
                report.ingest_errors += 1;
                UtilizationSnapshot::default()
            }
        };
        report.skipped_entries = snapshot.skipped;
        self.metrics.add_skipped_entries(snapshot.skipped);

        let placement = match self.ingestor.read_placement().await {
            Ok(placement) => {
                debug!(nodes = placement.node_count(), "Workload placement loaded");
                Some(placement)
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Failed to read workload placement");
                report.ingest_errors += 1;
                None
            }
        };

        (snapshot, placement)
    }

    /// Smooth every sample, adapt its threshold and record it
    fn score(
        &mut self,
        snapshot: UtilizationSnapshot,
        state: &mut SmoothedState,
    ) -> Vec<ScoredNode> {
        let now = self.clock.now();
        let mut scored = Vec::with_capacity(snapshot.samples.len());

        for sample in snapshot.samples {
            let smoothed: SmoothedValue = self.smoother.update(
                sample.cpu_percent,
                sample.mem_percent,
                state.get(&sample.node_id),
            );
            state.insert(sample.node_id.clone(), smoothed);
            let upper = self.thresholds.adapt(&sample.node_id, smoothed.ewma_cpu);

            self.metrics
                .set_node_signals(&sample.node_id, smoothed.ewma_cpu, smoothed.ewma_mem, upper);
            self.logger.log_node_signals(
                &sample.node_id,
                sample.cpu_percent,
                smoothed.ewma_cpu,
                sample.mem_percent,
                smoothed.ewma_mem,
                upper,
            );

            if let Some(log) = &self.metrics_log {
                let row = NodeMetricsRow {
                    timestamp: now,
                    node_id: &sample.node_id,
                    cpu_util: sample.cpu_percent,
                    ewma_cpu: smoothed.ewma_cpu,
                    upper_threshold: upper,
                };
                if let Err(e) = log.record(&row) {
                    warn!(node = %sample.node_id, error = %e, "Failed to append metrics log");
                }
            }

            scored.push(ScoredNode {
                sample,
                smoothed,
                upper,
            });
        }

        let stale = state.len().saturating_sub(scored.len());
        if stale > 0 {
            debug!(stale, "Carrying forward smoothed state of non-reporting nodes");
        }

        scored
    }

    fn persist_state(&self, state: &SmoothedState, report: &mut CycleReport) {
        if let Err(e) = self.store.save(state) {
            warn!(error = %e, "Failed to persist smoothed state");
            self.metrics.inc_state_errors();
            report.state_errors += 1;
        }
    }

    async fn publish(&self, report: &CycleReport, started: Instant) {
        let active =
            usize::from(report.primary.is_some()) + usize::from(report.recruited.is_some());
        let waiting = report
            .waiting
            .len()
            .saturating_sub(usize::from(report.recruited.is_some()));
        self.metrics.set_label_count(CapacityLabel::Active, active);
        self.metrics.set_label_count(CapacityLabel::Wait, waiting);
        self.metrics
            .set_label_count(CapacityLabel::High, report.overloaded.len());
        self.metrics.observe_cycle(started.elapsed().as_secs_f64());

        self.logger.log_cycle(
            report.cycle,
            report.primary.as_deref(),
            &report.overloaded,
            &report.waiting,
            report.failures(),
        );

        if let Some(health) = &self.health {
            health
                .record_cycle(
                    components::INGESTOR,
                    report.ingest_errors,
                    "snapshot read failed",
                )
                .await;
            health
                .record_cycle(
                    components::ACTUATOR,
                    report.label_failures + report.power_failures,
                    "label or power command failed",
                )
                .await;
            health
                .record_cycle(
                    components::STATE_STORE,
                    report.state_errors,
                    "state load or save failed",
                )
                .await;
        }
    }
}
