//! Applying capacity decisions to the environment
//!
//! Labels go through a [`LabelClient`], power transitions through a
//! [`PowerClient`]. The [`Actuator`] combines both into idempotent
//! operations and never lets a failure escape: every error is logged,
//! counted, and reported back in an [`ActionReport`].

#[cfg(test)]
pub(crate) mod fake;
mod ipmi;
mod kube_label;

pub use ipmi::{parse_power_status, IpmiPowerClient, DEFAULT_IPMI_TIMEOUT};
pub use kube_label::{label_patch, KubeLabelClient, DEFAULT_LABEL_KEY};

use crate::error::Result;
use crate::models::{CapacityLabel, FleetMember, PowerState, WorkloadPlacement};
use crate::observability::{ControllerMetrics, StructuredLogger};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sets the capacity label on a node, overwriting any previous value
#[async_trait]
pub trait LabelClient: Send + Sync {
    async fn set_label(&self, node_id: &str, label: CapacityLabel) -> Result<()>;
}

/// Out-of-band chassis power control
#[async_trait]
pub trait PowerClient: Send + Sync {
    async fn power_status(&self, member: &FleetMember) -> Result<PowerState>;

    async fn power_on(&self, member: &FleetMember) -> Result<()>;

    async fn power_off(&self, member: &FleetMember) -> Result<()>;
}

/// What an actuator operation did to a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionReport {
    pub powered_on: bool,
    pub powered_off: bool,
    pub labeled: Option<CapacityLabel>,
    pub label_failures: usize,
    pub power_failures: usize,
}

impl ActionReport {
    pub fn failures(&self) -> usize {
        self.label_failures + self.power_failures
    }
}

/// Label and power actuator for the managed fleet
pub struct Actuator {
    labels: Arc<dyn LabelClient>,
    power: Arc<dyn PowerClient>,
    fleet: HashMap<String, FleetMember>,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
}

impl Actuator {
    pub fn new(
        labels: Arc<dyn LabelClient>,
        power: Arc<dyn PowerClient>,
        fleet: &[FleetMember],
        logger: StructuredLogger,
    ) -> Self {
        Self {
            labels,
            power,
            fleet: fleet
                .iter()
                .map(|m| (m.node_id.clone(), m.clone()))
                .collect(),
            metrics: ControllerMetrics::new(),
            logger,
        }
    }

    /// Fleet entry for a node, if it is under out-of-band management
    pub fn member(&self, node_id: &str) -> Option<&FleetMember> {
        self.fleet.get(node_id)
    }

    /// Make sure a node is powered on and labeled `active`
    ///
    /// A failed status query counts as "not on", so power-on may be sent to
    /// a node that is already up; power-on is idempotent on the BMC side.
    pub async fn ensure_active(&self, node_id: &str) -> ActionReport {
        let mut report = ActionReport::default();

        match self.member(node_id) {
            Some(member) => {
                if self.query_power(member, &mut report).await != Some(PowerState::On) {
                    info!(node = %node_id, "Node is not powered on, powering on");
                    self.issue_power_on(member, &mut report).await;
                }
            }
            None => debug!(node = %node_id, "Node is not under power management, labeling only"),
        }

        self.label(node_id, CapacityLabel::Active, &mut report).await;
        report
    }

    /// Power a standby node off if it carries no workload, and label it `wait`
    ///
    /// A node with placed workload pods is never powered off. A node whose
    /// status cannot be read is left alone.
    pub async fn ensure_released(
        &self,
        node_id: &str,
        placement: &WorkloadPlacement,
    ) -> ActionReport {
        let mut report = ActionReport::default();

        let pods = placement.pod_count(node_id);
        if pods > 0 {
            info!(node = %node_id, pods, "Node still hosts workload pods, keeping it powered");
        } else if let Some(member) = self.member(node_id) {
            if self.query_power(member, &mut report).await == Some(PowerState::On) {
                info!(node = %node_id, "Standby node has no workload pods, powering off");
                self.issue_power_off(member, &mut report).await;
            }
        } else {
            debug!(node = %node_id, "Node is not under power management, labeling only");
        }

        self.label(node_id, CapacityLabel::Wait, &mut report).await;
        report
    }

    /// Apply a label without touching power
    pub async fn apply_label(&self, node_id: &str, label: CapacityLabel) -> ActionReport {
        let mut report = ActionReport::default();
        self.label(node_id, label, &mut report).await;
        report
    }

    async fn label(&self, node_id: &str, label: CapacityLabel, report: &mut ActionReport) {
        match self.labels.set_label(node_id, label).await {
            Ok(()) => {
                self.logger.log_label(node_id, label, None);
                report.labeled = Some(label);
            }
            Err(e) => {
                self.logger.log_label(node_id, label, Some(&e.to_string()));
                self.metrics.inc_label_errors();
                report.label_failures += 1;
            }
        }
    }

    async fn query_power(
        &self,
        member: &FleetMember,
        report: &mut ActionReport,
    ) -> Option<PowerState> {
        match self.power.power_status(member).await {
            Ok(state) => {
                debug!(node = %member.node_id, power = %state, "Power status");
                Some(state)
            }
            Err(e) => {
                warn!(
                    node = %member.node_id,
                    error = %e,
                    kind = e.kind(),
                    "Power status query failed"
                );
                self.metrics.inc_power_errors();
                report.power_failures += 1;
                None
            }
        }
    }

    async fn issue_power_on(&self, member: &FleetMember, report: &mut ActionReport) {
        match self.power.power_on(member).await {
            Ok(()) => {
                self.logger.log_power_action(&member.node_id, "power_on", None);
                self.metrics.inc_power_action("power_on");
                report.powered_on = true;
            }
            Err(e) => {
                self.logger
                    .log_power_action(&member.node_id, "power_on", Some(&e.to_string()));
                self.metrics.inc_power_errors();
                report.power_failures += 1;
            }
        }
    }

    async fn issue_power_off(&self, member: &FleetMember, report: &mut ActionReport) {
        match self.power.power_off(member).await {
            Ok(()) => {
                self.logger.log_power_action(&member.node_id, "power_off", None);
                self.metrics.inc_power_action("power_off");
                report.powered_off = true;
            }
            Err(e) => {
                self.logger
                    .log_power_action(&member.node_id, "power_off", Some(&e.to_string()));
                self.metrics.inc_power_errors();
                report.power_failures += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{FakeLabelClient, FakePowerClient, PowerCommand};
    use super::*;

    fn member(node: &str) -> FleetMember {
        FleetMember {
            node_id: node.to_string(),
            management_address: format!("bmc-{node}"),
            username: "ADMIN".to_string(),
            password: "admin".to_string(),
        }
    }

    fn actuator(labels: Arc<FakeLabelClient>, power: Arc<FakePowerClient>) -> Actuator {
        Actuator::new(
            labels,
            power,
            &[member("a"), member("b")],
            StructuredLogger::new("test"),
        )
    }

    #[tokio::test]
    async fn test_ensure_active_powers_on_off_node() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(FakePowerClient::new().with_state("a", PowerState::Off));
        let actuator = actuator(labels.clone(), power.clone());

        let report = actuator.ensure_active("a").await;

        assert!(report.powered_on);
        assert_eq!(report.labeled, Some(CapacityLabel::Active));
        assert_eq!(power.commands(), vec![("a".to_string(), PowerCommand::On)]);
        assert_eq!(power.state("a"), Some(PowerState::On));
        assert_eq!(labels.label("a"), Some(CapacityLabel::Active));
    }

    #[tokio::test]
    async fn test_ensure_active_skips_power_on_when_already_on() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(FakePowerClient::new().with_state("a", PowerState::On));
        let actuator = actuator(labels.clone(), power.clone());

        let report = actuator.ensure_active("a").await;

        assert!(!report.powered_on);
        assert!(power.commands().is_empty());
        assert_eq!(labels.label("a"), Some(CapacityLabel::Active));
    }

    #[tokio::test]
    async fn test_failed_status_query_counts_as_not_on() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(
            FakePowerClient::new()
                .with_state("a", PowerState::On)
                .failing_status("a"),
        );
        let actuator = actuator(labels.clone(), power.clone());

        let report = actuator.ensure_active("a").await;

        assert_eq!(report.power_failures, 1);
        assert!(report.powered_on);
        assert_eq!(power.commands(), vec![("a".to_string(), PowerCommand::On)]);
    }

    #[tokio::test]
    async fn test_unmanaged_node_is_labeled_without_power_actions() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(FakePowerClient::new());
        let actuator = actuator(labels.clone(), power.clone());

        let report = actuator.ensure_active("not-in-fleet").await;

        assert!(!report.powered_on);
        assert!(power.commands().is_empty());
        assert!(power.status_queries().is_empty());
        assert_eq!(labels.label("not-in-fleet"), Some(CapacityLabel::Active));
    }

    #[tokio::test]
    async fn test_ensure_released_powers_off_idle_node() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(FakePowerClient::new().with_state("b", PowerState::On));
        let actuator = actuator(labels.clone(), power.clone());

        let report = actuator.ensure_released("b", &WorkloadPlacement::new()).await;

        assert!(report.powered_off);
        assert_eq!(power.commands(), vec![("b".to_string(), PowerCommand::Off)]);
        assert_eq!(labels.label("b"), Some(CapacityLabel::Wait));
    }

    #[tokio::test]
    async fn test_ensure_released_never_powers_off_node_with_pods() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(FakePowerClient::new().with_state("b", PowerState::On));
        let actuator = actuator(labels.clone(), power.clone());
        let placement: WorkloadPlacement = vec![("b", "web-0")].into_iter().collect();

        let report = actuator.ensure_released("b", &placement).await;

        assert!(!report.powered_off);
        assert!(power.commands().is_empty());
        assert!(power.status_queries().is_empty());
        assert_eq!(power.state("b"), Some(PowerState::On));
        assert_eq!(labels.label("b"), Some(CapacityLabel::Wait));
    }

    #[tokio::test]
    async fn test_ensure_released_leaves_off_or_unknown_nodes_alone() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(
            FakePowerClient::new()
                .with_state("a", PowerState::Off)
                .with_state("b", PowerState::On)
                .failing_status("b"),
        );
        let actuator = actuator(labels.clone(), power.clone());

        let off = actuator.ensure_released("a", &WorkloadPlacement::new()).await;
        let unknown = actuator.ensure_released("b", &WorkloadPlacement::new()).await;

        assert!(!off.powered_off);
        assert!(!unknown.powered_off);
        assert_eq!(unknown.power_failures, 1);
        assert!(power.commands().is_empty());
    }

    #[tokio::test]
    async fn test_label_failure_is_reported_not_raised() {
        let labels = Arc::new(FakeLabelClient::new().failing("a"));
        let power = Arc::new(FakePowerClient::new());
        let actuator = actuator(labels.clone(), power);

        let report = actuator.apply_label("a", CapacityLabel::High).await;

        assert_eq!(report.label_failures, 1);
        assert_eq!(report.labeled, None);
        assert_eq!(labels.label("a"), None);
    }

    #[tokio::test]
    async fn test_power_on_failure_is_reported() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(
            FakePowerClient::new()
                .with_state("a", PowerState::Off)
                .failing_commands("a"),
        );
        let actuator = actuator(labels.clone(), power.clone());

        let report = actuator.ensure_active("a").await;

        assert!(!report.powered_on);
        assert_eq!(report.power_failures, 1);
        assert_eq!(power.state("a"), Some(PowerState::Off));
        assert_eq!(labels.label("a"), Some(CapacityLabel::Active));
    }

    #[tokio::test]
    async fn test_repeated_wait_label_is_idempotent() {
        let labels = Arc::new(FakeLabelClient::new());
        let power = Arc::new(FakePowerClient::new());
        let actuator = actuator(labels.clone(), power);

        actuator.apply_label("a", CapacityLabel::Wait).await;
        let once = labels.snapshot();
        actuator.apply_label("a", CapacityLabel::Wait).await;

        assert_eq!(labels.snapshot(), once);
    }
}
