//! Core data models for the capacity controller

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Raw utilization reported for one node in the current cycle
#[derive(Debug, Clone, PartialEq)]
pub struct UtilizationSample {
    pub node_id: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

/// Smoothed CPU and memory utilization for a node
///
/// Serialized as `{"cpu": .., "memory": ..}` so the state file stays
/// compatible with the collector-side tooling that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedValue {
    #[serde(rename = "cpu")]
    pub ewma_cpu: f64,
    #[serde(rename = "memory")]
    pub ewma_mem: f64,
}

impl SmoothedValue {
    pub fn new(ewma_cpu: f64, ewma_mem: f64) -> Self {
        Self { ewma_cpu, ewma_mem }
    }
}

/// A physical node the controller may power-cycle out of band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetMember {
    /// Kubernetes node name
    pub node_id: String,
    /// BMC address used for out-of-band power control
    pub management_address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Capacity label applied to a node each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityLabel {
    /// Node should be serving workload
    Active,
    /// Node stands by, powered off when it carries no workload
    Wait,
    /// Node is overloaded
    High,
}

impl CapacityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityLabel::Active => "active",
            CapacityLabel::Wait => "wait",
            CapacityLabel::High => "high",
        }
    }

    pub const ALL: [CapacityLabel; 3] = [
        CapacityLabel::Active,
        CapacityLabel::Wait,
        CapacityLabel::High,
    ];
}

impl fmt::Display for CapacityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chassis power state reported by the management controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
        }
    }
}

/// Workload pods currently placed on each node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadPlacement {
    pods: HashMap<String, BTreeSet<String>>,
}

impl WorkloadPlacement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pod as running on a node
    pub fn insert(&mut self, node_id: impl Into<String>, pod_id: impl Into<String>) {
        self.pods
            .entry(node_id.into())
            .or_default()
            .insert(pod_id.into());
    }

    /// Number of pods placed on the node
    pub fn pod_count(&self, node_id: &str) -> usize {
        self.pods.get(node_id).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.pods.len()
    }
}

impl<N, P> FromIterator<(N, P)> for WorkloadPlacement
where
    N: Into<String>,
    P: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, P)>>(iter: I) -> Self {
        let mut placement = WorkloadPlacement::new();
        for (node, pod) in iter {
            placement.insert(node, pod);
        }
        placement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_label_rendering() {
        assert_eq!(CapacityLabel::Active.to_string(), "active");
        assert_eq!(CapacityLabel::Wait.as_str(), "wait");
        assert_eq!(
            serde_json::to_string(&CapacityLabel::High).unwrap(),
            "\"high\""
        );
    }

    #[test]
    fn test_smoothed_value_wire_names() {
        let value = SmoothedValue::new(12.5, 40.0);
        let json = serde_json::to_value(value).unwrap();
        assert_eq!(json["cpu"], 12.5);
        assert_eq!(json["memory"], 40.0);
    }

    #[test]
    fn test_workload_placement_dedups_pods() {
        let placement: WorkloadPlacement = vec![
            ("worker-1", "web-0"),
            ("worker-1", "web-0"),
            ("worker-1", "db-0"),
        ]
        .into_iter()
        .collect();

        assert_eq!(placement.pod_count("worker-1"), 2);
        assert_eq!(placement.pod_count("worker-2"), 0);
        assert_eq!(placement.node_count(), 1);
    }
}
