//! Partition nodes into overloaded, standby and powered-off candidates

use crate::models::{FleetMember, SmoothedValue, UtilizationSample};
use std::collections::HashSet;

/// A reporting node after smoothing and threshold adaptation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode {
    pub sample: UtilizationSample,
    pub smoothed: SmoothedValue,
    pub upper: f64,
}

impl ScoredNode {
    pub fn is_overloaded(&self) -> bool {
        self.smoothed.ewma_cpu >= self.upper || self.smoothed.ewma_mem >= self.upper
    }
}

/// A node eligible to become active or be left waiting
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node_id: String,
    /// Raw `(cpu, mem)` for reporting nodes, `None` for powered-off ones
    pub utilization: Option<(f64, f64)>,
}

impl Candidate {
    pub fn reporting(node_id: impl Into<String>, cpu: f64, mem: f64) -> Self {
        Self {
            node_id: node_id.into(),
            utilization: Some((cpu, mem)),
        }
    }

    pub fn powered_off(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            utilization: None,
        }
    }

    pub fn is_reporting(&self) -> bool {
        self.utilization.is_some()
    }
}

/// Result of classifying one cycle's nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// Nodes at or over their threshold, in enumeration order
    pub overloaded: Vec<String>,
    /// Reporting nodes under their threshold, in enumeration order
    pub standby: Vec<Candidate>,
    /// Fleet members absent from metrics, in fleet declaration order
    pub powered_off: Vec<Candidate>,
}

/// Classify scored nodes against their thresholds and add silent fleet members
pub fn classify(scored: &[ScoredNode], fleet: &[FleetMember]) -> Classification {
    let mut classification = Classification::default();

    for node in scored {
        if node.is_overloaded() {
            classification.overloaded.push(node.sample.node_id.clone());
        } else {
            classification.standby.push(Candidate::reporting(
                node.sample.node_id.clone(),
                node.sample.cpu_percent,
                node.sample.mem_percent,
            ));
        }
    }

    let reporting: HashSet<&str> = scored.iter().map(|n| n.sample.node_id.as_str()).collect();
    classification.powered_off = fleet
        .iter()
        .filter(|member| !reporting.contains(member.node_id.as_str()))
        .map(|member| Candidate::powered_off(member.node_id.clone()))
        .collect();

    classification
}
