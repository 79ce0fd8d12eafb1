//! Per-node adaptive overload threshold
//!
//! Nodes that run hot get a progressively stricter threshold and nodes that
//! run cool a progressively more permissive one.

use std::collections::HashMap;

/// Threshold assigned to a node the first time it is seen
pub const INITIAL_THRESHOLD: f64 = 50.0;

/// Smoothed CPU at or above which the threshold tightens
pub const SATURATION_CPU: f64 = 70.0;

const TIGHTEN_FACTOR: f64 = 0.9;
const RELAX_FACTOR: f64 = 1.1;

/// Upper thresholds for every node seen during this process lifetime
#[derive(Debug, Clone, Default)]
pub struct ThresholdState {
    upper: HashMap<String, f64>,
}

impl ThresholdState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapt the threshold of a node to its latest smoothed CPU and return it
    pub fn adapt(&mut self, node_id: &str, ewma_cpu: f64) -> f64 {
        let upper = self
            .upper
            .entry(node_id.to_string())
            .or_insert(INITIAL_THRESHOLD);

        let factor = if ewma_cpu >= SATURATION_CPU {
            TIGHTEN_FACTOR
        } else {
            RELAX_FACTOR
        };
        *upper = (*upper * factor).clamp(0.0, 100.0);
        *upper
    }

    /// Current threshold for a node, if it has been adapted at least once
    pub fn get(&self, node_id: &str) -> Option<f64> {
        self.upper.get(node_id).copied()
    }
}
