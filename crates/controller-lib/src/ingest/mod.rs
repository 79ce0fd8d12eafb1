//! Snapshot ingestion
//!
//! Reads the utilization and workload-placement snapshots written by the
//! external metrics collector. Invalid entries are dropped one by one; only
//! an unreadable or undecodable file fails the whole read.

mod prometheus;

pub use prometheus::{decode_vector, DecodedVector, VectorSample};

use crate::error::{ControllerError, Result};
use crate::models::{UtilizationSample, WorkloadPlacement};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CPU_SNAPSHOT_FILE: &str = "node_cpu.json";
pub const MEMORY_SNAPSHOT_FILE: &str = "node_memory.json";
pub const WORKLOAD_SNAPSHOT_FILE: &str = "workload_pods.json";

/// Locations of the snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub cpu: PathBuf,
    pub memory: PathBuf,
    pub workload: PathBuf,
}

impl SnapshotPaths {
    /// Default file names inside a data directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            cpu: dir.join(CPU_SNAPSHOT_FILE),
            memory: dir.join(MEMORY_SNAPSHOT_FILE),
            workload: dir.join(WORKLOAD_SNAPSHOT_FILE),
        }
    }
}

/// Valid utilization samples for one cycle
#[derive(Debug, Clone, Default)]
pub struct UtilizationSnapshot {
    /// Samples in first-seen order
    pub samples: Vec<UtilizationSample>,
    /// Entries dropped because they were malformed or out of range
    pub skipped: usize,
    /// Nodes dropped because they are control-plane nodes
    pub control_plane: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct PartialSample {
    cpu: Option<f64>,
    mem: Option<f64>,
}

/// Reads and validates collector snapshots
#[derive(Debug, Clone)]
pub struct SnapshotIngestor {
    paths: SnapshotPaths,
    /// Node names containing any of these are treated as control plane
    control_plane_markers: Vec<String>,
}

impl SnapshotIngestor {
    pub fn new(paths: SnapshotPaths, control_plane_markers: Vec<String>) -> Self {
        Self {
            paths,
            control_plane_markers,
        }
    }

    fn is_control_plane(&self, node_id: &str) -> bool {
        self.control_plane_markers
            .iter()
            .any(|marker| !marker.is_empty() && node_id.contains(marker.as_str()))
    }

    /// Read CPU and memory snapshots and merge them per node
    ///
    /// A node is kept only if it has both a CPU and a memory value, both
    /// non-negative, and is not a control-plane node.
    pub async fn read_utilization(&self) -> Result<UtilizationSnapshot> {
        let cpu = read_vector(&self.paths.cpu).await?;
        let mem = read_vector(&self.paths.memory).await?;

        let mut snapshot = UtilizationSnapshot {
            skipped: cpu.malformed + mem.malformed,
            ..Default::default()
        };

        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, PartialSample> = HashMap::new();

        for (decoded, is_cpu) in [(&cpu, true), (&mem, false)] {
            for sample in &decoded.samples {
                let Some(node) = sample.label("node") else {
                    snapshot.skipped += 1;
                    continue;
                };
                let value = match sample.number() {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(node = %node, error = %e, "Skipping malformed sample");
                        snapshot.skipped += 1;
                        continue;
                    }
                };

                let entry = merged.entry(node.to_string()).or_insert_with(|| {
                    order.push(node.to_string());
                    PartialSample::default()
                });
                if is_cpu {
                    entry.cpu = Some(value);
                } else {
                    entry.mem = Some(value);
                }
            }
        }

        for node in order {
            let partial = merged[&node];
            let (Some(cpu), Some(mem)) = (partial.cpu, partial.mem) else {
                debug!(node = %node, "Skipping node with incomplete metrics");
                snapshot.skipped += 1;
                continue;
            };
            if cpu < 0.0 || mem < 0.0 {
                debug!(node = %node, cpu, mem, "Skipping node with negative metrics");
                snapshot.skipped += 1;
                continue;
            }
            if self.is_control_plane(&node) {
                snapshot.control_plane += 1;
                continue;
            }
            snapshot.samples.push(UtilizationSample {
                node_id: node,
                cpu_percent: cpu,
                mem_percent: mem,
            });
        }

        Ok(snapshot)
    }

    /// Read the workload-placement snapshot
    ///
    /// Entries without both a node and a pod label are skipped.
    pub async fn read_placement(&self) -> Result<WorkloadPlacement> {
        let decoded = read_vector(&self.paths.workload).await?;

        let placement: WorkloadPlacement = decoded
            .samples
            .iter()
            .filter_map(|s| Some((s.label("node")?, s.label("pod")?)))
            .collect();
        Ok(placement)
    }
}

async fn read_vector(path: &Path) -> Result<DecodedVector> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ControllerError::SnapshotRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    decode_vector(&path.display().to_string(), &bytes)
}
