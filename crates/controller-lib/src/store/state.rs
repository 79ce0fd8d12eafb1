//! Persisted smoothed state
//!
//! The smoothed values survive restarts in a small JSON document
//! `{node: {"cpu": f64, "memory": f64}}` which is rewritten every cycle via
//! temp-file, fsync and rename so readers never see a partial write.

use crate::error::{ControllerError, Result};
use crate::models::SmoothedValue;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const STATE_FILE: &str = "ewma_metrics.json";

/// Smoothed utilization per node
///
/// Entries are carried forward when a node stops reporting; nothing is
/// ever pruned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmoothedState {
    nodes: BTreeMap<String, SmoothedValue>,
}

impl SmoothedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node_id: &str) -> Option<SmoothedValue> {
        self.nodes.get(node_id).copied()
    }

    pub fn insert(&mut self, node_id: impl Into<String>, value: SmoothedValue) {
        self.nodes.insert(node_id.into(), value);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// File-backed store for [`SmoothedState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store using the default file name inside a data directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state
    ///
    /// A missing file is a fresh start and yields an empty state; an
    /// unreadable or corrupt file is an error for the caller to fall back on.
    pub fn load(&self) -> Result<SmoothedState> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted state, starting fresh");
                return Ok(SmoothedState::new());
            }
            Err(e) => {
                return Err(ControllerError::StateRead {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let nodes: BTreeMap<String, SmoothedValue> =
            serde_json::from_slice(&data).map_err(|e| ControllerError::StateRead {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        Ok(SmoothedState { nodes })
    }

    /// Atomically replace the persisted state
    pub fn save(&self, state: &SmoothedState) -> Result<()> {
        let write_err = |source: std::io::Error| ControllerError::StateWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_vec_pretty(&state.nodes)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(write_err)?;
        file.write_all(&json).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;

        std::fs::rename(&temp_path, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), nodes = state.len(), "Smoothed state persisted");
        Ok(())
    }
}
