//! Local persistence: smoothed state and per-cycle metrics logs

mod metrics_log;
mod state;

pub use metrics_log::{
    MetricsLog, NodeMetricsRow, EWMA_LOG_FILE, THRESHOLD_LOG_FILE, UTILIZATION_LOG_FILE,
};
pub use state::{SmoothedState, StateStore, STATE_FILE};
