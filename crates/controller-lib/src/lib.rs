//! Adaptive-capacity controller for a fleet of worker nodes
//!
//! Each cycle reads node utilization snapshots, smooths them, adapts a
//! per-node overload threshold, picks one node to carry new workload and
//! powers idle standby nodes on or off out of band:
//! - Snapshot ingestion (`ingest`)
//! - Smoothing, thresholds, classification and selection (`control`)
//! - Node labels and chassis power (`actuator`)
//! - Smoothed-state persistence and CSV metric logs (`store`)
//! - The cycle and its periodic loop (`controller`)
//! - Health checks and observability

pub mod actuator;
pub mod control;
pub mod controller;
pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod store;

pub use error::{ControllerError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
