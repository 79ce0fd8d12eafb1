//! Control loop
//!
//! Runs the controller on a fixed interval. A cycle always runs to
//! completion; once shutdown is signalled no new cycle is started.

use super::Controller;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Default pause between the start of two cycles
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic driver for a [`Controller`]
pub struct ControlLoop {
    controller: Controller,
    interval: Duration,
}

impl ControlLoop {
    pub fn new(controller: Controller, interval: Duration) -> Self {
        Self {
            controller,
            interval,
        }
    }

    /// Run cycles until shutdown is signalled; the first cycle starts
    /// immediately. Returns the controller so its state can be inspected.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Controller {
        info!(
            interval_secs = self.interval.as_secs(),
            fleet_size = self.controller.fleet().len(),
            "Starting control loop"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!(cycles = self.controller.cycles(), "Shutting down control loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.controller.run_cycle().await;
                }
            }
        }

        self.controller
    }
}

/// Builder for creating the control loop
pub struct ControlLoopBuilder {
    controller: Option<Controller>,
    interval: Duration,
}

impl ControlLoopBuilder {
    /// Create a new builder with the default interval
    pub fn new() -> Self {
        Self {
            controller: None,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the controller to drive
    pub fn controller(mut self, controller: Controller) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Set the poll interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Build the control loop
    pub fn build(self) -> Result<ControlLoop> {
        let controller = self
            .controller
            .ok_or_else(|| anyhow::anyhow!("Controller is required"))?;
        if self.interval.is_zero() {
            anyhow::bail!("Poll interval must be greater than zero");
        }

        Ok(ControlLoop::new(controller, self.interval))
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
