//! In-memory label and power clients for tests

use super::{LabelClient, PowerClient};
use crate::error::{ControllerError, Result};
use crate::models::{CapacityLabel, FleetMember, PowerState};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Label store keyed by node
#[derive(Default)]
pub struct FakeLabelClient {
    labels: Mutex<HashMap<String, CapacityLabel>>,
    calls: Mutex<Vec<(String, CapacityLabel)>>,
    failing: HashSet<String>,
}

impl FakeLabelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every label call for this node fails
    pub fn failing(mut self, node: &str) -> Self {
        self.failing.insert(node.to_string());
        self
    }

    pub fn label(&self, node: &str) -> Option<CapacityLabel> {
        self.labels.lock().unwrap().get(node).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, CapacityLabel> {
        self.labels.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(String, CapacityLabel)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelClient for FakeLabelClient {
    async fn set_label(&self, node_id: &str, label: CapacityLabel) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((node_id.to_string(), label));
        if self.failing.contains(node_id) {
            return Err(ControllerError::ExternalCommand {
                command: "label node".to_string(),
                node: node_id.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.labels
            .lock()
            .unwrap()
            .insert(node_id.to_string(), label);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerCommand {
    On,
    Off,
}

/// Chassis power simulator
#[derive(Default)]
pub struct FakePowerClient {
    states: Mutex<HashMap<String, PowerState>>,
    commands: Mutex<Vec<(String, PowerCommand)>>,
    status_queries: Mutex<Vec<String>>,
    failing_status: HashSet<String>,
    failing_commands: HashSet<String>,
}

impl FakePowerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(self, node: &str, state: PowerState) -> Self {
        self.states.lock().unwrap().insert(node.to_string(), state);
        self
    }

    /// Status queries for this node time out
    pub fn failing_status(mut self, node: &str) -> Self {
        self.failing_status.insert(node.to_string());
        self
    }

    /// Power commands for this node fail
    pub fn failing_commands(mut self, node: &str) -> Self {
        self.failing_commands.insert(node.to_string());
        self
    }

    pub fn state(&self, node: &str) -> Option<PowerState> {
        self.states.lock().unwrap().get(node).copied()
    }

    pub fn commands(&self) -> Vec<(String, PowerCommand)> {
        self.commands.lock().unwrap().clone()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.status_queries.lock().unwrap().clone()
    }

    fn command(&self, member: &FleetMember, command: PowerCommand) -> Result<()> {
        self.commands
            .lock()
            .unwrap()
            .push((member.node_id.clone(), command));
        if self.failing_commands.contains(&member.node_id) {
            return Err(ControllerError::ExternalCommand {
                command: format!("{command:?}"),
                node: member.node_id.clone(),
                reason: "injected failure".to_string(),
            });
        }
        let state = match command {
            PowerCommand::On => PowerState::On,
            PowerCommand::Off => PowerState::Off,
        };
        self.states
            .lock()
            .unwrap()
            .insert(member.node_id.clone(), state);
        Ok(())
    }
}

#[async_trait]
impl PowerClient for FakePowerClient {
    async fn power_status(&self, member: &FleetMember) -> Result<PowerState> {
        self.status_queries
            .lock()
            .unwrap()
            .push(member.node_id.clone());
        if self.failing_status.contains(&member.node_id) {
            return Err(ControllerError::Timeout {
                operation: "chassis power status".to_string(),
                node: member.node_id.clone(),
                timeout: std::time::Duration::from_secs(5),
            });
        }
        Ok(self.state(&member.node_id).unwrap_or(PowerState::Off))
    }

    async fn power_on(&self, member: &FleetMember) -> Result<()> {
        self.command(member, PowerCommand::On)
    }

    async fn power_off(&self, member: &FleetMember) -> Result<()> {
        self.command(member, PowerCommand::Off)
    }
}
