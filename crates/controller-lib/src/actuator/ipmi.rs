//! Out-of-band power control through `ipmitool`

use super::PowerClient;
use crate::error::{ControllerError, Result};
use crate::models::{FleetMember, PowerState};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default deadline for a single `ipmitool` invocation
pub const DEFAULT_IPMI_TIMEOUT: Duration = Duration::from_secs(5);

/// Power client that drives a node's BMC over IPMI-over-LAN
///
/// The password is handed over through `IPMI_PASSWORD` (`-E`) so it never
/// shows up in the process list.
#[derive(Debug, Clone)]
pub struct IpmiPowerClient {
    binary: String,
    interface: String,
    timeout: Duration,
}

impl Default for IpmiPowerClient {
    fn default() -> Self {
        Self {
            binary: "ipmitool".to_string(),
            interface: "lanplus".to_string(),
            timeout: DEFAULT_IPMI_TIMEOUT,
        }
    }
}

impl IpmiPowerClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Use a different `ipmitool` executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn chassis_power(&self, member: &FleetMember, action: &str) -> Result<String> {
        let operation = format!("chassis power {action}");
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-I", self.interface.as_str(), "-H", member.management_address.as_str()])
            .args(["-U", member.username.as_str(), "-E"])
            .args(["chassis", "power", action])
            .env("IPMI_PASSWORD", &member.password)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(
            node = %member.node_id,
            address = %member.management_address,
            %operation,
            "Running ipmitool"
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ControllerError::Timeout {
                operation: operation.clone(),
                node: member.node_id.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| ControllerError::ExternalCommand {
                command: operation.clone(),
                node: member.node_id.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ControllerError::ExternalCommand {
                command: operation,
                node: member.node_id.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PowerClient for IpmiPowerClient {
    async fn power_status(&self, member: &FleetMember) -> Result<PowerState> {
        let stdout = self.chassis_power(member, "status").await?;
        parse_power_status(&stdout)
    }

    async fn power_on(&self, member: &FleetMember) -> Result<()> {
        self.chassis_power(member, "on").await.map(|_| ())
    }

    async fn power_off(&self, member: &FleetMember) -> Result<()> {
        self.chassis_power(member, "off").await.map(|_| ())
    }
}

/// Parse `Chassis Power is on|off`
pub fn parse_power_status(stdout: &str) -> Result<PowerState> {
    let last = stdout
        .split_whitespace()
        .last()
        .map(str::to_ascii_lowercase);

    match last.as_deref() {
        Some("on") => Ok(PowerState::On),
        Some("off") => Ok(PowerState::Off),
        _ => Err(ControllerError::parse(
            "chassis power status",
            format!("unrecognized output {:?}", stdout.trim()),
        )),
    }
}
