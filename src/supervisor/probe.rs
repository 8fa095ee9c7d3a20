use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::info;

/// Checks whether a broker endpoint accepts connections, independent of
/// what the MQTT client believes.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    async fn is_reachable(&self, endpoint: &str) -> bool;
}

/// TCP connect probe with a timeout
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl EndpointProbe for TcpProbe {
    async fn is_reachable(&self, endpoint: &str) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(endpoint)).await,
            Ok(Ok(_))
        )
    }
}

/// Restarts the device broker's host process.
///
/// The relay only requests the restart; how it happens is up to the host.
#[async_trait]
pub trait BrokerRestarter: Send + Sync {
    async fn restart(&self) -> Result<()>;
}

/// Runs a configured command (e.g. `systemctl restart mosquitto`)
#[derive(Debug, Clone)]
pub struct CommandRestarter {
    program: String,
    args: Vec<String>,
}

impl CommandRestarter {
    /// `None` for an empty command
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl BrokerRestarter for CommandRestarter {
    async fn restart(&self) -> Result<()> {
        info!(program = %self.program, args = ?self.args, "Running broker restart command");

        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .with_context(|| format!("Failed to run restart command '{}'", self.program))?;

        if !status.success() {
            bail!("Restart command '{}' exited with {}", self.program, status);
        }
        Ok(())
    }
}
