//! Web-server reload via a configured shell command.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use super::ServerReloader;
use crate::error::{Result, VigilError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the configured reload command (default `systemctl reload nginx`)
/// with a hard timeout so a wedged service manager cannot stall the
/// pipeline.
#[derive(Debug, Clone)]
pub struct SystemctlReloader {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SystemctlReloader {
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| VigilError::Config("reload command is empty".into()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ServerReloader for SystemctlReloader {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn reload(&self) -> Result<()> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.program).args(&self.args).output(),
        )
        .await
        .map_err(|_| VigilError::Timeout(format!("reload command '{}'", self.program)))?
        .map_err(|e| VigilError::Reload(format!("failed to spawn '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), stderr = %stderr, "reload command failed");
            return Err(VigilError::Reload(format!(
                "'{}' exited with {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }

        info!("web server reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_is_a_config_error() {
        assert!(SystemctlReloader::new("   ").is_err());
    }

    #[test]
    fn command_splits_into_program_and_args() {
        let reloader = SystemctlReloader::new("systemctl reload nginx").unwrap();
        assert_eq!(reloader.program, "systemctl");
        assert_eq!(reloader.args, vec!["reload", "nginx"]);
    }

    #[tokio::test]
    async fn successful_command_reports_ok() {
        let reloader = SystemctlReloader::new("true").unwrap();
        assert!(reloader.reload().await.is_ok());
    }

    #[tokio::test]
    async fn failing_command_surfaces_reload_error() {
        let reloader = SystemctlReloader::new("false").unwrap();
        match reloader.reload().await.unwrap_err() {
            VigilError::Reload(_) => {}
            other => panic!("expected Reload error, got {:?}", other),
        }
    }
}
