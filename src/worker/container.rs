//! Container runtime driver
//!
//! Manages workers through a docker-compatible CLI (docker or podman):
//! - `run -d` with the VPN settings and the published proxy port
//! - `inspect` to find out whether a worker still exists and runs
//! - `stop` and `rm -v` to tear it down

use std::process::Output;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info, instrument};

use super::{DriverError, WorkerDriver, WorkerHandle, WorkerSpec, WorkerState};
use crate::config::DriverConfig;

/// Worker driver backed by a container runtime CLI
#[derive(Debug, Clone)]
pub struct ContainerDriver {
    config: DriverConfig,
}

impl ContainerDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Arguments for `<runtime> run`
    fn run_args(&self, spec: &WorkerSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--cap-add".to_string(),
            "NET_ADMIN".to_string(),
        ];

        let env = [
            ("VPN_SERVICE_PROVIDER", self.config.vpn_provider.as_str()),
            ("SERVER_COUNTRIES", spec.geo.as_str()),
            ("HTTPPROXY", "on"),
        ];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        // Name only; the runtime copies the value from its own environment
        for (key, _) in self.credentials() {
            args.push("-e".to_string());
            args.push(key.to_string());
        }

        if let Some(dir) = &self.config.config_dir {
            args.push("-v".to_string());
            args.push(format!("{}:/gluetun", dir));
        }

        args.push("-p".to_string());
        args.push(format!("{}:{}/tcp", spec.port, self.config.proxy_port));
        args.push(self.config.image.clone());

        args
    }

    /// Secrets handed to the runtime through its environment, never argv
    fn credentials(&self) -> [(&'static str, &str); 2] {
        [
            ("OPENVPN_USER", self.config.openvpn_user.as_str()),
            ("OPENVPN_PASSWORD", self.config.openvpn_password.as_str()),
        ]
    }

    async fn exec(&self, args: &[String]) -> anyhow::Result<Output> {
        let output = Command::new(&self.config.runtime)
            .args(args)
            .envs(self.credentials())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| {
                format!(
                    "Failed to execute '{} {}'. Is {} installed?",
                    self.config.runtime,
                    args.first().map(String::as_str).unwrap_or_default(),
                    self.config.runtime
                )
            })?;

        Ok(output)
    }

    /// Run a CLI command and turn a non-zero exit into a `DriverError`
    async fn exec_checked(&self, name: &str, args: &[String]) -> Result<String, DriverError> {
        let output = self
            .exec(args)
            .await
            .map_err(|e| DriverError::Runtime(format!("{:#}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stderr.is_empty() {
            debug!("{} {} stderr: {}", self.config.runtime, args[0], stderr);
        }

        if output.status.success() {
            return Ok(stdout);
        }

        Err(classify_failure(
            name,
            &args[0],
            output.status.code().unwrap_or(-1),
            &stderr,
        ))
    }
}

/// Map a failed CLI call onto the driver taxonomy
fn classify_failure(name: &str, command: &str, exit_code: i32, stderr: &str) -> DriverError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("no such container") || lowered.contains("no such object") {
        return DriverError::NotFound(name.to_string());
    }

    DriverError::Runtime(format!(
        "{} {} exited with code {}: {}",
        command, name, exit_code, stderr
    ))
}

#[async_trait]
impl WorkerDriver for ContainerDriver {
    #[instrument(skip(self), fields(runtime = %self.config.runtime))]
    async fn start(&self, spec: &WorkerSpec) -> Result<WorkerHandle, DriverError> {
        info!(
            worker = %spec.name,
            geo = %spec.geo,
            port = spec.port,
            "Starting worker container"
        );

        let id = self
            .exec_checked(&spec.name, &self.run_args(spec))
            .await
            .map_err(|e| {
                error!(worker = %spec.name, error = %e, "Failed to start worker container");
                e
            })?;

        info!(worker = %spec.name, id = %id, "Worker container started");
        Ok(WorkerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn inspect(&self, name: &str) -> Result<WorkerState, DriverError> {
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Running}}".to_string(),
            name.to_string(),
        ];

        let state = self.exec_checked(name, &args).await?;
        Ok(if state == "true" {
            WorkerState::Running
        } else {
            WorkerState::Stopped
        })
    }

    async fn stop(&self, name: &str) -> Result<(), DriverError> {
        self.exec_checked(name, &["stop".to_string(), name.to_string()])
            .await?;
        debug!(worker = %name, "Worker container stopped");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), DriverError> {
        self.exec_checked(
            name,
            &["rm".to_string(), "-v".to_string(), name.to_string()],
        )
        .await?;
        debug!(worker = %name, "Worker container removed");
        Ok(())
    }

    fn driver_name(&self) -> &'static str {
        "container"
    }
}
