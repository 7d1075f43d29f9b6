//! Container process control
//!
//! Two interchangeable controllers sit behind [`ProcessController`]: a Docker
//! Engine HTTP API client and a docker CLI subprocess client. The choice is
//! made once at startup; callers only ever see the trait. A shared semaphore
//! bounds in-flight process-control calls so a wedged daemon can never absorb
//! an unbounded number of tasks.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::types::ProcessError;

/// Maximum concurrent start/stop/inspect commands.
const MAX_INFLIGHT_COMMANDS: usize = 4;

/// Abstraction over container start/stop/inspect.
#[async_trait]
pub trait ProcessController: Send + Sync {
    async fn start(&self, container: &str) -> Result<(), ProcessError>;

    async fn stop(&self, container: &str) -> Result<(), ProcessError>;

    async fn restart(&self, container: &str) -> Result<(), ProcessError>;

    async fn is_running(&self, container: &str) -> Result<bool, ProcessError>;

    /// Short implementation name for logs and status output.
    fn name(&self) -> &'static str;
}

/// Docker Engine REST API client (`DOCKER_HOST`-style TCP endpoint).
pub struct DockerApiController {
    client: reqwest::Client,
    base_url: String,
    permits: Semaphore,
}

impl DockerApiController {
    pub fn new(base_url: impl Into<String>, command_timeout: Duration) -> Result<Self, ProcessError> {
        let client = reqwest::Client::builder()
            .timeout(command_timeout)
            .build()
            .map_err(|e| ProcessError::ControllerUnavailable {
                reason: format!("failed to build http client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            permits: Semaphore::new(MAX_INFLIGHT_COMMANDS),
        })
    }

    /// Probe the engine; used by [`detect_controller`] to decide whether the
    /// API route is usable at all.
    pub async fn ping(&self) -> bool {
        match self.client.get(format!("{}/_ping", self.base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn post_action(&self, container: &str, action: &str) -> Result<(), ProcessError> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            ProcessError::ControllerUnavailable {
                reason: "controller shut down".to_string(),
            }
        })?;
        let url = format!("{}/containers/{}/{}", self.base_url, container, action);
        let response = self.client.post(&url).send().await.map_err(|e| {
            ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("{} request failed: {}", action, e),
            }
        })?;
        // 204 = done, 304 = already in the requested state
        let status = response.status();
        if status.is_success() || status.as_u16() == 304 {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("{} returned {}: {}", action, status, body),
            })
        }
    }
}

#[async_trait]
impl ProcessController for DockerApiController {
    async fn start(&self, container: &str) -> Result<(), ProcessError> {
        self.post_action(container, "start").await
    }

    async fn stop(&self, container: &str) -> Result<(), ProcessError> {
        self.post_action(container, "stop").await
    }

    async fn restart(&self, container: &str) -> Result<(), ProcessError> {
        self.post_action(container, "restart").await
    }

    async fn is_running(&self, container: &str) -> Result<bool, ProcessError> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            ProcessError::ControllerUnavailable {
                reason: "controller shut down".to_string(),
            }
        })?;
        let url = format!("{}/containers/{}/json", self.base_url, container);
        let response = self.client.get(&url).send().await.map_err(|e| {
            ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("inspect request failed: {}", e),
            }
        })?;
        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("inspect returned {}", response.status()),
            });
        }
        let body: serde_json::Value = response.json().await.map_err(|e| {
            ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("inspect response unreadable: {}", e),
            }
        })?;
        Ok(body
            .pointer("/State/Running")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    fn name(&self) -> &'static str {
        "docker-api"
    }
}

/// docker CLI subprocess client.
pub struct DockerCliController {
    binary: PathBuf,
    command_timeout: Duration,
    permits: Semaphore,
}

impl DockerCliController {
    pub fn new(binary: impl Into<PathBuf>, command_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            command_timeout,
            permits: Semaphore::new(MAX_INFLIGHT_COMMANDS),
        }
    }

    /// Locate the docker binary in well-known locations, falling back to
    /// `which`.
    pub async fn find_binary() -> Result<PathBuf, ProcessError> {
        let candidates = ["/usr/local/bin/docker", "/usr/bin/docker", "/opt/bin/docker"];
        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }
        match Command::new("which").arg("docker").output().await {
            Ok(output) if output.status.success() => {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok(PathBuf::from(path))
            }
            _ => Err(ProcessError::ControllerUnavailable {
                reason: "docker binary not found".to_string(),
            }),
        }
    }

    async fn run(&self, container: &str, args: &[&str]) -> Result<String, ProcessError> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            ProcessError::ControllerUnavailable {
                reason: "controller shut down".to_string(),
            }
        })?;
        let mut command = Command::new(&self.binary);
        command.args(args);
        let output = timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| ProcessError::Timeout {
                container: container.to_string(),
                seconds: self.command_timeout.as_secs(),
            })?
            .map_err(|e| ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("failed to spawn docker: {}", e),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::CommandFailed {
                container: container.to_string(),
                reason: format!("docker {} failed: {}", args.first().unwrap_or(&"?"), stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ProcessController for DockerCliController {
    async fn start(&self, container: &str) -> Result<(), ProcessError> {
        self.run(container, &["start", container]).await.map(|_| ())
    }

    async fn stop(&self, container: &str) -> Result<(), ProcessError> {
        self.run(container, &["stop", container]).await.map(|_| ())
    }

    async fn restart(&self, container: &str) -> Result<(), ProcessError> {
        self.run(container, &["restart", container]).await.map(|_| ())
    }

    async fn is_running(&self, container: &str) -> Result<bool, ProcessError> {
        match self
            .run(container, &["inspect", "-f", "{{.State.Running}}", container])
            .await
        {
            Ok(out) => Ok(out == "true"),
            // inspect fails for unknown containers; treat as not running
            Err(ProcessError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "docker-cli"
    }
}

/// Select a controller once at startup: the Engine API when an address is
/// configured and answers a ping, otherwise the docker CLI.
pub async fn detect_controller(
    docker_api_url: Option<&str>,
    command_timeout: Duration,
) -> Result<Arc<dyn ProcessController>, ProcessError> {
    if let Some(url) = docker_api_url {
        let api = DockerApiController::new(url, command_timeout)?;
        if api.ping().await {
            tracing::info!(url, "process controller: docker engine api");
            return Ok(Arc::new(api));
        }
        tracing::warn!(url, "docker engine api unreachable, falling back to cli");
    }
    let binary = DockerCliController::find_binary().await?;
    tracing::info!(binary = %binary.display(), "process controller: docker cli");
    Ok(Arc::new(DockerCliController::new(binary, command_timeout)))
}
