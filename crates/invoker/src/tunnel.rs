use async_trait::async_trait;
use dashmap::DashMap;
use qa_models::{ProvisionerError, TunnelConfig};
use serde::Deserialize;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::process::{CommandRunner, CommandSpec};

#[async_trait]
pub trait TunnelProvider: Send + Sync + 'static {
    /// Exposes `port` publicly and returns the public URL.
    async fn open(&self, env_id: &str, port: u16) -> Result<String, ProvisionerError>;
    /// Tears the tunnel down. Unknown ids are ignored.
    async fn close(&self, env_id: &str);
}

/// Tunnel as reported by the agent API.
#[derive(Debug, Clone, Deserialize)]
struct AgentTunnel {
    #[serde(default)]
    public_url: String,
}

/// One shared `ngrok start --none` agent; each environment is a named tunnel
/// created and deleted through the agent's local API.
pub struct NgrokTunnels {
    config: TunnelConfig,
    runner: Arc<dyn CommandRunner>,
    http: reqwest::Client,
    agent: Mutex<Option<Child>>,
    tunnels: DashMap<String, String>,
}

impl NgrokTunnels {
    pub fn new(config: TunnelConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            http: reqwest::Client::new(),
            agent: Mutex::new(None),
            tunnels: DashMap::new(),
        }
    }

    fn authtoken(&self) -> Result<&str, ProvisionerError> {
        self.config
            .authtoken
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProvisionerError::TunnelNotConfigured)
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.agent_api_url.trim_end_matches('/'), path)
    }

    async fn agent_ready(&self) -> bool {
        match self.http.get(self.api("/api/tunnels")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("ngrok agent API not ready: {}", e);
                false
            }
        }
    }

    /// Starts the agent unless one already answers on `agent_api_url`, then
    /// waits for its API.
    async fn ensure_agent(&self, token: &str) -> Result<(), ProvisionerError> {
        let mut agent = self.agent.lock().await;
        if self.agent_ready().await {
            return Ok(());
        }

        let running = match agent.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        if !running {
            let add_token = CommandSpec::new(&self.config.binary)
                .args(["config", "add-authtoken", token])
                .secret(token);
            if let Err(e) = self.runner.run(&add_token).await {
                debug!("ngrok add-authtoken failed, continuing: {}", e);
            }

            let child = Command::new(&self.config.binary)
                .args(["start", "--none", "--region", &self.config.region])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| ProvisionerError::TunnelFailed {
                    reason: format!("failed to start {}: {e}", self.config.binary),
                })?;
            info!("Started ngrok agent");
            *agent = Some(child);
        }

        let interval = Duration::from_millis(self.config.poll_interval_ms);
        for _ in 0..self.config.poll_attempts {
            if self.agent_ready().await {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }

        Err(ProvisionerError::TunnelFailed {
            reason: format!(
                "ngrok agent API at {} not ready after {} attempts",
                self.config.agent_api_url, self.config.poll_attempts
            ),
        })
    }

    /// Number of tunnels currently tracked.
    pub fn active(&self) -> usize {
        self.tunnels.len()
    }
}

#[async_trait]
impl TunnelProvider for NgrokTunnels {
    #[instrument(skip(self))]
    async fn open(&self, env_id: &str, port: u16) -> Result<String, ProvisionerError> {
        let token = self.authtoken()?;
        self.ensure_agent(token).await?;

        let failed = |reason: String| ProvisionerError::TunnelFailed { reason };
        let response = self
            .http
            .post(self.api("/api/tunnels"))
            .json(&json!({
                "name": env_id,
                "proto": "http",
                "addr": port.to_string(),
            }))
            .send()
            .await
            .map_err(|e| failed(format!("ngrok agent unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("ngrok agent answered {status}: {body}")));
        }

        let tunnel: AgentTunnel = response
            .json()
            .await
            .map_err(|e| failed(format!("unexpected ngrok agent response: {e}")))?;
        if tunnel.public_url.is_empty() {
            return Err(failed(format!("no public URL for port {port}")));
        }

        self.tunnels.insert(env_id.to_string(), env_id.to_string());
        info!(env_id = %env_id, url = %tunnel.public_url, "Tunnel opened");
        Ok(tunnel.public_url)
    }

    #[instrument(skip(self))]
    async fn close(&self, env_id: &str) {
        let Some((_, name)) = self.tunnels.remove(env_id) else {
            return;
        };
        match self
            .http
            .delete(self.api(&format!("/api/tunnels/{name}")))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() || response.status().as_u16() == 404 => {
                info!(env_id = %env_id, "Tunnel closed")
            }
            Ok(response) => warn!(env_id = %env_id, "Failed to stop tunnel: {}", response.status()),
            Err(e) => warn!(env_id = %env_id, "Failed to stop tunnel: {}", e),
        }
    }
}
