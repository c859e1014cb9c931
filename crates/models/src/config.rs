use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub github: GitHubConfig,
    pub docker: DockerConfig,
    pub tunnel: TunnelConfig,
    pub environments: EnvironmentsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DataConfig {
    pub base_workdir: String,
    /// Ledger file name, relative to `base_workdir`.
    pub state_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub api_url: String,
    pub clone_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DockerConfig {
    pub network: String,
    pub compose_file: String,
    pub compose_port: u16,
    pub container_port: u16,
    pub host_port_start: u16,
    pub host_port_end: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct TunnelConfig {
    pub authtoken: Option<String>,
    pub region: String,
    pub binary: String,
    pub agent_api_url: String,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct EnvironmentsConfig {
    pub default_ttl_minutes: u32,
    #[serde(deserialize_with = "comma_list")]
    pub allowed_services: Vec<String>,
    /// Seconds between background garbage collection sweeps; 0 disables them.
    pub gc_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8088,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_workdir: "/data/qa-envs".to_string(),
            state_file: "state.json".to_string(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            api_url: "https://api.github.com".to_string(),
            clone_host: "github.com".to_string(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            network: "qa_net".to_string(),
            compose_file: "docker-compose.qa.yml".to_string(),
            compose_port: 8080,
            container_port: 8080,
            host_port_start: 8080,
            host_port_end: 8180,
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            authtoken: None,
            region: "us".to_string(),
            binary: "ngrok".to_string(),
            agent_api_url: "http://127.0.0.1:4040".to_string(),
            poll_attempts: 40,
            poll_interval_ms: 500,
        }
    }
}

impl Default for EnvironmentsConfig {
    fn default() -> Self {
        Self {
            default_ttl_minutes: 120,
            allowed_services: vec!["web".to_string(), "api".to_string()],
            gc_interval_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl GitHubConfig {
    /// Token, owner and repo, when all three are set and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            non_empty(&self.token)?,
            non_empty(&self.owner)?,
            non_empty(&self.repo)?,
        ))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl EnvironmentsConfig {
    pub fn is_allowed(&self, service: &str) -> bool {
        self.allowed_services.iter().any(|s| s == service)
    }

    /// Allowed services sorted and comma joined, for error messages.
    pub fn allowed_display(&self) -> String {
        let mut services = self.allowed_services.clone();
        services.sort();
        services.join(", ")
    }
}

/// Accepts either a TOML/JSON list or a comma separated string such as
/// `ALLOWED_SERVICES=web,api`. Blank entries are dropped.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Joined(joined) => joined.split(',').map(str::to_string).collect(),
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
