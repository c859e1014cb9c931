use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an environment's containers were started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// `docker compose up` from the checkout's compose file.
    Compose,
    /// Single container from an image built out of the checkout.
    Image,
}

/// One provisioned environment as stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentRecord {
    pub branch: String,
    pub sha: String,
    pub url: String,
    pub port: u16,
    pub workdir: String,
    pub created_at: i64,
    pub expires_at: i64,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DeployMode>,
}

impl EnvironmentRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Whole minutes left before expiry, never negative.
    pub fn ttl_minutes_left(&self, now: i64) -> i64 {
        ((self.expires_at - now).div_euclid(60)).max(0)
    }
}

/// Ledger contents, keyed by environment id.
pub type EnvironmentLedger = HashMap<String, EnvironmentRecord>;

pub fn default_service() -> String {
    "web".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub branch: String,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub ttl_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionResponse {
    pub env_id: String,
    pub url: String,
    pub expires_at: i64,
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRequest {
    pub env_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestroyResponse {
    pub ok: bool,
}

/// A ledger entry as shown by `/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentView {
    pub env_id: String,
    #[serde(flatten)]
    pub record: EnvironmentRecord,
    pub ttl_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResponse {
    pub environments: Vec<EnvironmentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcResponse {
    pub garbage_collected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub environments: usize,
}
