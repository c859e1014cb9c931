use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body returned for every failed API call.
///
/// `detail` is the key clients of the provisioner already parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorShape {
    pub detail: String,
    pub error_type: String,
}

#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error("Invalid service '{service}'. Allowed: {allowed}")]
    InvalidService { service: String, allowed: String },

    #[error("Invalid branch name: {branch}")]
    InvalidBranch { branch: String },

    #[error("GitHub variables are not configured (token, owner and repo are required)")]
    GitHubNotConfigured,

    #[error("Branch '{branch}' not found ({status})")]
    BranchNotFound { branch: String, status: u16 },

    #[error("GitHub request failed: {reason}")]
    GitHubError { reason: String },

    #[error("Environment not found: {env_id}")]
    EnvironmentNotFound { env_id: String },

    #[error("NGROK auth token is missing")]
    TunnelNotConfigured,

    #[error("Failed to open ngrok tunnel: {reason}")]
    TunnelFailed { reason: String },

    #[error("Command failed: {command}\n{stdout}\n{stderr}")]
    CommandFailed {
        command: String,
        stdout: String,
        stderr: String,
    },

    #[error("Docker error: {message}")]
    DockerError { message: String },

    #[error("No free host port in range {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("State ledger error: {reason}")]
    StateError { reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("Internal server error: {reason}")]
    InternalError { reason: String },
}

impl ProvisionerError {
    pub fn to_error_shape(&self) -> ErrorShape {
        ErrorShape {
            detail: self.to_string(),
            error_type: self.error_type().to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ProvisionerError::InvalidService { .. } => "InvalidParameterValue",
            ProvisionerError::InvalidBranch { .. } => "InvalidParameterValue",
            ProvisionerError::GitHubNotConfigured => "NotConfigured",
            ProvisionerError::BranchNotFound { .. } => "ResourceNotFound",
            ProvisionerError::GitHubError { .. } => "UpstreamError",
            ProvisionerError::EnvironmentNotFound { .. } => "ResourceNotFound",
            ProvisionerError::TunnelNotConfigured => "NotConfigured",
            ProvisionerError::TunnelFailed { .. } => "TunnelError",
            ProvisionerError::CommandFailed { .. } => "CommandError",
            ProvisionerError::DockerError { .. } => "DockerError",
            ProvisionerError::NoFreePort { .. } => "CapacityExceeded",
            ProvisionerError::StateError { .. } => "ServiceException",
            ProvisionerError::InvalidRequest { .. } => "InvalidParameterValue",
            ProvisionerError::ConfigError { .. } => "ServiceException",
            ProvisionerError::InternalError { .. } => "ServiceException",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ProvisionerError::InvalidService { .. } => 400,
            ProvisionerError::InvalidBranch { .. } => 400,
            ProvisionerError::GitHubNotConfigured => 400,
            ProvisionerError::BranchNotFound { .. } => 404,
            ProvisionerError::GitHubError { .. } => 502,
            ProvisionerError::EnvironmentNotFound { .. } => 404,
            ProvisionerError::TunnelNotConfigured => 400,
            ProvisionerError::TunnelFailed { .. } => 500,
            ProvisionerError::CommandFailed { .. } => 500,
            ProvisionerError::DockerError { .. } => 500,
            ProvisionerError::NoFreePort { .. } => 503,
            ProvisionerError::StateError { .. } => 500,
            ProvisionerError::InvalidRequest { .. } => 400,
            ProvisionerError::ConfigError { .. } => 500,
            ProvisionerError::InternalError { .. } => 500,
        }
    }
}

impl From<std::io::Error> for ProvisionerError {
    fn from(e: std::io::Error) -> Self {
        ProvisionerError::InternalError {
            reason: e.to_string(),
        }
    }
}
