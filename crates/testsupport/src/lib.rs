pub mod fakes;

pub use fakes::*;

use qa_models::{Config, GitHubConfig};
use std::path::Path;

pub const TEST_SHA: &str = "0123456789abcdef0123456789abcdef01234567";

/// Configuration rooted at `base` with GitHub and ngrok credentials filled in.
pub fn test_config(base: &Path) -> Config {
    let mut config = Config::default();
    config.data.base_workdir = base.display().to_string();
    config.github = GitHubConfig {
        token: Some("ghp_test_token".to_string()),
        owner: Some("acme".to_string()),
        repo: Some("shop".to_string()),
        ..Default::default()
    };
    config.tunnel.authtoken = Some("ngrok_test_token".to_string());
    config.environments.gc_interval_secs = 0;
    config
}
