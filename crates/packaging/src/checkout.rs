use qa_invoker::{CommandRunner, CommandSpec};
use qa_models::{GitHubConfig, ProvisionerError};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Clones the configured repository and checks out a branch.
pub struct SourceCheckout {
    runner: Arc<dyn CommandRunner>,
    config: GitHubConfig,
}

impl SourceCheckout {
    pub fn new(config: GitHubConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, config }
    }

    pub fn clone_url(&self) -> Result<String, ProvisionerError> {
        let (token, owner, repo) = self
            .config
            .credentials()
            .ok_or(ProvisionerError::GitHubNotConfigured)?;
        Ok(format!(
            "https://{}:x-oauth-basic@{}/{}/{}.git",
            token, self.config.clone_host, owner, repo
        ))
    }

    #[instrument(skip(self))]
    pub async fn checkout(&self, workdir: &Path, branch: &str) -> Result<(), ProvisionerError> {
        let token = self.config.token.clone().unwrap_or_default();
        let url = self.clone_url()?;

        let clone = CommandSpec::new("git")
            .args(["clone", url.as_str(), "."])
            .current_dir(workdir)
            .secret(token);
        self.runner.run(&clone).await?;

        let checkout = CommandSpec::new("git")
            .args(["checkout", branch])
            .current_dir(workdir);
        self.runner.run(&checkout).await?;

        info!(branch = %branch, workdir = %workdir.display(), "Checked out source");
        Ok(())
    }
}
