use async_trait::async_trait;
use qa_models::{GitHubConfig, ProvisionerError};
use serde::Deserialize;
use tracing::{info, instrument, warn};

const USER_AGENT: &str = concat!("qa-provisioner/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait BranchResolver: Send + Sync + 'static {
    /// Head commit SHA of `branch`.
    async fn resolve_branch(&self, branch: &str) -> Result<String, ProvisionerError>;
}

#[derive(Debug, Deserialize)]
struct GitRef {
    #[serde(rename = "ref", default)]
    name: String,
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

/// `refs/heads/<branch>` answers with one ref on an exact match and with a
/// list when the name is only a prefix of existing branches.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefLookup {
    Single(GitRef),
    Many(Vec<GitRef>),
}

/// `<api>/repos/<owner>/<repo>/git/refs/heads/<branch>` with every path
/// segment percent-encoded, so `#`, `?` and `%` in branch names stay part of
/// the ref.
fn refs_url(
    api_url: &str,
    owner: &str,
    repo: &str,
    branch: &str,
) -> Result<reqwest::Url, ProvisionerError> {
    let invalid = |reason: String| ProvisionerError::GitHubError { reason };
    let mut url = reqwest::Url::parse(api_url)
        .map_err(|e| invalid(format!("invalid GitHub API URL {api_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("GitHub API URL {api_url} cannot have a path")))?
        .pop_if_empty()
        .extend(["repos", owner, repo, "git", "refs", "heads"])
        .extend(branch.split('/'));
    Ok(url)
}

pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl BranchResolver for GitHubClient {
    #[instrument(skip(self))]
    async fn resolve_branch(&self, branch: &str) -> Result<String, ProvisionerError> {
        let (token, owner, repo) = self
            .config
            .credentials()
            .ok_or(ProvisionerError::GitHubNotConfigured)?;

        let url = refs_url(&self.config.api_url, owner, repo, branch)?;

        let response = self
            .http
            .get(url)
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| ProvisionerError::GitHubError {
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            warn!("Branch lookup for {} returned {}", branch, status);
            return Err(ProvisionerError::BranchNotFound {
                branch: branch.to_string(),
                status,
            });
        }

        let lookup: RefLookup =
            response
                .json()
                .await
                .map_err(|e| ProvisionerError::GitHubError {
                    reason: format!("unexpected ref payload: {e}"),
                })?;

        let wanted = format!("refs/heads/{branch}");
        let sha = match lookup {
            RefLookup::Single(git_ref) => Some(git_ref.object.sha),
            RefLookup::Many(refs) => refs
                .into_iter()
                .find(|r| r.name == wanted)
                .map(|r| r.object.sha),
        }
        .ok_or_else(|| ProvisionerError::BranchNotFound {
            branch: branch.to_string(),
            status,
        })?;

        info!(branch = %branch, sha = %sha, "Resolved branch");
        Ok(sha)
    }
}
