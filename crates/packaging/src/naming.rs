use qa_models::ProvisionerError;
use std::path::Path;

const SHA_PREFIX_LEN: usize = 7;
const SUFFIX_LEN: usize = 6;

/// Rejects branch names that git would refuse or that cannot be turned into a
/// container name.
pub fn validate_branch(branch: &str) -> Result<(), ProvisionerError> {
    let invalid = branch.is_empty()
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.contains("..")
        || branch.chars().any(|c| c.is_whitespace() || c.is_control())
        || slug(branch).is_empty();

    if invalid {
        return Err(ProvisionerError::InvalidBranch {
            branch: branch.to_string(),
        });
    }
    Ok(())
}

/// Branch name reduced to ASCII alphanumeric runs joined by single dashes, so
/// it is valid both as a container name and as an image repository.
pub fn slug(branch: &str) -> String {
    branch
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// `<branch-slug>-<sha7>-<suffix>`.
pub fn environment_id(branch: &str, sha: &str, suffix: &str) -> String {
    let short_sha = &sha[..sha.len().min(SHA_PREFIX_LEN)];
    format!("{}-{}-{}", slug(branch), short_sha, suffix)
}

/// Docker repositories must be lowercase; the tag keeps the service name.
pub fn image_ref(env_id: &str, service: &str) -> String {
    format!("{}:{}", env_id.to_ascii_lowercase(), service)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployLayout {
    Compose,
    Dockerfile,
}

impl DeployLayout {
    pub fn detect(workdir: &Path, compose_file: &str) -> Self {
        if workdir.join(compose_file).is_file() {
            DeployLayout::Compose
        } else {
            DeployLayout::Dockerfile
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_replaces_slashes_and_unsafe_chars() {
        assert_eq!(slug("feature/login"), "feature-login");
        assert_eq!(slug("fix/JIRA-12#hot"), "fix-JIRA-12-hot");
        assert_eq!(slug("release_1.2"), "release-1-2");
        assert_eq!(slug("_wip"), "wip");
        assert_eq!(slug(".x"), "x");
        assert_eq!(slug("v1."), "v1");
        assert_eq!(slug("a--b__c"), "a-b-c");
    }

    #[test]
    fn environment_id_uses_sha_prefix() {
        let id = environment_id("feature/login", "0123456789abcdef", "a1b2c3");
        assert_eq!(id, "feature-login-0123456-a1b2c3");
    }

    #[test]
    fn environment_id_tolerates_short_sha() {
        assert_eq!(environment_id("main", "abc", "000000"), "main-abc-000000");
    }

    #[test]
    fn suffix_is_six_hex_chars() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn image_ref_lowercases_repository() {
        assert_eq!(image_ref("Feature-X-abc1234-ffffff", "web"), "feature-x-abc1234-ffffff:web");
    }

    #[test]
    fn branch_validation() {
        assert!(validate_branch("main").is_ok());
        assert!(validate_branch("feature/login-v2").is_ok());
        for bad in ["", "-rf", "a..b", "has space", "trailing/", "/leading", "___", "ä/ö"] {
            assert!(validate_branch(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    /// Container names need `[a-zA-Z0-9][a-zA-Z0-9_.-]+`; image repositories
    /// reject separator runs such as `.-`.
    fn docker_safe(id: &str) -> bool {
        id.starts_with(|c: char| c.is_ascii_alphanumeric())
            && id.ends_with(|c: char| c.is_ascii_alphanumeric())
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !id.contains("--")
    }

    #[test]
    fn accepted_branches_form_docker_safe_ids() {
        for branch in ["_wip", ".x", "v1.", "fix#1", "feature/.hidden", "Release_2.0-rc"] {
            assert!(validate_branch(branch).is_ok(), "{branch:?} should be accepted");
            let id = environment_id(branch, "0123456789abcdef", "a1b2c3");
            assert!(docker_safe(&id), "{id:?} is not a valid container name");
            assert!(docker_safe(image_ref(&id, "web").split(':').next().unwrap()));
        }
    }

    #[test]
    fn layout_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            DeployLayout::detect(dir.path(), "docker-compose.qa.yml"),
            DeployLayout::Dockerfile
        );
        std::fs::write(dir.path().join("docker-compose.qa.yml"), "services: {}\n").unwrap();
        assert_eq!(
            DeployLayout::detect(dir.path(), "docker-compose.qa.yml"),
            DeployLayout::Compose
        );
    }
}
