use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use qa_models::{Config, ProvisionerError};

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.toml";

/// Flat variables understood by earlier deployments, with the key each one sets.
const LEGACY_VARS: &[(&str, &str)] = &[
    ("PY_API_PORT", "server.port"),
    ("BASE_WORKDIR", "data.base_workdir"),
    ("GITHUB_TOKEN", "github.token"),
    ("GITHUB_OWNER", "github.owner"),
    ("GITHUB_REPO", "github.repo"),
    ("DOCKER_NETWORK", "docker.network"),
    ("DEFAULT_TTL_MINUTES", "environments.default_ttl_minutes"),
    ("ALLOWED_SERVICES", "environments.allowed_services"),
    ("NGROK_AUTHTOKEN", "tunnel.authtoken"),
    ("NGROK_REGION", "tunnel.region"),
];

fn legacy_key(var: &str) -> String {
    LEGACY_VARS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(var))
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| var.to_string())
}

/// Defaults, then the TOML file, then `QA_SECTION__KEY` variables, then the
/// legacy flat variables.
pub fn figment() -> Figment {
    let path = std::env::var("QA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let legacy: Vec<&str> = LEGACY_VARS.iter().map(|(name, _)| *name).collect();

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("QA_")
                .filter(|key| key.as_str().contains("__"))
                .split("__"),
        )
        .merge(Env::raw().only(&legacy).map(|key| legacy_key(key.as_str()).into()))
}

pub fn load_config() -> Result<Config, ProvisionerError> {
    figment()
        .extract()
        .map_err(|e| ProvisionerError::ConfigError {
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use qa_models::LogFormat;

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let config = load_config().unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_dir("configs")?;
            jail.create_file(
                DEFAULT_CONFIG_PATH,
                r#"
                [server]
                port = 9000

                [environments]
                allowed_services = ["web", "admin"]

                [logging]
                format = "json"
                "#,
            )?;

            let config = load_config().unwrap();
            assert_eq!(config.server.port, 9000);
            assert_eq!(config.environments.allowed_services, vec!["web", "admin"]);
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.docker.network, "qa_net");
            Ok(())
        });
    }

    #[test]
    fn explicit_config_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[docker]\nnetwork = \"preview\"\n")?;
            jail.set_env("QA_CONFIG", "custom.toml");

            let config = load_config().unwrap();
            assert_eq!(config.docker.network, "preview");
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_dir("configs")?;
            jail.create_file(DEFAULT_CONFIG_PATH, "[server]\nport = 9000\n")?;
            jail.set_env("QA_SERVER__PORT", "9100");
            jail.set_env("QA_TUNNEL__REGION", "eu");

            let config = load_config().unwrap();
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.tunnel.region, "eu");
            Ok(())
        });
    }

    #[test]
    fn legacy_variables_win() {
        Jail::expect_with(|jail| {
            jail.set_env("QA_SERVER__PORT", "9100");
            jail.set_env("PY_API_PORT", "8099");
            jail.set_env("BASE_WORKDIR", "/srv/qa");
            jail.set_env("GITHUB_TOKEN", "ghp_abc");
            jail.set_env("GITHUB_OWNER", "acme");
            jail.set_env("GITHUB_REPO", "shop");
            jail.set_env("DEFAULT_TTL_MINUTES", "45");
            jail.set_env("ALLOWED_SERVICES", "web,api,worker");
            jail.set_env("NGROK_AUTHTOKEN", "ngrok_abc");

            let config = load_config().unwrap();
            assert_eq!(config.server.port, 8099);
            assert_eq!(config.data.base_workdir, "/srv/qa");
            assert_eq!(
                config.github.credentials(),
                Some(("ghp_abc", "acme", "shop"))
            );
            assert_eq!(config.environments.default_ttl_minutes, 45);
            assert_eq!(
                config.environments.allowed_services,
                vec!["web", "api", "worker"]
            );
            assert_eq!(config.tunnel.authtoken.as_deref(), Some("ngrok_abc"));
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_dir("configs")?;
            jail.create_file(DEFAULT_CONFIG_PATH, "[server]\nprot = 1\n")?;

            let err = load_config().unwrap_err();
            assert!(matches!(err, ProvisionerError::ConfigError { .. }));
            Ok(())
        });
    }
}
