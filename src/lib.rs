pub mod config;

pub use config::{figment, load_config, DEFAULT_CONFIG_PATH};

pub use qa_api as api;
pub use qa_control as control;
pub use qa_models as models;

use qa_control::{Backends, ControlPlane, StateStore};
use qa_invoker::{
    CommandRunner, ContainerRuntime, DockerRuntime, NgrokTunnels, TokioCommandRunner,
};
use qa_models::{Config, ProvisionerError};
use qa_packaging::GitHubClient;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Opens the ledger and wires the real GitHub, Docker and ngrok backends.
pub async fn build_control_plane(config: Config) -> Result<Arc<ControlPlane>, ProvisionerError> {
    let base_dir = Path::new(&config.data.base_workdir);
    tokio::fs::create_dir_all(base_dir).await?;

    let store = Arc::new(StateStore::open(&base_dir.join(&config.data.state_file)).await?);
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let runtime = Arc::new(DockerRuntime::connect(runner.clone())?);
    if let Err(e) = runtime.ping().await {
        warn!("Docker is not reachable yet: {}", e);
    }

    if config.github.credentials().is_none() {
        warn!("GitHub credentials are incomplete; provisioning will be refused");
    }
    if config.tunnel.authtoken.is_none() {
        warn!("NGROK_AUTHTOKEN is not set; tunnels cannot be opened");
    }

    let backends = Backends {
        resolver: Arc::new(GitHubClient::new(config.github.clone())),
        runner: runner.clone(),
        runtime,
        tunnels: Arc::new(NgrokTunnels::new(config.tunnel.clone(), runner)),
    };

    Ok(Arc::new(ControlPlane::new(config, store, backends)))
}
