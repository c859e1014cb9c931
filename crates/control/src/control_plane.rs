use chrono::Utc;
use qa_invoker::{CommandRunner, ContainerRuntime, RunSpec, TunnelProvider};
use qa_models::{
    Config, DeployMode, DestroyResponse, EnvironmentRecord, EnvironmentView, GcResponse,
    ListResponse, ProvisionRequest, ProvisionResponse, ProvisionerError,
};
use qa_packaging::{
    environment_id, image_ref, random_suffix, validate_branch, BranchResolver, DeployLayout,
    SourceCheckout,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::ports::PortAllocator;
use crate::store::StateStore;

/// The external systems the control plane drives.
#[derive(Clone)]
pub struct Backends {
    pub resolver: Arc<dyn BranchResolver>,
    pub runner: Arc<dyn CommandRunner>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub tunnels: Arc<dyn TunnelProvider>,
}

/// What a provisioning attempt has set up so far, so a failure can undo it.
#[derive(Debug)]
struct Progress {
    env_id: String,
    workdir: PathBuf,
    mode: Option<DeployMode>,
    image: Option<String>,
    reserved_port: Option<u16>,
    tunnel_open: bool,
}

pub struct ControlPlane {
    config: Config,
    base_dir: PathBuf,
    store: Arc<StateStore>,
    resolver: Arc<dyn BranchResolver>,
    checkout: SourceCheckout,
    runtime: Arc<dyn ContainerRuntime>,
    tunnels: Arc<dyn TunnelProvider>,
    ports: PortAllocator,
}

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

impl ControlPlane {
    pub fn new(config: Config, store: Arc<StateStore>, backends: Backends) -> Self {
        let ports = PortAllocator::new(config.docker.host_port_start, config.docker.host_port_end);
        let checkout = SourceCheckout::new(config.github.clone(), backends.runner);
        Self {
            base_dir: PathBuf::from(&config.data.base_workdir),
            config,
            store,
            resolver: backends.resolver,
            checkout,
            runtime: backends.runtime,
            tunnels: backends.tunnels,
            ports,
        }
    }

    // Accessors for subsystems
    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }
    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.runtime.clone()
    }

    /// Runs on its own task so a dropped caller cannot interrupt a
    /// provisioning attempt between its side effects and their rollback.
    #[instrument(skip(self), fields(branch = %request.branch, service = %request.service))]
    pub async fn provision(
        self: &Arc<Self>,
        request: ProvisionRequest,
    ) -> Result<ProvisionResponse, ProvisionerError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.provision_inner(request).await }.in_current_span())
            .await
            .map_err(|e| ProvisionerError::InternalError {
                reason: format!("provisioning task failed: {e}"),
            })?
    }

    async fn provision_inner(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionResponse, ProvisionerError> {
        let environments = &self.config.environments;
        if !environments.is_allowed(&request.service) {
            return Err(ProvisionerError::InvalidService {
                service: request.service,
                allowed: environments.allowed_display(),
            });
        }
        validate_branch(&request.branch)?;
        if self.config.github.credentials().is_none() {
            return Err(ProvisionerError::GitHubNotConfigured);
        }

        let sha = self.resolver.resolve_branch(&request.branch).await?;
        let env_id = environment_id(&request.branch, &sha, &random_suffix());
        let workdir = self.base_dir.join(&env_id);
        tokio::fs::create_dir_all(&workdir).await?;

        let mut progress = Progress {
            env_id: env_id.clone(),
            workdir,
            mode: None,
            image: None,
            reserved_port: None,
            tunnel_open: false,
        };

        let result = self.deploy(&request, &sha, &mut progress).await;
        if let Err(e) = &result {
            error!(env_id = %env_id, "Provisioning failed, rolling back: {}", e);
            self.rollback(&progress).await;
        }
        // Held until the container is gone or the ledger owns the port.
        if let Some(port) = progress.reserved_port {
            self.ports.release(port).await;
        }

        if let Ok(response) = &result {
            info!(env_id = %env_id, url = %response.url, "Environment provisioned");
        }
        result
    }

    async fn deploy(
        &self,
        request: &ProvisionRequest,
        sha: &str,
        progress: &mut Progress,
    ) -> Result<ProvisionResponse, ProvisionerError> {
        let docker = &self.config.docker;
        let env_id = progress.env_id.clone();
        let workdir = progress.workdir.clone();

        self.checkout.checkout(&workdir, &request.branch).await?;
        self.runtime.ensure_network(&docker.network).await?;

        let port = match DeployLayout::detect(&workdir, &docker.compose_file) {
            DeployLayout::Compose => {
                progress.mode = Some(DeployMode::Compose);
                self.runtime.compose_up(&workdir, &docker.compose_file).await?;
                docker.compose_port
            }
            DeployLayout::Dockerfile => {
                let image = image_ref(&env_id, &request.service);
                progress.image = Some(image.clone());
                self.runtime.build_image(&workdir, &image).await?;

                let host_port = self.ports.reserve(&self.store).await?;
                progress.reserved_port = Some(host_port);
                progress.mode = Some(DeployMode::Image);
                self.runtime
                    .run_container(&RunSpec {
                        name: env_id.clone(),
                        image,
                        network: docker.network.clone(),
                        host_port,
                        container_port: docker.container_port,
                    })
                    .await?;
                host_port
            }
        };

        let url = self.tunnels.open(&env_id, port).await?;
        progress.tunnel_open = true;

        let ttl = request
            .ttl_minutes
            .filter(|m| *m > 0)
            .unwrap_or(self.config.environments.default_ttl_minutes);
        let created_at = now_secs();
        let expires_at = created_at + i64::from(ttl) * 60;

        let record = EnvironmentRecord {
            branch: request.branch.clone(),
            sha: sha.to_string(),
            url: url.clone(),
            port,
            workdir: workdir.display().to_string(),
            created_at,
            expires_at,
            service: request.service.clone(),
            mode: progress.mode,
        };
        self.store.insert(&env_id, record).await?;

        Ok(ProvisionResponse {
            env_id,
            url,
            expires_at,
            sha: sha.to_string(),
        })
    }

    async fn rollback(&self, progress: &Progress) {
        if progress.tunnel_open {
            self.tunnels.close(&progress.env_id).await;
        }
        match progress.mode {
            Some(DeployMode::Compose) => {
                if let Err(e) = self
                    .runtime
                    .compose_down(&progress.workdir, &self.config.docker.compose_file)
                    .await
                {
                    warn!(env_id = %progress.env_id, "Rollback compose down failed: {}", e);
                }
            }
            Some(DeployMode::Image) => {
                if let Err(e) = self.runtime.remove_container(&progress.env_id).await {
                    debug!(env_id = %progress.env_id, "Rollback container removal: {}", e);
                }
            }
            None => {}
        }
        if let Some(image) = &progress.image {
            if let Err(e) = self.runtime.remove_image(image).await {
                debug!(env_id = %progress.env_id, "Rollback image removal: {}", e);
            }
        }
        self.remove_workdir(&progress.env_id, &progress.workdir).await;
    }

    #[instrument(skip(self))]
    pub async fn destroy(&self, env_id: &str) -> Result<DestroyResponse, ProvisionerError> {
        let record = self
            .store
            .get(env_id)
            .await
            .ok_or_else(|| ProvisionerError::EnvironmentNotFound {
                env_id: env_id.to_string(),
            })?;

        self.teardown(env_id, &record).await;
        self.store.remove(env_id).await?;

        info!(env_id = %env_id, "Environment destroyed");
        Ok(DestroyResponse { ok: true })
    }

    /// Best effort: every step is attempted and failures are only logged.
    async fn teardown(&self, env_id: &str, record: &EnvironmentRecord) {
        let docker = &self.config.docker;
        let workdir = PathBuf::from(&record.workdir);

        self.tunnels.close(env_id).await;

        let compose = match record.mode {
            Some(DeployMode::Compose) => true,
            Some(DeployMode::Image) => false,
            None => DeployLayout::detect(&workdir, &docker.compose_file) == DeployLayout::Compose,
        };

        if compose {
            if let Err(e) = self.runtime.compose_down(&workdir, &docker.compose_file).await {
                warn!(env_id = %env_id, "compose down failed: {}", e);
            }
        } else {
            if let Err(e) = self.runtime.remove_container(env_id).await {
                warn!(env_id = %env_id, "container removal failed: {}", e);
            }
            let image = image_ref(env_id, &record.service);
            if let Err(e) = self.runtime.remove_image(&image).await {
                debug!(env_id = %env_id, "image removal failed: {}", e);
            }
        }

        self.remove_workdir(env_id, &workdir).await;
    }

    /// Deletes a workspace, refusing anything outside the base directory.
    async fn remove_workdir(&self, env_id: &str, workdir: &Path) {
        if !workdir.starts_with(&self.base_dir) || workdir == self.base_dir {
            warn!(env_id = %env_id, "Refusing to delete {} outside {}", workdir.display(), self.base_dir.display());
            return;
        }
        match tokio::fs::remove_dir_all(workdir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(env_id = %env_id, "Failed to remove {}: {}", workdir.display(), e),
        }
    }

    pub async fn list(&self) -> ListResponse {
        self.list_at(now_secs()).await
    }

    pub async fn list_at(&self, now: i64) -> ListResponse {
        let mut environments: Vec<EnvironmentView> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .map(|(env_id, record)| EnvironmentView {
                ttl_min: record.ttl_minutes_left(now),
                env_id,
                record,
            })
            .collect();

        environments.sort_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then_with(|| a.env_id.cmp(&b.env_id))
        });

        ListResponse { environments }
    }

    pub async fn garbage_collect(&self) -> GcResponse {
        self.garbage_collect_at(now_secs()).await
    }

    #[instrument(skip(self))]
    pub async fn garbage_collect_at(&self, now: i64) -> GcResponse {
        let mut expired: Vec<String> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(env_id, _)| env_id)
            .collect();
        expired.sort();

        let mut garbage_collected = Vec::with_capacity(expired.len());
        for env_id in expired {
            match self.destroy(&env_id).await {
                Ok(_) => garbage_collected.push(env_id),
                Err(e) => warn!(env_id = %env_id, "Garbage collection skipped: {}", e),
            }
        }

        if !garbage_collected.is_empty() {
            info!("Garbage collected {} environment(s)", garbage_collected.len());
        }
        GcResponse { garbage_collected }
    }
}
