use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::RemoveImageOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::network::CreateNetworkOptions;
use bollard::Docker;
use qa_models::ProvisionerError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::process::{CommandRunner, CommandSpec};

/// Label put on every container the provisioner starts.
pub const ENV_LABEL: &str = "qa-provisioner.env-id";

/// Equivalent of `docker run -d --name <name> --network <network>
/// -p <host_port>:<container_port> <image>`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub host_port: u16,
    pub container_port: u16,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), ProvisionerError>;
    /// Creates the network unless it already exists.
    async fn ensure_network(&self, network: &str) -> Result<(), ProvisionerError>;
    async fn build_image(&self, context: &Path, image_ref: &str) -> Result<(), ProvisionerError>;
    /// Creates and starts a container, returning its id.
    async fn run_container(&self, spec: &RunSpec) -> Result<String, ProvisionerError>;
    /// Force removes a container by name or id.
    async fn remove_container(&self, name: &str) -> Result<(), ProvisionerError>;
    async fn remove_image(&self, image_ref: &str) -> Result<(), ProvisionerError>;
    async fn compose_up(&self, workdir: &Path, compose_file: &str) -> Result<(), ProvisionerError>;
    async fn compose_down(&self, workdir: &Path, compose_file: &str)
        -> Result<(), ProvisionerError>;
}

/// Engine calls go through bollard; image builds and compose go through the
/// Docker CLI since they need the checkout on disk.
pub struct DockerRuntime {
    docker: Docker,
    runner: Arc<dyn CommandRunner>,
}

impl DockerRuntime {
    pub fn connect(runner: Arc<dyn CommandRunner>) -> Result<Self, ProvisionerError> {
        let docker = match std::env::var("DOCKER_HOST") {
            Ok(docker_host) if docker_host.starts_with("tcp://") => {
                Docker::connect_with_http(&docker_host, 120, bollard::API_DEFAULT_VERSION)
                    .map_err(|e| ProvisionerError::DockerError {
                        message: format!("Failed to connect to Docker at {docker_host}: {e}"),
                    })?
            }
            _ => Docker::connect_with_socket_defaults().map_err(|e| {
                ProvisionerError::DockerError {
                    message: e.to_string(),
                }
            })?,
        };

        Ok(Self { docker, runner })
    }
}

fn docker_error(e: bollard::errors::Error) -> ProvisionerError {
    ProvisionerError::DockerError {
        message: e.to_string(),
    }
}

fn container_port_key(port: u16) -> String {
    format!("{port}/tcp")
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), ProvisionerError> {
        self.docker.ping().await.map_err(docker_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_network(&self, network: &str) -> Result<(), ProvisionerError> {
        match self.docker.inspect_network::<String>(network, None).await {
            Ok(_) => return Ok(()),
            Err(e) => debug!("Network {} not inspectable ({}), creating it", network, e),
        }

        let options = CreateNetworkOptions {
            name: network.to_string(),
            ..Default::default()
        };
        self.docker
            .create_network(options)
            .await
            .map_err(docker_error)?;

        info!("Created Docker network: {}", network);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn build_image(&self, context: &Path, image_ref: &str) -> Result<(), ProvisionerError> {
        let spec = CommandSpec::new("docker")
            .args(["build", "-t", image_ref, "."])
            .current_dir(context);
        self.runner.run(&spec).await?;
        info!("Built Docker image: {}", image_ref);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_container(&self, spec: &RunSpec) -> Result<String, ProvisionerError> {
        let port_key = container_port_key(spec.container_port);

        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(
                port_key.clone(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(spec.host_port.to_string()),
                }]),
            )])),
            network_mode: Some(spec.network.clone()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            labels: Some(HashMap::from([(ENV_LABEL.to_string(), spec.name.clone())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(docker_error)?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(docker_error)?;

        info!(
            "Started container: {} with ID: {} ({}:{})",
            spec.name, response.id, spec.host_port, spec.container_port
        );
        Ok(response.id)
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, name: &str) -> Result<(), ProvisionerError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(docker_error)?;

        info!("Removed container: {}", name);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_image(&self, image_ref: &str) -> Result<(), ProvisionerError> {
        let options = RemoveImageOptions {
            force: true,
            noprune: false,
        };

        self.docker
            .remove_image(image_ref, Some(options), None)
            .await
            .map_err(|e| ProvisionerError::DockerError {
                message: format!("Failed to remove image {image_ref}: {e}"),
            })?;

        info!("Removed Docker image: {}", image_ref);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn compose_up(&self, workdir: &Path, compose_file: &str) -> Result<(), ProvisionerError> {
        let spec = CommandSpec::new("docker")
            .args(["compose", "-f", compose_file, "up", "-d", "--build"])
            .current_dir(workdir);
        self.runner.run(&spec).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn compose_down(
        &self,
        workdir: &Path,
        compose_file: &str,
    ) -> Result<(), ProvisionerError> {
        let spec = CommandSpec::new("docker")
            .args(["compose", "-f", compose_file, "down", "-v"])
            .current_dir(workdir);
        self.runner.run(&spec).await?;
        Ok(())
    }
}
