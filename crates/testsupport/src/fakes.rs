use async_trait::async_trait;
use qa_invoker::{CommandRunner, CommandSpec, ContainerRuntime, RunSpec, TunnelProvider};
use qa_models::ProvisionerError;
use qa_packaging::BranchResolver;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

fn failure(what: &str) -> ProvisionerError {
    ProvisionerError::CommandFailed {
        command: what.to_string(),
        stdout: String::new(),
        stderr: "injected failure".to_string(),
    }
}

/// Resolves configured branches; anything else is a 404.
#[derive(Default)]
pub struct FakeResolver {
    branches: Mutex<HashMap<String, String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(self, branch: &str, sha: &str) -> Self {
        self.branches
            .lock()
            .unwrap()
            .insert(branch.to_string(), sha.to_string());
        self
    }
}

#[async_trait]
impl BranchResolver for FakeResolver {
    async fn resolve_branch(&self, branch: &str) -> Result<String, ProvisionerError> {
        self.branches
            .lock()
            .unwrap()
            .get(branch)
            .cloned()
            .ok_or_else(|| ProvisionerError::BranchNotFound {
                branch: branch.to_string(),
                status: 404,
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCommand {
    pub line: String,
    pub cwd: Option<PathBuf>,
}

/// Records commands instead of running them. A `git clone` writes the
/// configured checkout files into the working directory.
#[derive(Default)]
pub struct FakeRunner {
    commands: Mutex<Vec<RecordedCommand>>,
    checkout_files: Mutex<Vec<(String, String)>>,
    fail_on: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files that appear in every clone, e.g. a compose file.
    pub fn with_checkout_file(self, name: &str, contents: &str) -> Self {
        self.checkout_files
            .lock()
            .unwrap()
            .push((name.to_string(), contents.to_string()));
        self
    }

    /// Fails any command whose rendered line contains `needle`.
    pub fn fail_on(self, needle: &str) -> Self {
        self.fail_on.lock().unwrap().push(needle.to_string());
        self
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.line).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String, ProvisionerError> {
        let line = spec.display();
        self.commands.lock().unwrap().push(RecordedCommand {
            line: line.clone(),
            cwd: spec.cwd.clone(),
        });

        if self.fail_on.lock().unwrap().iter().any(|n| line.contains(n)) {
            return Err(spec_failure(spec));
        }

        if spec.program == "git" && spec.args.first().map(String::as_str) == Some("clone") {
            if let Some(cwd) = &spec.cwd {
                for (name, contents) in self.checkout_files.lock().unwrap().iter() {
                    std::fs::write(cwd.join(name), contents)?;
                }
            }
        }
        Ok(String::new())
    }
}

fn spec_failure(spec: &CommandSpec) -> ProvisionerError {
    failure(&spec.display())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeCall {
    Ping,
    EnsureNetwork(String),
    BuildImage { context: PathBuf, image: String },
    RunContainer(RunSpec),
    RemoveContainer(String),
    RemoveImage(String),
    ComposeUp { workdir: PathBuf, file: String },
    ComposeDown { workdir: PathBuf, file: String },
}

impl RuntimeCall {
    fn kind(&self) -> &'static str {
        match self {
            RuntimeCall::Ping => "ping",
            RuntimeCall::EnsureNetwork(_) => "ensure_network",
            RuntimeCall::BuildImage { .. } => "build_image",
            RuntimeCall::RunContainer(_) => "run_container",
            RuntimeCall::RemoveContainer(_) => "remove_container",
            RuntimeCall::RemoveImage(_) => "remove_image",
            RuntimeCall::ComposeUp { .. } => "compose_up",
            RuntimeCall::ComposeDown { .. } => "compose_down",
        }
    }
}

/// In-memory container runtime. Operations named in `fail_on` error out
/// after being recorded.
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    fail_on: Mutex<Vec<&'static str>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// `op` is the trait method name, e.g. `"run_container"`.
    pub fn fail_on(self, op: &'static str) -> Self {
        self.fail_on.lock().unwrap().push(op);
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.kind() == op).count()
    }

    fn record(&self, call: RuntimeCall) -> Result<(), ProvisionerError> {
        let kind = call.kind();
        self.calls.lock().unwrap().push(call);
        if self.fail_on.lock().unwrap().contains(&kind) {
            return Err(ProvisionerError::DockerError {
                message: format!("injected {kind} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::Ping)
    }

    async fn ensure_network(&self, network: &str) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::EnsureNetwork(network.to_string()))
    }

    async fn build_image(&self, context: &Path, image_ref: &str) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::BuildImage {
            context: context.to_path_buf(),
            image: image_ref.to_string(),
        })
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<String, ProvisionerError> {
        self.record(RuntimeCall::RunContainer(spec.clone()))?;
        Ok(format!("container-{}", spec.name))
    }

    async fn remove_container(&self, name: &str) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::RemoveContainer(name.to_string()))
    }

    async fn remove_image(&self, image_ref: &str) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::RemoveImage(image_ref.to_string()))
    }

    async fn compose_up(&self, workdir: &Path, compose_file: &str) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::ComposeUp {
            workdir: workdir.to_path_buf(),
            file: compose_file.to_string(),
        })
    }

    async fn compose_down(
        &self,
        workdir: &Path,
        compose_file: &str,
    ) -> Result<(), ProvisionerError> {
        self.record(RuntimeCall::ComposeDown {
            workdir: workdir.to_path_buf(),
            file: compose_file.to_string(),
        })
    }
}

/// Hands out `https://<env_id>.ngrok.test` URLs.
#[derive(Default)]
pub struct FakeTunnels {
    open: Mutex<HashMap<String, u16>>,
    closed: Mutex<Vec<String>>,
    fail: bool,
    held: Mutex<Option<Arc<Notify>>>,
}

impl FakeTunnels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// The first `open` waits for `gate` and then fails; later opens succeed.
    pub fn held(gate: Arc<Notify>) -> Self {
        Self {
            held: Mutex::new(Some(gate)),
            ..Self::default()
        }
    }

    pub fn open_tunnels(&self) -> HashMap<String, u16> {
        self.open.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunnelProvider for FakeTunnels {
    async fn open(&self, env_id: &str, port: u16) -> Result<String, ProvisionerError> {
        let gate = self.held.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
            return Err(ProvisionerError::TunnelFailed {
                reason: "held tunnel released".to_string(),
            });
        }
        if self.fail {
            return Err(ProvisionerError::TunnelFailed {
                reason: "injected tunnel failure".to_string(),
            });
        }
        self.open.lock().unwrap().insert(env_id.to_string(), port);
        Ok(format!("https://{env_id}.ngrok.test"))
    }

    async fn close(&self, env_id: &str) {
        if self.open.lock().unwrap().remove(env_id).is_some() {
            self.closed.lock().unwrap().push(env_id.to_string());
        }
    }
}
