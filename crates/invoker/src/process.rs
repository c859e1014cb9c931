use async_trait::async_trait;
use qa_models::ProvisionerError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, instrument};

const REDACTED: &str = "***";

/// A subprocess invocation. Values registered with [`CommandSpec::secret`]
/// never show up in logs or error messages.
#[derive(Clone, Debug, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Masks every registered secret inside `text`.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }

    /// Shell-like rendering of the command line, secrets masked.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        self.redact(&line)
    }

    fn failure(&self, stdout: &str, stderr: &str) -> ProvisionerError {
        ProvisionerError::CommandFailed {
            command: self.display(),
            stdout: self.redact(stdout.trim()),
            stderr: self.redact(stderr.trim()),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Runs the command to completion and returns its trimmed stdout.
    async fn run(&self, spec: &CommandSpec) -> Result<String, ProvisionerError>;
}

#[derive(Debug, Default, Clone)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip_all, fields(command = %spec.display()))]
    async fn run(&self, spec: &CommandSpec) -> Result<String, ProvisionerError> {
        info!("+ {}", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let output = command
            .output()
            .await
            .map_err(|e| spec.failure("", &e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = ?output.status.code(), "Command failed: {}", spec.display());
            return Err(spec.failure(&stdout, &stderr));
        }

        Ok(stdout.trim().to_string())
    }
}
