#![allow(dead_code)]

use qa_control::{Backends, ControlPlane, StateStore};
use qa_models::{Config, ProvisionRequest};
use qa_testsupport::{test_config, FakeResolver, FakeRunner, FakeRuntime, FakeTunnels, TEST_SHA};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub runner: Arc<FakeRunner>,
    pub runtime: Arc<FakeRuntime>,
    pub tunnels: Arc<FakeTunnels>,
    pub control: Arc<ControlPlane>,
}

pub struct HarnessBuilder {
    runner: FakeRunner,
    runtime: FakeRuntime,
    tunnels: FakeTunnels,
    tweak: Box<dyn FnOnce(&mut Config)>,
}

impl HarnessBuilder {
    pub fn runner(mut self, runner: FakeRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn runtime(mut self, runtime: FakeRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn tunnels(mut self, tunnels: FakeTunnels) -> Self {
        self.tunnels = tunnels;
        self
    }

    pub fn config(mut self, tweak: impl FnOnce(&mut Config) + 'static) -> Self {
        self.tweak = Box::new(tweak);
        self
    }

    pub async fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        (self.tweak)(&mut config);

        let store = Arc::new(
            StateStore::open(&dir.path().join(&config.data.state_file))
                .await
                .unwrap(),
        );
        let runner = Arc::new(self.runner);
        let runtime = Arc::new(self.runtime);
        let tunnels = Arc::new(self.tunnels);
        let resolver = Arc::new(
            FakeResolver::new()
                .with_branch("main", TEST_SHA)
                .with_branch("feature/login", "fedcba9876543210fedcba9876543210fedcba98"),
        );

        let control = Arc::new(ControlPlane::new(
            config.clone(),
            store,
            Backends {
                resolver,
                runner: runner.clone(),
                runtime: runtime.clone(),
                tunnels: tunnels.clone(),
            },
        ));

        Harness {
            dir,
            config,
            runner,
            runtime,
            tunnels,
            control,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder {
        runner: FakeRunner::new(),
        runtime: FakeRuntime::new(),
        tunnels: FakeTunnels::new(),
        tweak: Box::new(|_| {}),
    }
}

pub fn request(branch: &str) -> ProvisionRequest {
    ProvisionRequest {
        branch: branch.to_string(),
        service: "web".to_string(),
        ttl_minutes: None,
    }
}

pub fn compose_runner() -> FakeRunner {
    FakeRunner::new().with_checkout_file("docker-compose.qa.yml", "services:\n  web: {}\n")
}
