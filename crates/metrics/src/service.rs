use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Registry, TextEncoder};
use qa_models::ProvisionerError;
use tracing::{info, instrument};

fn internal(e: prometheus::Error) -> ProvisionerError {
    ProvisionerError::InternalError {
        reason: e.to_string(),
    }
}

pub struct MetricsService {
    registry: Registry,
    provisions_total: Counter,
    provision_failures_total: Counter,
    destroys_total: Counter,
    garbage_collected_total: Counter,
    active_environments: Gauge,
    provision_duration_seconds: Histogram,
}

impl MetricsService {
    pub fn new() -> Result<Self, ProvisionerError> {
        let registry = Registry::new();

        let provisions_total = Counter::new(
            "qa_provisions_total",
            "Total number of environments provisioned",
        )
        .map_err(internal)?;

        let provision_failures_total = Counter::new(
            "qa_provision_failures_total",
            "Total number of failed provisioning requests",
        )
        .map_err(internal)?;

        let destroys_total = Counter::new(
            "qa_destroys_total",
            "Total number of environments destroyed on request",
        )
        .map_err(internal)?;

        let garbage_collected_total = Counter::new(
            "qa_garbage_collected_total",
            "Total number of expired environments garbage collected",
        )
        .map_err(internal)?;

        let active_environments = Gauge::new(
            "qa_active_environments",
            "Environments currently recorded in the ledger",
        )
        .map_err(internal)?;

        let provision_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "qa_provision_duration_seconds",
                "Time spent provisioning an environment",
            )
            .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        )
        .map_err(internal)?;

        registry
            .register(Box::new(provisions_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(provision_failures_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(destroys_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(garbage_collected_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(active_environments.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(provision_duration_seconds.clone()))
            .map_err(internal)?;

        Ok(Self {
            registry,
            provisions_total,
            provision_failures_total,
            destroys_total,
            garbage_collected_total,
            active_environments,
            provision_duration_seconds,
        })
    }

    #[instrument(skip(self))]
    pub fn record_provisioned(&self, env_id: &str, duration_secs: f64) {
        self.provisions_total.inc();
        self.provision_duration_seconds.observe(duration_secs);
        info!("Recorded provisioning of {} in {:.1}s", env_id, duration_secs);
    }

    pub fn record_provision_failure(&self, error_type: &str) {
        self.provision_failures_total.inc();
        info!("Recorded provisioning failure: {}", error_type);
    }

    pub fn record_destroyed(&self, env_id: &str) {
        self.destroys_total.inc();
        info!("Recorded destruction of {}", env_id);
    }

    pub fn record_garbage_collected(&self, count: usize) {
        self.garbage_collected_total.inc_by(count as f64);
    }

    pub fn set_active_environments(&self, count: usize) {
        self.active_environments.set(count as f64);
    }

    pub fn export(&self) -> Result<String, ProvisionerError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(internal)?;
        String::from_utf8(buffer).map_err(|e| ProvisionerError::InternalError {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_contains_recorded_values() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_provisioned("main-abc1234-000000", 42.0);
        metrics.record_provision_failure("TunnelError");
        metrics.record_destroyed("main-abc1234-000000");
        metrics.record_garbage_collected(3);
        metrics.set_active_environments(2);

        let text = metrics.export().unwrap();
        assert!(text.contains("qa_provisions_total 1"));
        assert!(text.contains("qa_provision_failures_total 1"));
        assert!(text.contains("qa_destroys_total 1"));
        assert!(text.contains("qa_garbage_collected_total 3"));
        assert!(text.contains("qa_active_environments 2"));
        assert!(text.contains("qa_provision_duration_seconds_count 1"));
    }
}
