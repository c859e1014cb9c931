use qa_control::ControlPlane;
use qa_metrics::MetricsService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ControlPlane>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(control: Arc<ControlPlane>, metrics: Arc<MetricsService>) -> Self {
        Self { control, metrics }
    }
}
