use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, instrument};

use crate::control_plane::ControlPlane;

type Observer = Box<dyn Fn(&[String]) + Send + Sync>;

/// Periodically destroys environments whose TTL has run out.
pub struct TtlReaper {
    control: Arc<ControlPlane>,
    period: Duration,
    observer: Option<Observer>,
}

impl TtlReaper {
    pub fn new(control: Arc<ControlPlane>, period: Duration) -> Self {
        Self {
            control,
            period,
            observer: None,
        }
    }

    /// Called with the ids collected by every sweep that removed something.
    pub fn with_observer(mut self, observer: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!("Starting TTL reaper, sweeping every {:?}", self.period);

        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    pub async fn run_cycle(&self) -> Vec<String> {
        let collected = self.control.garbage_collect().await.garbage_collected;
        if !collected.is_empty() {
            info!(collected = ?collected, "TTL reaper removed expired environments");
            if let Some(observer) = &self.observer {
                observer(&collected);
            }
        }
        collected
    }
}
