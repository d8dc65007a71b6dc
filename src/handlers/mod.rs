use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::logs::LogService;

pub mod health;
pub mod ingest;
pub mod logs;
pub mod metrics_handler;

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LogService>,
    /// Absent when the Prometheus recorder was not installed
    pub metrics: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(service: Arc<LogService>) -> Self {
        Self {
            service,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: Arc<PrometheusHandle>) -> Self {
        self.metrics = Some(handle);
        self
    }
}
