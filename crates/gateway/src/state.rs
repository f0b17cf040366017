use crate::errors::ErrorPolicy;
use crate::format::ResponseFormat;
use crate::metrics::DetectMetrics;
use crate::upload::ScratchDir;
use inference::DetectionModel;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn DetectionModel>,
    pub scratch: ScratchDir,
    pub default_format: ResponseFormat,
    pub errors: ErrorPolicy,
    pub metrics: Arc<DetectMetrics>,
}

impl AppState {
    pub fn new(
        model: Arc<dyn DetectionModel>,
        scratch: ScratchDir,
        default_format: ResponseFormat,
        errors: ErrorPolicy,
    ) -> Self {
        Self {
            model,
            scratch,
            default_format,
            errors,
            metrics: Arc::new(DetectMetrics::default()),
        }
    }
}
