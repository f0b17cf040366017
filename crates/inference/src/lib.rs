pub mod backend;
pub mod config;
pub mod detector;
pub mod labels;
pub mod model;
pub mod processing;

// Re-export commonly used types for convenience
pub use backend::{ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::InferenceConfig;
pub use detector::Detector;
pub use labels::ClassNames;
pub use model::{DetectedBox, DetectionModel, ResultGroup};
