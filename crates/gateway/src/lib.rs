pub mod config;
pub mod errors;
pub mod format;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod upload;

pub use config::{GatewayConfig, get_configuration};
pub use errors::{ApiError, ErrorPolicy};
pub use format::{DetectResponse, ResponseFormat};
pub use routes::router;
pub use state::AppState;
pub use upload::ScratchDir;
