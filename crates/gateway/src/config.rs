use crate::format::ResponseFormat;
use common::Environment;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub response_format: ResponseFormat,
    pub expose_error_details: Option<bool>,
    pub otel_endpoint: Option<String>,
}

impl GatewayConfig {
    /// Whether 500 responses carry the underlying error message.
    /// Unless set explicitly, only development exposes it.
    pub fn expose_errors(&self) -> bool {
        self.expose_error_details
            .unwrap_or(!self.environment.is_production())
    }
}

pub fn get_configuration() -> Result<GatewayConfig, config::ConfigError> {
    load_from(None)
}

/// Build the configuration from defaults and `GATEWAY_*` variables.
/// Passing `Some(vars)` reads from that map instead of the process environment.
pub fn load_from(
    vars: Option<HashMap<String, String>>,
) -> Result<GatewayConfig, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("bind_addr", "0.0.0.0:5000")?
        .set_default("upload_dir", "uploads")?
        .set_default("max_upload_bytes", 16 * 1024 * 1024_i64)?
        .set_default("response_format", "detailed_boxes")?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        )
        .build()?;

    let config: GatewayConfig = config.try_deserialize::<GatewayConfig>()?;

    Ok(config)
}
