use crate::config::GatewayConfig;
use common::TelemetryGuard;

/// Install the tracing subscriber, with OTLP export when an endpoint is configured.
///
/// The returned guard must be held for the lifetime of the server.
pub fn setup_logging(config: &GatewayConfig) -> anyhow::Result<Option<TelemetryGuard>> {
    match &config.otel_endpoint {
        Some(endpoint) => {
            let guard = TelemetryGuard::init(
                "gateway",
                endpoint,
                config.environment,
                config.log_level.as_str(),
            )?;
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(config.environment, config.log_level.as_str());
            Ok(None)
        }
    }
}
