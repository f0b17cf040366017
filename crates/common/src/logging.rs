use crate::config::Environment;
use opentelemetry_sdk::trace::SdkTracer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber without span export.
///
/// `RUST_LOG` takes precedence over `default_level`. Development gets pretty
/// ANSI output, production gets one JSON object per line.
pub fn setup_logging(environment: Environment, default_level: &str) {
    init_subscriber(environment, default_level, None);
}

/// Shared by [`setup_logging`] and [`crate::TelemetryGuard`]; the latter
/// passes its SDK tracer so spans are bridged to OpenTelemetry.
pub(crate) fn init_subscriber(
    environment: Environment,
    default_level: &str,
    tracer: Option<SdkTracer>,
) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}
