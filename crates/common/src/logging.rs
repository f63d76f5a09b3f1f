use crate::config::{Environment, LogLevel};
use opentelemetry_sdk::trace::SdkTracer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber: pretty output for development,
/// JSON for production.
///
/// `RUST_LOG` takes precedence over `level` when set. When a `tracer` is
/// provided (see [`crate::TelemetryGuard::tracer`]) spans are also exported
/// over OTLP.
pub fn setup_logging(level: LogLevel, environment: Environment, tracer: Option<SdkTracer>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

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
