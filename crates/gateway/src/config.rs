use common::{Environment, LogLevel};
use inference::DetectorConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Deployment variants only set a bare `PORT`; it wins over `server.port`.
const PORT_OVERRIDE_VAR: &str = "PORT";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl ServerSettings {
    pub fn address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub prediction_dir: PathBuf,
    /// Prebuilt single-page frontend. Not served when unset.
    pub frontend_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct RetentionSettings {
    pub max_age_secs: Option<u64>,
    pub max_artifacts: Option<usize>,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub retention: RetentionSettings,
    pub inference_timeout_secs: u64,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Config {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Catch values that deserialize fine but would break the service later.
    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.inference_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "inference_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(config::ConfigError::Message(
                "server.body_limit_bytes must be non-zero".to_string(),
            ));
        }
        self.detector
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let port_override = std::env::var(PORT_OVERRIDE_VAR).ok();

    let config = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5000)?
        .set_default("server.body_limit_bytes", 16 * 1024 * 1024)?
        .set_default("storage.upload_dir", "static/uploads")?
        .set_default("storage.prediction_dir", "static/predictions")?
        .set_default("retention.sweep_interval_secs", 300)?
        .set_default("inference_timeout_secs", 60)?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.port", port_override)?
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference::ExecutionProvider;
    use serial_test::serial;

    const VARS: [&str; 11] = [
        "PORT",
        "GATEWAY_LOG_LEVEL",
        "GATEWAY_INFERENCE_TIMEOUT_SECS",
        "GATEWAY_SERVER__BODY_LIMIT_BYTES",
        "GATEWAY_DETECTOR__INPUT_WIDTH",
        "GATEWAY_ENVIRONMENT",
        "GATEWAY_SERVER__PORT",
        "GATEWAY_STORAGE__FRONTEND_DIR",
        "GATEWAY_RETENTION__MAX_ARTIFACTS",
        "GATEWAY_DETECTOR__MODEL_PATH",
        "GATEWAY_DETECTOR__EXECUTION_PROVIDER",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();

        let config = get_configuration().unwrap();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.environment, Environment::Development);
        assert!(config.otel_endpoint.is_none());
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.body_limit_bytes, 16_777_216);
        assert_eq!(config.storage.upload_dir, PathBuf::from("static/uploads"));
        assert_eq!(
            config.storage.prediction_dir,
            PathBuf::from("static/predictions")
        );
        assert!(config.storage.frontend_dir.is_none());
        assert!(config.retention.max_age_secs.is_none());
        assert_eq!(config.retention.sweep_interval_secs, 300);
        assert_eq!(config.inference_timeout(), Duration::from_secs(60));
        assert_eq!(config.detector.model_path, PathBuf::from("weights/best.onnx"));
        assert_eq!(
            config.server.address().unwrap(),
            "0.0.0.0:5000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    #[serial]
    fn test_nested_env_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("GATEWAY_ENVIRONMENT", "production");
            std::env::set_var("GATEWAY_SERVER__PORT", "8080");
            std::env::set_var("GATEWAY_STORAGE__FRONTEND_DIR", "frontend/build");
            std::env::set_var("GATEWAY_RETENTION__MAX_ARTIFACTS", "100");
            std::env::set_var("GATEWAY_DETECTOR__MODEL_PATH", "/models/detr.onnx");
            std::env::set_var("GATEWAY_DETECTOR__EXECUTION_PROVIDER", "cuda");
        }

        let config = get_configuration().unwrap();
        clear_env();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.storage.frontend_dir,
            Some(PathBuf::from("frontend/build"))
        );
        assert_eq!(config.retention.max_artifacts, Some(100));
        assert_eq!(config.detector.model_path, PathBuf::from("/models/detr.onnx"));
        assert_eq!(config.detector.execution_provider, ExecutionProvider::Cuda);
        // Untouched detector fields keep their defaults
        assert_eq!(config.detector.input_width, 640);
    }

    #[test]
    #[serial]
    fn test_bare_port_wins() {
        clear_env();
        unsafe {
            std::env::set_var("GATEWAY_SERVER__PORT", "8080");
            std::env::set_var("PORT", "9090");
        }

        let config = get_configuration().unwrap();
        clear_env();

        assert_eq!(config.server.port, 9090);
    }

    #[test]
    #[serial]
    fn test_invalid_log_level_is_rejected() {
        clear_env();
        unsafe { std::env::set_var("GATEWAY_LOG_LEVEL", "verbose") };

        let result = get_configuration();
        clear_env();

        assert!(result.is_err(), "Unknown log level should fail to load");
    }

    #[test]
    #[serial]
    fn test_environment_aliases_are_accepted() {
        for (raw, expected) in [
            ("prod", Environment::Production),
            ("Production", Environment::Production),
            ("DEV", Environment::Development),
        ] {
            clear_env();
            unsafe { std::env::set_var("GATEWAY_ENVIRONMENT", raw) };

            let result = get_configuration();
            clear_env();

            assert_eq!(result.unwrap().environment, expected, "{}", raw);
        }
    }

    #[test]
    #[serial]
    fn test_zero_inference_timeout_is_rejected() {
        clear_env();
        unsafe { std::env::set_var("GATEWAY_INFERENCE_TIMEOUT_SECS", "0") };

        let result = get_configuration();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("inference_timeout_secs"), "{}", err);
    }

    #[test]
    #[serial]
    fn test_zero_body_limit_is_rejected() {
        clear_env();
        unsafe { std::env::set_var("GATEWAY_SERVER__BODY_LIMIT_BYTES", "0") };

        let result = get_configuration();
        clear_env();

        assert!(result.is_err(), "A zero body limit would refuse every upload");
    }

    #[test]
    #[serial]
    fn test_zero_detector_input_size_is_rejected() {
        clear_env();
        unsafe { std::env::set_var("GATEWAY_DETECTOR__INPUT_WIDTH", "0") };

        let result = get_configuration();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("input size"), "{}", err);
    }
}
