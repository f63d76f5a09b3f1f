use serde::Deserialize;

/// Deserialized through [`TryFrom<String>`], so aliases and any letter case
/// are accepted from config sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `development` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing_accepts_aliases() {
        assert_eq!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        );
        assert_eq!(
            Environment::try_from("dev".to_string()),
            Ok(Environment::Development)
        );
    }

    #[test]
    fn test_environment_parsing_rejects_unknown() {
        let err = Environment::try_from("staging".to_string()).unwrap_err();
        assert!(
            err.contains("staging"),
            "Error should name the rejected value: {}",
            err
        );
    }

    #[test]
    fn test_deserialize_accepts_aliases() {
        use serde::de::{IntoDeserializer, value::Error};

        for (raw, expected) in [
            ("prod", Environment::Production),
            ("PRODUCTION", Environment::Production),
            ("Dev", Environment::Development),
        ] {
            let deserializer = IntoDeserializer::<Error>::into_deserializer(raw.to_string());
            assert_eq!(Environment::deserialize(deserializer), Ok(expected), "{}", raw);
        }
    }

    #[test]
    fn test_deserialize_rejects_unknown() {
        use serde::de::{IntoDeserializer, value::Error};

        let deserializer = IntoDeserializer::<Error>::into_deserializer("staging".to_string());
        let err = Environment::deserialize(deserializer).unwrap_err();

        assert!(err.to_string().contains("staging"), "{}", err);
    }

    #[test]
    fn test_as_str_round_trips_through_parsing() {
        for env in [Environment::Development, Environment::Production] {
            assert_eq!(Environment::try_from(env.as_str().to_string()), Ok(env));
        }
    }
}
