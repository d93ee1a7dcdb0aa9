use std::env;
use std::fmt;
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// How new catalog identities are minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    Uuid,
    Sequential,
}

impl IdStrategy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uuid" | "" => Ok(Self::Uuid),
            "sequential" | "sequence" => Ok(Self::Sequential),
            other => Err(ConfigError::InvalidIdStrategy(other.to_string())),
        }
    }
}

/// Top-level configuration for the engine and its command line front end.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub catalog: CatalogConfig,
    pub engine: EngineConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("DECREE_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let path = env::var("DECREE_CATALOG_PATH").unwrap_or_else(|_| "catalog.json".to_string());
        let id_strategy =
            IdStrategy::parse(&env::var("DECREE_ID_STRATEGY").unwrap_or_else(|_| "uuid".into()))?;

        let override_reason_min_chars = env::var("DECREE_OVERRIDE_REASON_MIN")
            .unwrap_or_else(|_| DEFAULT_OVERRIDE_REASON_MIN.to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidOverrideReasonMin)?;
        if override_reason_min_chars == 0 {
            return Err(ConfigError::InvalidOverrideReasonMin);
        }

        let log_level = env::var("DECREE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            catalog: CatalogConfig {
                path: PathBuf::from(path),
            },
            engine: EngineConfig {
                id_strategy,
                override_reason_min_chars,
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

const DEFAULT_OVERRIDE_REASON_MIN: usize = 3;

/// Location of the JSON catalog snapshot used by the command line.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

/// Knobs that change engine behavior rather than plumbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub id_strategy: IdStrategy,
    /// Minimum trimmed length of a manual override reason.
    pub override_reason_min_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_strategy: IdStrategy::Uuid,
            override_reason_min_chars: DEFAULT_OVERRIDE_REASON_MIN,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidIdStrategy(String),
    InvalidOverrideReasonMin,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidIdStrategy(value) => write!(
                f,
                "DECREE_ID_STRATEGY must be `uuid` or `sequential`, found `{value}`"
            ),
            ConfigError::InvalidOverrideReasonMin => {
                write!(f, "DECREE_OVERRIDE_REASON_MIN must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("DECREE_ENV");
        env::remove_var("DECREE_CATALOG_PATH");
        env::remove_var("DECREE_ID_STRATEGY");
        env::remove_var("DECREE_OVERRIDE_REASON_MIN");
        env::remove_var("DECREE_LOG_LEVEL");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.catalog.path, PathBuf::from("catalog.json"));
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn reads_sequential_strategy_and_reason_minimum() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DECREE_ENV", "prod");
        env::set_var("DECREE_ID_STRATEGY", "Sequential");
        env::set_var("DECREE_OVERRIDE_REASON_MIN", "10");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.engine.id_strategy, IdStrategy::Sequential);
        assert_eq!(config.engine.override_reason_min_chars, 10);
        reset_env();
    }

    #[test]
    fn rejects_zero_reason_minimum() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DECREE_OVERRIDE_REASON_MIN", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidOverrideReasonMin)
        ));
        reset_env();
    }

    #[test]
    fn rejects_unknown_id_strategy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DECREE_ID_STRATEGY", "snowflake");
        match AppConfig::load() {
            Err(ConfigError::InvalidIdStrategy(value)) => assert_eq!(value, "snowflake"),
            other => panic!("expected invalid id strategy, got {other:?}"),
        }
        reset_env();
    }
}
