//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field carries a serde default, so an empty source yields
//! a usable configuration.

pub mod logging;
pub mod pool;
pub mod reporter;
pub mod scheduler;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::pool::PoolConfig;
use self::reporter::ReporterConfig;
use self::scheduler::SchedulerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Worker pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Scheduled runner settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Pool statistics reporter settings.
    #[serde(default)]
    pub reporter: ReporterConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `JOBRUNNER_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("JOBRUNNER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let app: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        app.validate()?;
        Ok(app)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), AppError> {
        self.pool.validate()?;
        self.scheduler.validate()?;
        self.reporter.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = config::Config::builder().build().unwrap();
        let app: AppConfig = config.try_deserialize().unwrap();

        assert!(app.pool.core_workers >= 2);
        assert_eq!(app.pool.max_workers, app.pool.core_workers * 2);
        assert_eq!(app.pool.name_prefix, "worker");
        assert_eq!(app.scheduler.workers, 4);
        assert_eq!(app.scheduler.name_prefix, "scheduled");
        assert_eq!(app.reporter.period_seconds, 300);
        assert_eq!(app.logging.level, "info");
        assert!(app.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides() {
        let toml = r#"
            [pool]
            core_workers = 3
            max_workers = 6
            keep_alive_seconds = 10

            [scheduler]
            workers = 1
            shutdown_timeout_seconds = 5

            [logging]
            format = "json"
        "#;
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let app: AppConfig = config.try_deserialize().unwrap();

        assert_eq!(app.pool.core_workers, 3);
        assert_eq!(app.pool.max_workers, 6);
        assert_eq!(app.pool.keep_alive_seconds, 10);
        assert_eq!(app.pool.shutdown_timeout_seconds, 60);
        assert_eq!(app.scheduler.workers, 1);
        assert_eq!(app.scheduler.shutdown_timeout_seconds, 5);
        assert_eq!(app.logging.format, "json");
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut app = AppConfig::default();
        app.pool.core_workers = 8;
        app.pool.max_workers = 4;
        let err = app.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_serializes_to_json() {
        let app = AppConfig::default();
        let json = serde_json::to_value(&app).unwrap();
        assert_eq!(json["scheduler"]["name_prefix"], "scheduled");
    }
}
