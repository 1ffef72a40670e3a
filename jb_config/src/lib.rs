//! ABOUTME: Layered configuration: compiled-in defaults, optional file, `JB_`-prefixed env
//! ABOUTME: Validated with `validator` before use so a malformed config fails fast at startup

use config::{Config as ConfigBuilder, Environment, File};
use jb_core::{Error, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which board backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardBackend {
    Sqlite,
    Redis,
}

impl Default for BoardBackend {
    fn default() -> Self {
        BoardBackend::Sqlite
    }
}

/// Which dispatch strategy the conductor runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConductorMode {
    Blocking,
    Nonblocking,
}

impl Default for ConductorMode {
    fn default() -> Self {
        ConductorMode::Blocking
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SqliteBoardSettings {
    #[validate(length(min = 1))]
    pub path: String,
    #[validate(range(min = 1))]
    pub session_ttl_seconds: u64,
}

impl Default for SqliteBoardSettings {
    fn default() -> Self {
        Self {
            path: "sqlite://jobboard.db?mode=rwc".to_string(),
            session_ttl_seconds: 30,
        }
    }
}

#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct RedisBoardSettings {
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1))]
    pub lease_seconds: u64,
}

impl Default for RedisBoardSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1/".to_string(),
            lease_seconds: 300,
        }
    }
}

impl std::fmt::Debug for RedisBoardSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBoardSettings")
            .field("url", &"[REDACTED]")
            .field("lease_seconds", &self.lease_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct BoardConfig {
    pub backend: BoardBackend,
    #[validate(nested)]
    pub sqlite: SqliteBoardSettings,
    #[validate(nested)]
    pub redis: RedisBoardSettings,
    #[validate(length(min = 1))]
    pub root: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ConductorConfig {
    #[validate(length(min = 1))]
    pub name: String,
    pub mode: ConductorMode,
    #[validate(range(min = 0.000001))]
    pub wait_timeout_seconds: f64,
    #[validate(range(min = 1))]
    pub job_compiler_error_limit: u32,
    pub max_dispatches: Option<u64>,
    #[validate(range(min = 1))]
    pub worker_pool_size: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            name: "conductor".to_string(),
            mode: ConductorMode::Blocking,
            wait_timeout_seconds: 5.0,
            job_compiler_error_limit: 1,
            max_dispatches: None,
            worker_pool_size: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Top-level configuration for the board/conductor/app stack.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub board: BoardConfig,
    #[validate(nested)]
    pub conductor: ConductorConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration: compiled-in defaults, an optional `jobboard.toml`
    /// in the working directory, then `JB_`-prefixed environment variables
    /// (highest priority), validated before returning.
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("board.backend", "sqlite")?
            .set_default("board.root", "jobboard")?
            .set_default("board.sqlite.path", "sqlite://jobboard.db?mode=rwc")?
            .set_default("board.sqlite.session_ttl_seconds", 30)?
            .set_default("board.redis.url", "redis://127.0.0.1/")?
            .set_default("board.redis.lease_seconds", 300)?
            .set_default("conductor.name", "conductor")?
            .set_default("conductor.mode", "blocking")?
            .set_default("conductor.wait_timeout_seconds", 5.0)?
            .set_default("conductor.job_compiler_error_limit", 1)?
            .set_default("conductor.worker_pool_size", 4)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        if std::path::Path::new("jobboard.toml").exists() {
            builder = builder.add_source(File::with_name("jobboard").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("JB")
                .try_parsing(true)
                .separator("_"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build config: {e}")))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("failed to deserialize config: {e}")))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("config validation failed: {e}")))?;

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        for key in ["JB_CONDUCTOR_NAME", "JB_CONDUCTOR_MODE", "JB_BOARD_BACKEND"] {
            env::remove_var(key);
        }

        let config = Config::load().expect("should load with defaults");
        assert_eq!(config.conductor.name, "conductor");
        assert_eq!(config.conductor.mode, ConductorMode::Blocking);
        assert_eq!(config.board.backend, BoardBackend::Sqlite);
        assert_eq!(config.conductor.job_compiler_error_limit, 1);
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        env::set_var("JB_CONDUCTOR_NAME", "worker-a");
        env::set_var("JB_CONDUCTOR_MODE", "nonblocking");
        env::set_var("JB_BOARD_BACKEND", "redis");

        let config = Config::load().expect("should load from env");
        assert_eq!(config.conductor.name, "worker-a");
        assert_eq!(config.conductor.mode, ConductorMode::Nonblocking);
        assert_eq!(config.board.backend, BoardBackend::Redis);

        env::remove_var("JB_CONDUCTOR_NAME");
        env::remove_var("JB_CONDUCTOR_MODE");
        env::remove_var("JB_BOARD_BACKEND");
    }

    #[test]
    fn test_config_validation_rejects_zero_worker_pool() {
        let _lock = ENV_MUTEX.lock().unwrap();
        env::set_var("JB_CONDUCTOR_WORKER_POOL_SIZE", "0");

        let result = Config::load();
        assert!(result.is_err());

        env::remove_var("JB_CONDUCTOR_WORKER_POOL_SIZE");
    }

    #[test]
    fn test_redis_url_is_redacted_in_debug() {
        let settings = RedisBoardSettings::default();
        let debug_output = format!("{settings:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("127.0.0.1"));
    }
}
