//! Configuration infrastructure
//!
//! Settings are layered: built-in defaults, then an optional JSON file
//! (`$CONFIG_DIR/lead-intake/config.json` or `LEAD_INTAKE_CONFIG`), then
//! `LEAD_INTAKE__<SECTION>__<KEY>` environment variables. The legacy
//! `API_KEY_PEPPER` and `CRON_SECRET` variables are honoured last.

#![allow(clippy::derivable_impls)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::application::IngestionSettings;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub ingestion: IngestionConfig,
    pub rate_limits: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. "0.0.0.0:8080"
    pub bind_address: String,

    /// Request body cap in bytes, applied to every route
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. "sqlite://data/lead-intake.db" or "sqlite::memory:"
    pub url: String,

    pub max_connections: u32,
}

/// Secrets and caller identification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Server-side secret mixed into every API key digest
    pub api_key_pepper: String,

    /// Bearer secret for cron endpoints; cron routes reject everything when unset
    pub cron_secret: Option<String>,

    /// Header carrying the authenticated user id, set by the fronting auth proxy
    pub session_header: String,
}

/// Ingestion limits and behaviour switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Maximum CSV payload in bytes
    pub csv_max_bytes: usize,

    /// Maximum leads in one JSON upsert
    pub max_json_leads: usize,

    /// Rows per write transaction
    pub write_chunk_size: usize,

    /// Rows shown by CSV preview when the caller gives no count
    pub preview_rows: usize,

    /// Upper bound on a caller-supplied preview count
    pub preview_max_rows: usize,

    /// Drop unparseable follow-up dates instead of failing the row
    pub lenient_follow_up_dates: bool,

    /// Idempotency records older than this are swept
    pub idempotency_retention_secs: u64,

    /// Where idempotency records live
    pub idempotency_backend: IdempotencyBackend,

    /// Import jobs returned by the campaign listing
    pub import_history_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyBackend {
    Sqlite,
    Memory,
}

/// Token bucket capacities per call site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Capacity used by call sites without their own setting
    pub default_capacity: u32,

    /// Per API key capacity on the JSON upsert
    pub ingestion_capacity: u32,

    /// Capacity shared by cron endpoints
    pub cron_capacity: u32,

    /// Time for an empty bucket to refill completely, in milliseconds
    pub refill_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for rolling log files; defaults to `<data dir>/lead-intake/logs`
    pub log_dir: Option<PathBuf>,

    pub file_prefix: String,

    /// Module-specific log level filters (e.g., "sqlx": "warn")
    pub module_filters: HashMap<String, String>,
}

// ========================================================================
// Defaults
// ========================================================================

pub mod defaults {
    pub const BIND_ADDRESS: &str = "127.0.0.1:8080";

    /// 8 MiB covers a maximal CSV plus its JSON envelope
    pub const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

    pub const DATABASE_URL: &str = "sqlite://data/lead-intake.db";
    pub const DATABASE_MAX_CONNECTIONS: u32 = 10;

    pub const SESSION_HEADER: &str = "x-user-id";

    pub const CSV_MAX_BYTES: usize = 5 * 1024 * 1024;
    pub const MAX_JSON_LEADS: usize = 1000;
    pub const WRITE_CHUNK_SIZE: usize = 200;
    pub const PREVIEW_ROWS: usize = 10;
    pub const PREVIEW_MAX_ROWS: usize = 100;
    pub const LENIENT_FOLLOW_UP_DATES: bool = false;

    /// One hour
    pub const IDEMPOTENCY_RETENTION_SECS: u64 = 3600;
    pub const IMPORT_HISTORY_LIMIT: u32 = 50;

    pub const RATE_LIMIT_DEFAULT_CAPACITY: u32 = 100;
    pub const RATE_LIMIT_INGESTION_CAPACITY: u32 = 50;
    pub const RATE_LIMIT_CRON_CAPACITY: u32 = 10;
    pub const RATE_LIMIT_REFILL_INTERVAL_MS: u64 = 1000;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_FILE_PREFIX: &str = "lead-intake.log";
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
            body_limit_bytes: defaults::BODY_LIMIT_BYTES,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DATABASE_MAX_CONNECTIONS,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key_pepper: String::new(),
            cron_secret: None,
            session_header: defaults::SESSION_HEADER.to_string(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            csv_max_bytes: defaults::CSV_MAX_BYTES,
            max_json_leads: defaults::MAX_JSON_LEADS,
            write_chunk_size: defaults::WRITE_CHUNK_SIZE,
            preview_rows: defaults::PREVIEW_ROWS,
            preview_max_rows: defaults::PREVIEW_MAX_ROWS,
            lenient_follow_up_dates: defaults::LENIENT_FOLLOW_UP_DATES,
            idempotency_retention_secs: defaults::IDEMPOTENCY_RETENTION_SECS,
            idempotency_backend: IdempotencyBackend::Sqlite,
            import_history_limit: defaults::IMPORT_HISTORY_LIMIT,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_capacity: defaults::RATE_LIMIT_DEFAULT_CAPACITY,
            ingestion_capacity: defaults::RATE_LIMIT_INGESTION_CAPACITY,
            cron_capacity: defaults::RATE_LIMIT_CRON_CAPACITY,
            refill_interval_ms: defaults::RATE_LIMIT_REFILL_INTERVAL_MS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            file_prefix: defaults::LOG_FILE_PREFIX.to_string(),
            module_filters: HashMap::from([
                ("sqlx".to_string(), "warn".to_string()),
                ("hyper".to_string(), "warn".to_string()),
                ("tower".to_string(), "warn".to_string()),
            ]),
        }
    }
}

impl AppConfig {
    /// Reject settings that would make the service misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.write_chunk_size == 0 {
            bail!("ingestion.write_chunk_size must be greater than zero");
        }
        if self.ingestion.max_json_leads == 0 {
            bail!("ingestion.max_json_leads must be greater than zero");
        }
        if self.rate_limits.refill_interval_ms == 0 {
            bail!("rate_limits.refill_interval_ms must be greater than zero");
        }
        let capacities = [
            ("default_capacity", self.rate_limits.default_capacity),
            ("ingestion_capacity", self.rate_limits.ingestion_capacity),
            ("cron_capacity", self.rate_limits.cron_capacity),
        ];
        for (name, capacity) in capacities {
            if capacity == 0 {
                bail!("rate_limits.{name} must be greater than zero");
            }
        }
        if self.ingestion.preview_rows > self.ingestion.preview_max_rows {
            bail!("ingestion.preview_rows cannot exceed ingestion.preview_max_rows");
        }
        Ok(())
    }

    /// Application-layer view of the ingestion settings.
    pub fn ingestion_settings(&self) -> IngestionSettings {
        IngestionSettings {
            csv_max_bytes: self.ingestion.csv_max_bytes,
            max_json_leads: self.ingestion.max_json_leads,
            write_chunk_size: self.ingestion.write_chunk_size,
            preview_rows: self.ingestion.preview_rows,
            preview_max_rows: self.ingestion.preview_max_rows,
            lenient_follow_up_dates: self.ingestion.lenient_follow_up_dates,
            ingestion_rate_capacity: self.rate_limits.ingestion_capacity,
            cron_rate_capacity: self.rate_limits.cron_capacity,
            idempotency_retention: chrono::Duration::seconds(
                i64::try_from(self.ingestion.idempotency_retention_secs).unwrap_or(i64::MAX / 1000),
            ),
            import_history_limit: self.ingestion.import_history_limit,
        }
    }
}

/// Locates and loads the layered configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    pub const ENV_PREFIX: &'static str = "LEAD_INTAKE";
    pub const CONFIG_PATH_ENV: &'static str = "LEAD_INTAKE_CONFIG";

    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("lead-intake");
        Ok(config_dir)
    }

    /// Config file from `LEAD_INTAKE_CONFIG`, else the user config directory.
    pub fn new() -> Result<Self> {
        let config_path = match std::env::var_os(Self::CONFIG_PATH_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::get_config_dir()?.join("config.json"),
        };
        Ok(Self {
            config_path: Some(config_path),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Defaults and environment only.
    pub fn without_file() -> Self {
        Self { config_path: None }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write a default config file when none exists yet.
    pub async fn initialize_on_first_run(&self) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        if path.exists() {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create config directory: {dir:?}"))?;
        }
        let body = serde_json::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")?;
        fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write default config: {path:?}"))?;
        info!("🎉 First run detected - wrote default configuration to {:?}", path);
        Ok(())
    }

    /// Build the layered configuration and validate it.
    pub fn load(&self) -> Result<AppConfig> {
        let mut builder = config::Config::builder();
        if let Some(path) = &self.config_path {
            builder = builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(Self::ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut app_config: AppConfig = builder
            .build()
            .context("Failed to assemble configuration sources")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Ok(pepper) = std::env::var("API_KEY_PEPPER") {
            app_config.security.api_key_pepper = pepper;
        }
        if let Ok(secret) = std::env::var("CRON_SECRET") {
            app_config.security.cron_secret = Some(secret);
        }

        app_config.validate()?;
        Ok(app_config)
    }
}
