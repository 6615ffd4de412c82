// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::info;

use crate::domain::repositories::HealthCheck;

#[derive(Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

const SCHEMA: [&str; 16] = [
    r#"
    CREATE TABLE IF NOT EXISTS campaigns (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS status_definitions (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        label TEXT NOT NULL,
        sort_order INTEGER NOT NULL DEFAULT 0,
        is_default INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS custom_field_definitions (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        field_key TEXT NOT NULL,
        label TEXT NOT NULL,
        field_type TEXT NOT NULL,
        options TEXT,
        sort_order INTEGER NOT NULL DEFAULT 0,
        UNIQUE (tenant_id, field_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenant_members (
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        email TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'member',
        PRIMARY KEY (tenant_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        campaign_id TEXT NOT NULL,
        full_name TEXT,
        company TEXT,
        email TEXT,
        phone TEXT,
        external_id TEXT,
        status_id TEXT,
        owner_user_id TEXT,
        next_follow_up_at TEXT,
        custom_fields TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS import_jobs (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        campaign_id TEXT NOT NULL,
        created_by TEXT NOT NULL,
        file_name TEXT NOT NULL,
        mapping TEXT NOT NULL,
        stats TEXT NOT NULL,
        error_rows TEXT NOT NULL,
        status TEXT NOT NULL,
        failure TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS api_keys (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        name TEXT NOT NULL,
        key_hash TEXT NOT NULL UNIQUE,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_used_at TEXT,
        created_by TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ingestion_requests (
        tenant_id TEXT NOT NULL,
        key_hash TEXT NOT NULL,
        state TEXT NOT NULL,
        response_json TEXT,
        created_at TEXT NOT NULL,
        PRIMARY KEY (tenant_id, key_hash)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leads_campaign_email ON leads (campaign_id, email)",
    "CREATE INDEX IF NOT EXISTS idx_leads_campaign_phone ON leads (campaign_id, phone)",
    "CREATE INDEX IF NOT EXISTS idx_leads_tenant_external_id ON leads (tenant_id, external_id)",
    "CREATE INDEX IF NOT EXISTS idx_campaigns_tenant ON campaigns (tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_status_definitions_tenant ON status_definitions (tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_import_jobs_campaign ON import_jobs (tenant_id, campaign_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_api_keys_tenant ON api_keys (tenant_id)",
    "CREATE INDEX IF NOT EXISTS idx_ingestion_requests_created_at ON ingestion_requests (created_at)",
];

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 10).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            let db_path = database_url
                .strip_prefix("sqlite://")
                .or_else(|| database_url.strip_prefix("sqlite:"))
                .unwrap_or(database_url);

            // Create database file directory if it doesn't exist
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create database directory {parent:?}"))?;
                }
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path).with_context(|| format!("Failed to create database file {db_path}"))?;
            }
        }

        // Every pooled connection to `:memory:` would open its own database
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };

        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        info!("✅ Database schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for DatabaseConnection {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// comparison orders them chronologically.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp: {raw}"))?
        .with_timezone(&Utc))
}

pub(crate) fn decode_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(decode_timestamp).transpose()
}
