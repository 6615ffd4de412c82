//! SQLite import job audit log
//!
//! Mapping, stats and error rows are stored as JSON text columns.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::import_job::{ImportJob, ImportJobStatus};
use crate::domain::repositories::ImportJobRepository;
use crate::infrastructure::database_connection::{decode_timestamp, encode_timestamp};

const JOB_COLUMNS: &str = "id, tenant_id, campaign_id, created_by, file_name, mapping, stats, error_rows, status, failure, created_at";

#[derive(Clone)]
pub struct SqliteImportJobRepository {
    pool: SqlitePool,
}

impl SqliteImportJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> Result<ImportJob> {
        let mapping: String = row.try_get("mapping")?;
        let stats: String = row.try_get("stats")?;
        let error_rows: String = row.try_get("error_rows")?;
        let status: String = row.try_get("status")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(ImportJob {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            campaign_id: row.try_get("campaign_id")?,
            created_by: row.try_get("created_by")?,
            file_name: row.try_get("file_name")?,
            mapping: serde_json::from_str(&mapping).context("Invalid mapping JSON")?,
            stats: serde_json::from_str(&stats).context("Invalid stats JSON")?,
            error_rows: serde_json::from_str(&error_rows).context("Invalid error_rows JSON")?,
            status: status.parse::<ImportJobStatus>().map_err(anyhow::Error::msg)?,
            failure: row.try_get("failure")?,
            created_at: decode_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ImportJobRepository for SqliteImportJobRepository {
    async fn create(&self, job: &ImportJob) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO import_jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&job.id)
        .bind(&job.tenant_id)
        .bind(&job.campaign_id)
        .bind(&job.created_by)
        .bind(&job.file_name)
        .bind(serde_json::to_string(&job.mapping)?)
        .bind(serde_json::to_string(&job.stats)?)
        .bind(serde_json::to_string(&job.error_rows)?)
        .bind(job.status.as_str())
        .bind(&job.failure)
        .bind(encode_timestamp(job.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to record import job")?;
        Ok(())
    }

    async fn find_by_id(&self, job_id: &str) -> Result<Option<ImportJob>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = ?"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn list_for_campaign(&self, tenant_id: &str, campaign_id: &str, limit: u32) -> Result<Vec<ImportJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE tenant_id = ? AND campaign_id = ? \
             ORDER BY created_at DESC, id ASC LIMIT ?"
        ))
        .bind(tenant_id)
        .bind(campaign_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_job).collect()
    }
}
