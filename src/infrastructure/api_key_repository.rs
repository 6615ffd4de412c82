//! SQLite API key store

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::api_key::ApiKeyRecord;
use crate::domain::repositories::ApiKeyRepository;
use crate::infrastructure::database_connection::{decode_optional_timestamp, decode_timestamp, encode_timestamp};

const KEY_COLUMNS: &str = "id, tenant_id, name, key_hash, is_active, last_used_at, created_by, created_at";

#[derive(Clone)]
pub struct SqliteApiKeyRepository {
    pool: SqlitePool,
}

impl SqliteApiKeyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_key(row: &SqliteRow) -> Result<ApiKeyRecord> {
        let created_at: String = row.try_get("created_at")?;
        Ok(ApiKeyRecord {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            key_hash: row.try_get("key_hash")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
            last_used_at: decode_optional_timestamp(row.try_get("last_used_at")?)?,
            created_by: row.try_get("created_by")?,
            created_at: decode_timestamp(&created_at)?,
        })
    }

    async fn find_by_id(&self, tenant_id: &str, key_id: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query(&format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE id = ? AND tenant_id = ?"))
            .bind(key_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_key).transpose()
    }
}

#[async_trait]
impl ApiKeyRepository for SqliteApiKeyRepository {
    async fn create(&self, key: &ApiKeyRecord) -> Result<()> {
        sqlx::query(&format!("INSERT INTO api_keys ({KEY_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"))
            .bind(&key.id)
            .bind(&key.tenant_id)
            .bind(&key.name)
            .bind(&key.key_hash)
            .bind(i64::from(key.is_active))
            .bind(key.last_used_at.map(encode_timestamp))
            .bind(&key.created_by)
            .bind(encode_timestamp(key.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to store API key")?;
        Ok(())
    }

    async fn find_active_by_hash(&self, tenant_id: &str, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE key_hash = ? AND tenant_id = ? AND is_active = 1"
        ))
        .bind(key_hash)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_key).transpose()
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {KEY_COLUMNS} FROM api_keys WHERE tenant_id = ? ORDER BY created_at DESC, id ASC"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_key).collect()
    }

    async fn set_active(&self, tenant_id: &str, key_id: &str, is_active: bool) -> Result<Option<ApiKeyRecord>> {
        let result = sqlx::query("UPDATE api_keys SET is_active = ? WHERE id = ? AND tenant_id = ?")
            .bind(i64::from(is_active))
            .bind(key_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(tenant_id, key_id).await
    }

    async fn touch_last_used(&self, key_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(encode_timestamp(at))
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;

    fn key(id: &str, tenant_id: &str, hash: &str) -> ApiKeyRecord {
        ApiKeyRecord {
            id: id.into(),
            tenant_id: tenant_id.into(),
            name: format!("key {id}"),
            key_hash: hash.into(),
            is_active: true,
            last_used_at: None,
            created_by: Some("u-admin".into()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_active_lookup_respects_tenant_and_flag() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        let repo = SqliteApiKeyRepository::new(db.pool().clone());
        repo.create(&key("k1", "t1", "hash-1")).await?;

        assert!(repo.find_active_by_hash("t1", "hash-1").await?.is_some());
        assert!(repo.find_active_by_hash("t2", "hash-1").await?.is_none());

        let revoked = repo.set_active("t1", "k1", false).await?.expect("key exists");
        assert!(!revoked.is_active);
        assert!(repo.find_active_by_hash("t1", "hash-1").await?.is_none());
        assert!(repo.set_active("t2", "k1", true).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_touch_last_used() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        let repo = SqliteApiKeyRepository::new(db.pool().clone());
        repo.create(&key("k1", "t1", "hash-1")).await?;

        let at = Utc::now();
        repo.touch_last_used("k1", at).await?;
        let listed = repo.list_for_tenant("t1").await?;
        assert_eq!(listed[0].last_used_at.map(encode_timestamp), Some(encode_timestamp(at)));
        Ok(())
    }
}
