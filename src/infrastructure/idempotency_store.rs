//! Idempotency record stores
//!
//! A request claims its key with an insert-if-absent `pending` row before
//! doing any work, so two concurrent requests with the same key can never
//! both execute. The winner later stores its response (`completed`) or
//! drops the claim on failure.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::repositories::{IdempotencyStore, Reservation};
use crate::infrastructure::database_connection::encode_timestamp;

const STATE_PENDING: &str = "pending";
const STATE_COMPLETED: &str = "completed";

/// Durable store over the `ingestion_requests` table.
#[derive(Clone)]
pub struct SqliteIdempotencyStore {
    pool: SqlitePool,
}

impl SqliteIdempotencyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current(&self, tenant_id: &str, key_hash: &str) -> Result<Option<Reservation>> {
        let row = sqlx::query("SELECT state, response_json FROM ingestion_requests WHERE tenant_id = ? AND key_hash = ?")
            .bind(tenant_id)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state: String = row.try_get("state")?;
        if state != STATE_COMPLETED {
            return Ok(Some(Reservation::InFlight));
        }
        let response: Option<String> = row.try_get("response_json")?;
        let response = match response {
            Some(raw) => serde_json::from_str(&raw).context("Invalid stored idempotent response")?,
            None => Value::Null,
        };
        Ok(Some(Reservation::Replay(response)))
    }
}

#[async_trait]
impl IdempotencyStore for SqliteIdempotencyStore {
    async fn reserve(&self, tenant_id: &str, key_hash: &str, now: DateTime<Utc>) -> Result<Reservation> {
        // A concurrent release can delete the row between the insert and the
        // read; one retry settles it.
        for _ in 0..2 {
            let inserted = sqlx::query(
                "INSERT INTO ingestion_requests (tenant_id, key_hash, state, response_json, created_at) \
                 VALUES (?, ?, ?, NULL, ?) ON CONFLICT(tenant_id, key_hash) DO NOTHING",
            )
            .bind(tenant_id)
            .bind(key_hash)
            .bind(STATE_PENDING)
            .bind(encode_timestamp(now))
            .execute(&self.pool)
            .await?
            .rows_affected();

            if inserted == 1 {
                return Ok(Reservation::Acquired);
            }
            if let Some(existing) = self.current(tenant_id, key_hash).await? {
                return Ok(existing);
            }
        }
        Ok(Reservation::InFlight)
    }

    async fn complete(&self, tenant_id: &str, key_hash: &str, response: &Value) -> Result<()> {
        sqlx::query("UPDATE ingestion_requests SET state = ?, response_json = ? WHERE tenant_id = ? AND key_hash = ?")
            .bind(STATE_COMPLETED)
            .bind(serde_json::to_string(response)?)
            .bind(tenant_id)
            .bind(key_hash)
            .execute(&self.pool)
            .await
            .context("Failed to store idempotent response")?;
        Ok(())
    }

    async fn release(&self, tenant_id: &str, key_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM ingestion_requests WHERE tenant_id = ? AND key_hash = ? AND state = ?")
            .bind(tenant_id)
            .bind(key_hash)
            .bind(STATE_PENDING)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM ingestion_requests WHERE created_at < ?")
            .bind(encode_timestamp(cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!(deleted, "idempotency sweep");
        Ok(deleted)
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    response: Option<Value>,
    created_at: DateTime<Utc>,
}

/// Process-local store for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<(String, String), MemoryEntry>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn reserve(&self, tenant_id: &str, key_hash: &str, now: DateTime<Utc>) -> Result<Reservation> {
        let mut entries = self.entries.lock().await;
        let key = (tenant_id.to_string(), key_hash.to_string());
        match entries.get(&key) {
            Some(MemoryEntry { response: Some(response), .. }) => Ok(Reservation::Replay(response.clone())),
            Some(MemoryEntry { response: None, .. }) => Ok(Reservation::InFlight),
            None => {
                entries.insert(key, MemoryEntry { response: None, created_at: now });
                Ok(Reservation::Acquired)
            }
        }
    }

    async fn complete(&self, tenant_id: &str, key_hash: &str, response: &Value) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&(tenant_id.to_string(), key_hash.to_string())) {
            entry.response = Some(response.clone());
        }
        Ok(())
    }

    async fn release(&self, tenant_id: &str, key_hash: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let key = (tenant_id.to_string(), key_hash.to_string());
        if entries.get(&key).is_some_and(|entry| entry.response.is_none()) {
            entries.remove(&key);
        }
        Ok(())
    }

    async fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}
