//! SQLite lead store
//!
//! Key lookups are issued as `IN (...)` queries chunked to stay well under
//! SQLite's bind parameter limit. Key columns are stored normalized so those
//! lookups compare plain columns and stay on the indexes. Each write chunk is
//! one multi-row statement inside its own transaction.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::domain::lead::{CustomFields, LeadRecord, normalize_email, normalize_identifier};
use crate::domain::repositories::{LeadRepository, LookupScope};
use crate::domain::services::dedupe::{KeyKind, KeyScope};
use crate::infrastructure::database_connection::{decode_optional_timestamp, decode_timestamp, encode_timestamp};

/// Key values per lookup query.
const LOOKUP_CHUNK_SIZE: usize = 500;

const LEAD_COLUMNS: &str = "id, tenant_id, campaign_id, full_name, company, email, phone, external_id, \
                            status_id, owner_user_id, next_follow_up_at, custom_fields, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteLeadRepository {
    pool: SqlitePool,
}

impl SqliteLeadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_lead(row: &SqliteRow) -> Result<LeadRecord> {
        let custom_fields: String = row.try_get("custom_fields")?;
        let custom_fields: CustomFields = if custom_fields.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&custom_fields).context("Invalid custom_fields JSON")?
        };
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(LeadRecord {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            campaign_id: row.try_get("campaign_id")?,
            full_name: row.try_get("full_name")?,
            company: row.try_get("company")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            external_id: row.try_get("external_id")?,
            status_id: row.try_get("status_id")?,
            owner_user_id: row.try_get("owner_user_id")?,
            next_follow_up_at: decode_optional_timestamp(row.try_get("next_follow_up_at")?)?,
            custom_fields,
            created_at: decode_timestamp(&created_at)?,
            updated_at: decode_timestamp(&updated_at)?,
        })
    }

    /// `INSERT ... VALUES (..), (..)` for a chunk of leads.
    fn values_statement<'a>(leads: &[LeadRecord]) -> Result<QueryBuilder<'a, Sqlite>> {
        let encoded = leads
            .iter()
            .map(|lead| Ok((lead.clone(), serde_json::to_string(&lead.custom_fields)?)))
            .collect::<Result<Vec<(LeadRecord, String)>>>()?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO leads ({LEAD_COLUMNS}) "));
        qb.push_values(encoded, |mut b, (lead, custom_fields)| {
            b.push_bind(lead.id)
                .push_bind(lead.tenant_id)
                .push_bind(lead.campaign_id)
                .push_bind(lead.full_name)
                .push_bind(lead.company)
                .push_bind(lead.email.as_deref().map(normalize_email))
                .push_bind(lead.phone.as_deref().map(normalize_identifier))
                .push_bind(lead.external_id.as_deref().map(normalize_identifier))
                .push_bind(lead.status_id)
                .push_bind(lead.owner_user_id)
                .push_bind(lead.next_follow_up_at.map(encode_timestamp))
                .push_bind(custom_fields)
                .push_bind(encode_timestamp(lead.created_at))
                .push_bind(encode_timestamp(lead.updated_at));
        });
        Ok(qb)
    }

    fn lookup_query<'a>(
        head: &str,
        scope: LookupScope<'_>,
        kind: KeyKind,
        values: &[String],
    ) -> QueryBuilder<'a, Sqlite> {
        let key_column = match kind {
            KeyKind::Email => "email",
            KeyKind::Phone => "phone",
            KeyKind::ExternalId => "external_id",
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!("{head} WHERE tenant_id = "));
        qb.push_bind(scope.tenant_id.to_string());
        if kind.scope() == KeyScope::Campaign {
            qb.push(" AND campaign_id = ").push_bind(scope.campaign_id.to_string());
        }
        qb.push(format!(" AND {key_column} IN ("));
        let mut separated = qb.separated(", ");
        for value in values {
            separated.push_bind(value.clone());
        }
        separated.push_unseparated(")");
        qb.push(" ORDER BY updated_at DESC, id ASC");
        qb
    }

    async fn execute_in_transaction(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let result = qb.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LeadRepository for SqliteLeadRepository {
    async fn find_by_keys(&self, scope: LookupScope<'_>, kind: KeyKind, values: &[String]) -> Result<Vec<LeadRecord>> {
        let head = format!("SELECT {LEAD_COLUMNS} FROM leads");
        let mut leads = Vec::new();
        for chunk in values.chunks(LOOKUP_CHUNK_SIZE) {
            let mut qb = Self::lookup_query(&head, scope, kind, chunk);
            let rows = qb.build().fetch_all(&self.pool).await?;
            for row in &rows {
                leads.push(Self::row_to_lead(row)?);
            }
        }

        debug!(kind = kind.prefix(), keys = values.len(), found = leads.len(), "lead key lookup");
        Ok(leads)
    }

    async fn insert_batch(&self, leads: &[LeadRecord]) -> Result<()> {
        if leads.is_empty() {
            return Ok(());
        }
        let qb = Self::values_statement(leads)?;
        self.execute_in_transaction(qb).await.context("Failed to insert lead chunk")?;
        Ok(())
    }

    async fn update_batch(&self, leads: &[LeadRecord]) -> Result<()> {
        if leads.is_empty() {
            return Ok(());
        }
        let mut qb = Self::values_statement(leads)?;
        qb.push(
            " ON CONFLICT(id) DO UPDATE SET \
             full_name = excluded.full_name, \
             company = excluded.company, \
             email = excluded.email, \
             phone = excluded.phone, \
             external_id = excluded.external_id, \
             status_id = excluded.status_id, \
             owner_user_id = excluded.owner_user_id, \
             next_follow_up_at = excluded.next_follow_up_at, \
             custom_fields = excluded.custom_fields, \
             updated_at = excluded.updated_at",
        );
        self.execute_in_transaction(qb).await.context("Failed to update lead chunk")?;
        Ok(())
    }

    async fn count_for_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE tenant_id = ? AND campaign_id = ?")
            .bind(tenant_id)
            .bind(campaign_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
