//! SQLite tenant catalog and membership directory

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::catalog::{Campaign, CustomFieldDefinition, CustomFieldType, StatusDefinition};
use crate::domain::repositories::{CatalogRepository, TenantDirectory};
use crate::infrastructure::database_connection::encode_timestamp;

#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_status(row: &SqliteRow) -> Result<StatusDefinition> {
        Ok(StatusDefinition {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            label: row.try_get("label")?,
            sort_order: row.try_get("sort_order")?,
            is_default: row.try_get::<i64, _>("is_default")? != 0,
        })
    }

    fn row_to_custom_field(row: &SqliteRow) -> Result<CustomFieldDefinition> {
        let field_type: String = row.try_get("field_type")?;
        let options: Option<String> = row.try_get("options")?;
        let options = match options.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).context("Invalid options JSON")?,
            _ => Vec::new(),
        };

        Ok(CustomFieldDefinition {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            field_key: row.try_get("field_key")?,
            label: row.try_get("label")?,
            field_type: field_type.parse::<CustomFieldType>().map_err(anyhow::Error::msg)?,
            options,
        })
    }

    // ===============================
    // CATALOG WRITES
    // ===============================

    pub async fn create_campaign(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query("INSERT INTO campaigns (id, tenant_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&campaign.id)
            .bind(&campaign.tenant_id)
            .bind(&campaign.name)
            .bind(encode_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_status(&self, status: &StatusDefinition) -> Result<()> {
        sqlx::query("INSERT INTO status_definitions (id, tenant_id, label, sort_order, is_default) VALUES (?, ?, ?, ?, ?)")
            .bind(&status.id)
            .bind(&status.tenant_id)
            .bind(&status.label)
            .bind(status.sort_order)
            .bind(i64::from(status.is_default))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_custom_field(&self, field: &CustomFieldDefinition) -> Result<()> {
        let options = serde_json::to_string(&field.options)?;
        sqlx::query(
            "INSERT INTO custom_field_definitions (id, tenant_id, field_key, label, field_type, options) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&field.id)
        .bind(&field.tenant_id)
        .bind(&field.field_key)
        .bind(&field.label)
        .bind(field.field_type.as_str())
        .bind(options)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_member(&self, tenant_id: &str, user_id: &str, email: &str, role: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO tenant_members (tenant_id, user_id, email, role) VALUES (?, ?, ?, ?) \
             ON CONFLICT(tenant_id, user_id) DO UPDATE SET email = excluded.email, role = excluded.role",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(email)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<Option<Campaign>> {
        let row = sqlx::query("SELECT id, tenant_id, name FROM campaigns WHERE id = ? AND tenant_id = ?")
            .bind(campaign_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Campaign> {
            Ok(Campaign {
                id: row.try_get("id")?,
                tenant_id: row.try_get("tenant_id")?,
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn list_statuses(&self, tenant_id: &str) -> Result<Vec<StatusDefinition>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, label, sort_order, is_default FROM status_definitions \
             WHERE tenant_id = ? ORDER BY sort_order ASC, label ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_status).collect()
    }

    async fn list_custom_fields(&self, tenant_id: &str) -> Result<Vec<CustomFieldDefinition>> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, field_key, label, field_type, options FROM custom_field_definitions \
             WHERE tenant_id = ? ORDER BY sort_order ASC, field_key ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_custom_field).collect()
    }
}

/// Membership lookups over `tenant_members`.
#[derive(Clone)]
pub struct SqliteTenantDirectory {
    pool: SqlitePool,
}

impl SqliteTenantDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for SqliteTenantDirectory {
    async fn is_tenant_admin(&self, tenant_id: &str, user_id: &str) -> Result<bool> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM tenant_members WHERE tenant_id = ? AND user_id = ?")
            .bind(tenant_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(matches!(role.as_deref(), Some("admin" | "owner")))
    }

    async fn find_member_by_email(&self, tenant_id: &str, email: &str) -> Result<Option<String>> {
        let user_id = sqlx::query_scalar(
            "SELECT user_id FROM tenant_members WHERE tenant_id = ? AND lower(email) = lower(?) ORDER BY user_id LIMIT 1",
        )
        .bind(tenant_id)
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;

    async fn setup() -> Result<(SqliteCatalogRepository, SqliteTenantDirectory)> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        Ok((
            SqliteCatalogRepository::new(db.pool().clone()),
            SqliteTenantDirectory::new(db.pool().clone()),
        ))
    }

    #[tokio::test]
    async fn test_campaign_lookup_is_tenant_scoped() -> Result<()> {
        let (catalog, _) = setup().await?;
        catalog
            .create_campaign(&Campaign { id: "c1".into(), tenant_id: "t1".into(), name: "Spring".into() })
            .await?;

        assert!(catalog.find_campaign("t1", "c1").await?.is_some());
        assert!(catalog.find_campaign("t2", "c1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_listing() -> Result<()> {
        let (catalog, _) = setup().await?;
        for (id, label, order) in [("s2", "Won", 2), ("s1", "New", 1)] {
            catalog
                .create_status(&StatusDefinition {
                    id: id.into(),
                    tenant_id: "t1".into(),
                    label: label.into(),
                    sort_order: order,
                    is_default: id == "s1",
                })
                .await?;
        }
        catalog
            .create_custom_field(&CustomFieldDefinition {
                id: "cf1".into(),
                tenant_id: "t1".into(),
                field_key: "tier".into(),
                label: "Tier".into(),
                field_type: CustomFieldType::Select,
                options: vec!["gold".into()],
            })
            .await?;

        let statuses = catalog.list_statuses("t1").await?;
        assert_eq!(statuses.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(), vec!["New", "Won"]);
        assert!(statuses[0].is_default);

        let fields = catalog.list_custom_fields("t1").await?;
        assert_eq!(fields[0].field_type, CustomFieldType::Select);
        assert_eq!(fields[0].options, vec!["gold".to_string()]);
        assert!(catalog.list_custom_fields("t2").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_roles_and_email_lookup() -> Result<()> {
        let (catalog, directory) = setup().await?;
        catalog.add_member("t1", "u-admin", "Boss@Acme.io", "admin").await?;
        catalog.add_member("t1", "u-rep", "rep@acme.io", "member").await?;

        assert!(directory.is_tenant_admin("t1", "u-admin").await?);
        assert!(!directory.is_tenant_admin("t1", "u-rep").await?);
        assert!(!directory.is_tenant_admin("t2", "u-admin").await?);
        assert_eq!(directory.find_member_by_email("t1", "boss@acme.io").await?, Some("u-admin".to_string()));
        assert_eq!(directory.find_member_by_email("t1", "ghost@acme.io").await?, None);
        Ok(())
    }
}
