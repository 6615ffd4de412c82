//! CSV import use cases
//!
//! The interactive import path: parse, pre-flight the mapping, validate every
//! row, plan against existing leads, write in chunks and record the job.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::IngestionSettings;
use crate::application::dto::{
    CsvImportRequest, CsvImportResponse, ImportJobList, ImportJobView, OnError, PreviewRequest, PreviewResponse,
};
use crate::application::errors::IngestError;
use crate::application::ingest_pipeline::{IngestPipeline, IngestTarget};
use crate::domain::catalog::TenantCatalog;
use crate::domain::import_job::{ErrorRow, ImportJob, ImportJobStatus, ImportStats};
use crate::domain::repositories::{CatalogRepository, ImportJobRepository, TenantDirectory};
use crate::domain::services::mapping::FieldMapping;
use crate::domain::services::validation::{FieldError, RowValidator};
use crate::infrastructure::csv_parser::{CsvError, CsvParseError, parse_csv, preview_csv};

/// Spreadsheet row number of the first data row; the header is row 1.
const FIRST_DATA_ROW: usize = 2;

pub struct ImportUseCases {
    catalog: Arc<dyn CatalogRepository>,
    directory: Arc<dyn TenantDirectory>,
    jobs: Arc<dyn ImportJobRepository>,
    pipeline: IngestPipeline,
    settings: IngestionSettings,
}

fn field_errors_json(errors: &[FieldError]) -> Value {
    Value::Array(
        errors
            .iter()
            .map(|e| json!({"field": e.field, "code": e.code.as_str(), "message": e.message}))
            .collect(),
    )
}

fn parse_errors_json(errors: &[CsvParseError]) -> Value {
    serde_json::to_value(errors).unwrap_or(Value::Null)
}

impl ImportUseCases {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        directory: Arc<dyn TenantDirectory>,
        jobs: Arc<dyn ImportJobRepository>,
        pipeline: IngestPipeline,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            catalog,
            directory,
            jobs,
            pipeline,
            settings,
        }
    }

    async fn require_admin(&self, tenant_id: &str, user_id: &str) -> Result<(), IngestError> {
        if self.directory.is_tenant_admin(tenant_id, user_id).await? {
            Ok(())
        } else {
            Err(IngestError::Forbidden("Not a tenant admin".into()))
        }
    }

    async fn load_catalog(&self, tenant_id: &str) -> Result<TenantCatalog, IngestError> {
        let (statuses, custom_fields) = tokio::try_join!(
            self.catalog.list_statuses(tenant_id),
            self.catalog.list_custom_fields(tenant_id)
        )?;
        Ok(TenantCatalog::new(statuses, custom_fields))
    }

    /// Run one CSV import for a tenant admin.
    pub async fn import_csv(
        &self,
        user_id: &str,
        tenant_id: &str,
        campaign_id: &str,
        request: CsvImportRequest,
    ) -> Result<CsvImportResponse, IngestError> {
        self.require_admin(tenant_id, user_id).await?;
        self.catalog
            .find_campaign(tenant_id, campaign_id)
            .await?
            .ok_or_else(|| IngestError::NotFound("Campaign not found".into()))?;

        if request.file_name.trim().is_empty() {
            return Err(IngestError::validation("fileName is required"));
        }
        if request.csv_text.trim().is_empty() {
            return Err(IngestError::validation("csvText is required"));
        }

        let mapping = FieldMapping::parse(&request.mapping)
            .map_err(|errors| IngestError::validation_with("Invalid field mapping", json!(errors)))?;
        let catalog = self.load_catalog(tenant_id).await?;

        let default_status_id = match request.default_status_label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => Some(
                catalog
                    .status_by_label(label)
                    .map(|status| status.id.clone())
                    .ok_or_else(|| IngestError::validation(format!("Default status \"{label}\" not found")))?,
            ),
            _ => None,
        };

        let parsed = match parse_csv(&request.csv_text, Some(self.settings.csv_max_bytes)) {
            Ok(parsed) => parsed,
            Err(e @ CsvError::TooLarge { .. }) => return Err(IngestError::validation(e.to_string())),
            Err(e) => {
                return Err(IngestError::CsvParse {
                    details: json!([{ "message": e.to_string() }]),
                });
            }
        };
        if !parsed.errors.is_empty() && request.on_error == OnError::FailImport {
            return Err(IngestError::CsvParse {
                details: parse_errors_json(&parsed.errors),
            });
        }

        mapping
            .validate(&parsed.headers, &catalog.custom_fields)
            .map_err(|errors| IngestError::validation_with("Invalid field mapping", json!(errors)))?;

        info!(
            tenant_id,
            campaign_id,
            file_name = %request.file_name,
            rows = parsed.rows.len(),
            mode = ?request.dedupe_mode,
            "📥 CSV import started"
        );

        let owners = HashMap::new();
        let validator = RowValidator::new(&catalog, &owners, self.settings.lenient_follow_up_dates);
        let mut stats = ImportStats::default();
        let mut error_rows = Vec::new();
        let mut batch = Vec::with_capacity(parsed.rows.len());

        for (index, row) in parsed.rows.iter().enumerate() {
            let row_number = index + FIRST_DATA_ROW;
            let mapped = mapping.map_row(row);
            match validator.validate(&mapped) {
                Ok(lead) => batch.push(lead),
                Err(errors) if request.on_error == OnError::FailImport => {
                    return Err(IngestError::validation_with(
                        format!("Row {row_number} validation failed"),
                        field_errors_json(&errors),
                    ));
                }
                Err(errors) => {
                    error_rows.push(ErrorRow {
                        row: row_number,
                        data: mapped.to_json(),
                        errors: errors.iter().map(ToString::to_string).collect(),
                    });
                    stats.skipped += 1;
                }
            }
        }
        stats.errors_count = error_rows.len();

        let target = IngestTarget {
            tenant_id,
            campaign_id,
            mode: request.dedupe_mode,
            default_status_id: default_status_id.as_deref(),
        };
        let (plan, _) = self.pipeline.plan(target, batch).await?;
        stats.created = plan.created;
        stats.updated = plan.updated;

        let mut job = ImportJob {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            campaign_id: campaign_id.to_string(),
            created_by: user_id.to_string(),
            file_name: request.file_name.clone(),
            mapping: request.mapping.clone(),
            stats,
            error_rows,
            status: ImportJobStatus::Completed,
            failure: None,
            created_at: Utc::now(),
        };

        if let Err(failure) = self.pipeline.write(&plan).await {
            let message = format!("{:#}", failure.error);
            warn!(
                import_id = %job.id,
                inserted = failure.report.inserted,
                updated = failure.report.updated,
                "CSV import stopped after a write failure"
            );
            // the record reflects what was committed, not what was planned
            job.stats.created = failure.report.inserted;
            job.stats.updated = failure.report.updated;
            job.status = ImportJobStatus::PartiallyFailed;
            job.failure = Some(message.clone());
            if let Err(e) = self.jobs.create(&job).await {
                warn!(import_id = %job.id, "failed to record partially failed import: {e:#}");
            }
            return Err(IngestError::Persistence {
                message: failure.error.to_string(),
                details: json!({
                    "importId": job.id,
                    "committed": failure.report,
                    "planned": { "inserts": plan.inserts.len(), "updates": plan.updates.len() },
                }),
            });
        }

        self.jobs.create(&job).await?;
        info!(
            import_id = %job.id,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            "✅ CSV import finished"
        );

        Ok(CsvImportResponse {
            import_id: job.id,
            stats,
            errors_count: stats.errors_count,
        })
    }

    /// Import jobs of one campaign, newest first.
    pub async fn list_jobs(&self, user_id: &str, tenant_id: &str, campaign_id: &str) -> Result<ImportJobList, IngestError> {
        self.require_admin(tenant_id, user_id).await?;
        let jobs = self
            .jobs
            .list_for_campaign(tenant_id, campaign_id, self.settings.import_history_limit)
            .await?;
        Ok(ImportJobList { jobs })
    }

    pub async fn get_job(&self, user_id: &str, import_id: &str) -> Result<ImportJobView, IngestError> {
        let job = self
            .jobs
            .find_by_id(import_id)
            .await?
            .ok_or_else(|| IngestError::NotFound("Import job not found".into()))?;
        self.require_admin(&job.tenant_id, user_id).await?;
        Ok(ImportJobView::from(job))
    }

    /// Parse only the first rows so the caller can build a mapping.
    pub fn preview(&self, request: &PreviewRequest) -> Result<PreviewResponse, IngestError> {
        let max_rows = request
            .max_rows
            .unwrap_or(self.settings.preview_rows)
            .clamp(1, self.settings.preview_max_rows.max(1));
        let parsed = preview_csv(&request.csv_text, max_rows).map_err(|e| IngestError::CsvParse {
            details: json!([{ "message": e.to_string() }]),
        })?;
        Ok(PreviewResponse::from(parsed))
    }
}
