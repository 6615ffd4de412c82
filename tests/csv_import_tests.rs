//! CSV import and preview, end to end
mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Value, json};

use common::{ADMIN_USER, CAMPAIGN_ID, REP_USER, TENANT_ID, TestApp, request};
use lead_intake::application::dto::{CsvImportRequest, OnError};
use lead_intake::application::{ImportUseCases, IngestPipeline, IngestionSettings};
use lead_intake::domain::import_job::ImportJobStatus;
use lead_intake::domain::lead::LeadRecord;
use lead_intake::domain::repositories::{LeadRepository, LookupScope};
use lead_intake::domain::services::dedupe::{DedupeMode, KeyKind};
use lead_intake::infrastructure::{
    DatabaseConnection, SqliteCatalogRepository, SqliteImportJobRepository, SqliteLeadRepository, SqliteTenantDirectory,
};

fn imports_uri() -> String {
    format!("/api/admin/tenants/{TENANT_ID}/campaigns/{CAMPAIGN_ID}/imports")
}

fn name_email_mapping() -> Value {
    json!({"Name": "full_name", "Email": "email"})
}

/// Records the size of every write chunk before delegating.
struct RecordingLeads {
    inner: SqliteLeadRepository,
    insert_chunks: Mutex<Vec<usize>>,
}

#[async_trait]
impl LeadRepository for RecordingLeads {
    async fn find_by_keys(&self, scope: LookupScope<'_>, kind: KeyKind, values: &[String]) -> Result<Vec<LeadRecord>> {
        self.inner.find_by_keys(scope, kind, values).await
    }

    async fn insert_batch(&self, leads: &[LeadRecord]) -> Result<()> {
        self.insert_chunks.lock().unwrap().push(leads.len());
        self.inner.insert_batch(leads).await
    }

    async fn update_batch(&self, leads: &[LeadRecord]) -> Result<()> {
        self.inner.update_batch(leads).await
    }

    async fn count_for_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<u64> {
        self.inner.count_for_campaign(tenant_id, campaign_id).await
    }
}

#[tokio::test]
async fn three_row_csv_creates_three_leads() -> Result<()> {
    let app = TestApp::spawn().await?;
    let payload = json!({
        "fileName": "leads.csv",
        "csvText": "Name,Email\nAda,ada@example.com\nBob,bob@example.com\nCy,cy@example.com\n",
        "mapping": name_email_mapping(),
        "dedupeMode": "none"
    });

    let (response, json) = app
        .call(request("POST", &imports_uri(), &[("x-user-id", ADMIN_USER)], Some(&payload)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json["ok"], true);
    let data = &json["data"];
    assert_eq!(data["stats"]["created"], 3);
    assert_eq!(data["stats"]["updated"], 0);
    assert_eq!(data["stats"]["skipped"], 0);
    assert_eq!(data["errorsCount"], 0);
    assert!(data["importId"].as_str().is_some());
    assert_eq!(app.lead_count().await?, 3);
    Ok(())
}

#[tokio::test]
async fn invalid_email_row_is_skipped_and_recorded() -> Result<()> {
    let app = TestApp::spawn().await?;
    let payload = json!({
        "fileName": "leads.csv",
        "csvText": "Name,Email\nAda,ada@example.com\nBad,not-an-email\n",
        "mapping": name_email_mapping(),
        "dedupeMode": "email",
        "onError": "skip_row"
    });

    let (_, json) = app
        .call(request("POST", &imports_uri(), &[("x-user-id", ADMIN_USER)], Some(&payload)))
        .await;
    let data = &json["data"];
    assert_eq!(data["stats"]["created"], 1);
    assert_eq!(data["stats"]["skipped"], 1);
    assert_eq!(data["errorsCount"], 1);
    assert!(app.leads_by_email("not-an-email").await?.is_empty());

    let import_id = data["importId"].as_str().unwrap();
    let (job_response, job) = app
        .call(request(
            "GET",
            &format!("/api/admin/imports/{import_id}"),
            &[("x-user-id", ADMIN_USER)],
            None,
        ))
        .await;
    assert_eq!(job_response.status(), StatusCode::OK);
    let error_rows = job["data"]["errorRows"].as_array().unwrap();
    assert_eq!(error_rows.len(), 1);
    assert_eq!(error_rows[0]["row"], 3);
    assert!(error_rows[0]["errors"][0].as_str().unwrap().contains("email"));
    assert!(job["data"]["job"].get("error_rows").is_none());
    assert_eq!(job["data"]["job"]["stats"]["errorsCount"], 1);
    Ok(())
}

#[tokio::test]
async fn fail_import_aborts_before_any_write() -> Result<()> {
    let app = TestApp::spawn().await?;
    let payload = json!({
        "fileName": "leads.csv",
        "csvText": "Name,Email\nAda,ada@example.com\nBad,not-an-email\n",
        "mapping": name_email_mapping(),
        "dedupeMode": "email",
        "onError": "fail_import"
    });

    let (response, json) = app
        .call(request("POST", &imports_uri(), &[("x-user-id", ADMIN_USER)], Some(&payload)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"]["message"], "Row 3 validation failed");
    assert_eq!(app.lead_count().await?, 0);
    Ok(())
}

/// Fails the insert call with the given zero-based number, after the earlier ones committed.
struct FailingInsertLeads {
    inner: SqliteLeadRepository,
    fail_on_call: usize,
    calls: Mutex<usize>,
}

#[async_trait]
impl LeadRepository for FailingInsertLeads {
    async fn find_by_keys(&self, scope: LookupScope<'_>, kind: KeyKind, values: &[String]) -> Result<Vec<LeadRecord>> {
        self.inner.find_by_keys(scope, kind, values).await
    }

    async fn insert_batch(&self, leads: &[LeadRecord]) -> Result<()> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        if call == self.fail_on_call {
            anyhow::bail!("database is locked");
        }
        self.inner.insert_batch(leads).await
    }

    async fn update_batch(&self, leads: &[LeadRecord]) -> Result<()> {
        self.inner.update_batch(leads).await
    }

    async fn count_for_campaign(&self, tenant_id: &str, campaign_id: &str) -> Result<u64> {
        self.inner.count_for_campaign(tenant_id, campaign_id).await
    }
}

fn imports_over(db: &DatabaseConnection, leads: Arc<dyn LeadRepository>) -> ImportUseCases {
    let pool = db.pool().clone();
    ImportUseCases::new(
        Arc::new(SqliteCatalogRepository::new(pool.clone())),
        Arc::new(SqliteTenantDirectory::new(pool.clone())),
        Arc::new(SqliteImportJobRepository::new(pool)),
        IngestPipeline::new(leads, 200),
        IngestionSettings::default(),
    )
}

fn numbered_rows_request(file_name: &str, rows: usize) -> CsvImportRequest {
    let mut csv_text = String::from("Name,Email\n");
    for i in 0..rows {
        csv_text.push_str(&format!("Lead {i},lead{i}@example.com\n"));
    }
    CsvImportRequest {
        file_name: file_name.into(),
        csv_text,
        mapping: BTreeMap::from([
            ("Name".to_string(), "full_name".to_string()),
            ("Email".to_string(), "email".to_string()),
        ]),
        dedupe_mode: DedupeMode::Disabled,
        default_status_label: None,
        on_error: OnError::SkipRow,
    }
}

#[tokio::test]
async fn four_hundred_fifty_rows_write_in_three_chunks() -> Result<()> {
    let db = common::seeded_db().await?;
    let leads = Arc::new(RecordingLeads {
        inner: SqliteLeadRepository::new(db.pool().clone()),
        insert_chunks: Mutex::new(Vec::new()),
    });
    let imports = imports_over(&db, leads.clone());

    let response = imports
        .import_csv(ADMIN_USER, TENANT_ID, CAMPAIGN_ID, numbered_rows_request("big.csv", 450))
        .await?;

    assert_eq!(response.stats.created, 450);
    assert_eq!(*leads.insert_chunks.lock().unwrap(), vec![200, 200, 50]);
    assert_eq!(leads.count_for_campaign(TENANT_ID, CAMPAIGN_ID).await?, 450);
    Ok(())
}

#[tokio::test]
async fn failed_chunk_records_only_committed_counts() -> Result<()> {
    let db = common::seeded_db().await?;
    let leads = Arc::new(FailingInsertLeads {
        inner: SqliteLeadRepository::new(db.pool().clone()),
        fail_on_call: 1,
        calls: Mutex::new(0),
    });
    let imports = imports_over(&db, leads.clone());

    let err = imports
        .import_csv(ADMIN_USER, TENANT_ID, CAMPAIGN_ID, numbered_rows_request("flaky.csv", 450))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INTERNAL_ERROR");
    assert_eq!(leads.count_for_campaign(TENANT_ID, CAMPAIGN_ID).await?, 200);

    let listing = imports.list_jobs(ADMIN_USER, TENANT_ID, CAMPAIGN_ID).await?;
    assert_eq!(listing.jobs.len(), 1);
    let job = &listing.jobs[0];
    assert_eq!(job.status, ImportJobStatus::PartiallyFailed);
    assert_eq!(job.stats.created, 200);
    assert_eq!(job.stats.updated, 0);
    assert!(job.failure.as_deref().is_some_and(|f| f.contains("database is locked")));
    Ok(())
}

#[tokio::test]
async fn reimport_with_email_dedupe_updates_in_place() -> Result<()> {
    let app = TestApp::spawn().await?;
    let first = json!({
        "fileName": "a.csv",
        "csvText": "Name,Email,Budget\nAda,ADA@example.com,100\n",
        "mapping": {"Name": "full_name", "Email": "email", "Budget": "custom.budget"},
        "dedupeMode": "email",
        "defaultStatusLabel": "New"
    });
    let second = json!({
        "fileName": "b.csv",
        "csvText": "Name,Email\nAda Lovelace,ada@example.com\n",
        "mapping": name_email_mapping(),
        "dedupeMode": "email",
        "defaultStatusLabel": "Won"
    });
    let user = [("x-user-id", ADMIN_USER)];
    app.call(request("POST", &imports_uri(), &user, Some(&first))).await;
    let (_, json) = app.call(request("POST", &imports_uri(), &user, Some(&second))).await;
    assert_eq!(json["data"]["stats"]["updated"], 1);

    let stored = app.leads_by_email("ada@example.com").await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].full_name.as_deref(), Some("Ada Lovelace"));
    // default status applies to inserts only
    assert_eq!(stored[0].status_id.as_deref(), Some("st-new"));
    assert_eq!(
        serde_json::to_value(&stored[0].custom_fields)?,
        json!({"budget": 100.0})
    );

    let (_, listing) = app.call(request("GET", &imports_uri(), &user, None)).await;
    let jobs = listing["data"]["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["file_name"], "b.csv");
    assert_eq!(jobs[1]["file_name"], "a.csv");
    Ok(())
}

#[tokio::test]
async fn mapping_problems_are_reported_before_processing() -> Result<()> {
    let app = TestApp::spawn().await?;
    let payload = json!({
        "fileName": "leads.csv",
        "csvText": "Name,Email\nAda,ada@example.com\n",
        "mapping": {"Name": "full_name", "Mail": "email", "Email": "custom.nope"},
        "dedupeMode": "none"
    });
    let (response, json) = app
        .call(request("POST", &imports_uri(), &[("x-user-id", ADMIN_USER)], Some(&payload)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    assert!(json["error"]["details"].as_array().is_some_and(|d| d.len() >= 2));
    assert_eq!(app.lead_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn import_requires_a_tenant_admin() -> Result<()> {
    let app = TestApp::spawn().await?;
    let payload = json!({
        "fileName": "leads.csv",
        "csvText": "Name,Email\nAda,ada@example.com\n",
        "mapping": name_email_mapping(),
        "dedupeMode": "none"
    });

    let (anonymous, _) = app.call(request("POST", &imports_uri(), &[], Some(&payload))).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let (member, json) = app
        .call(request("POST", &imports_uri(), &[("x-user-id", REP_USER)], Some(&payload)))
        .await;
    assert_eq!(member.status(), StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["message"], "Not a tenant admin");

    let unknown_campaign = format!(
        "/api/admin/tenants/{TENANT_ID}/campaigns/{}/imports",
        "00000000-0000-4000-8000-000000000000"
    );
    let (missing, json) = app
        .call(request("POST", &unknown_campaign, &[("x-user-id", ADMIN_USER)], Some(&payload)))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["message"], "Campaign not found");
    Ok(())
}

#[tokio::test]
async fn preview_returns_first_rows_only() -> Result<()> {
    let app = TestApp::spawn().await?;
    let mut csv_text = String::from("Name,Email\n");
    for i in 0..25 {
        csv_text.push_str(&format!("Lead {i},lead{i}@example.com\n"));
    }
    let payload = json!({"csvText": csv_text, "maxRows": 5});
    let (response, json) = app
        .call(request("POST", "/api/imports/preview", &[("x-user-id", REP_USER)], Some(&payload)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json["data"]["headers"], json!(["Name", "Email"]));
    assert_eq!(json["data"]["rows"].as_array().unwrap().len(), 5);
    assert_eq!(json["data"]["rows"][0]["Email"], "lead0@example.com");

    let (default_count, json) = app
        .call(request(
            "POST",
            "/api/imports/preview",
            &[("x-user-id", REP_USER)],
            Some(&json!({"csvText": payload["csvText"]})),
        ))
        .await;
    assert_eq!(default_count.status(), StatusCode::OK);
    assert_eq!(json["data"]["rows"].as_array().unwrap().len(), 10);
    Ok(())
}
