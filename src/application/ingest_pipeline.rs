//! Shared dedupe → plan → write pipeline used by both ingestion paths

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::application::batch_executor::{BatchExecutor, BatchFailure, BatchReport};
use crate::domain::lead::ValidatedLead;
use crate::domain::repositories::{LeadRepository, LookupScope};
use crate::domain::services::dedupe::{DedupeMode, LeadIndex};
use crate::domain::services::write_plan::{PlannedAction, WritePlan, WritePlanner};

/// Where and how one batch is ingested.
#[derive(Debug, Clone, Copy)]
pub struct IngestTarget<'a> {
    pub tenant_id: &'a str,
    pub campaign_id: &'a str,
    pub mode: DedupeMode,
    /// Applied to inserted leads that carry no status.
    pub default_status_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct IngestPipeline {
    leads: Arc<dyn LeadRepository>,
    executor: BatchExecutor,
}

impl IngestPipeline {
    pub fn new(leads: Arc<dyn LeadRepository>, chunk_size: usize) -> Self {
        let executor = BatchExecutor::new(leads.clone(), chunk_size);
        Self { leads, executor }
    }

    /// Fetch every existing lead the batch could match, one query per key
    /// kind, issued concurrently.
    pub async fn build_index(&self, target: IngestTarget<'_>, batch: &[ValidatedLead]) -> Result<LeadIndex> {
        let scope = LookupScope {
            tenant_id: target.tenant_id,
            campaign_id: target.campaign_id,
        };
        let wanted = target.mode.collect_key_values(batch);
        let lookups = try_join_all(wanted.into_iter().map(|(kind, values)| async move {
            let found = self.leads.find_by_keys(scope, kind, &values).await?;
            debug!(?kind, keys = values.len(), found = found.len(), "dedupe lookup");
            Ok::<_, anyhow::Error>((kind, found))
        }))
        .await?;
        Ok(LeadIndex::from_lookups(target.mode, lookups))
    }

    /// Decide insert or update for every row, in order.
    pub async fn plan(
        &self,
        target: IngestTarget<'_>,
        batch: Vec<ValidatedLead>,
    ) -> Result<(WritePlan, Vec<PlannedAction>)> {
        let index = self.build_index(target, &batch).await?;
        let mut planner = WritePlanner::new(
            target.tenant_id,
            target.campaign_id,
            target.mode,
            target.default_status_id,
            index,
            Utc::now(),
        );
        let actions = batch.into_iter().map(|lead| planner.push(lead)).collect();
        let plan = planner.finish();
        info!(
            created = plan.created,
            updated = plan.updated,
            inserts = plan.inserts.len(),
            updates = plan.updates.len(),
            "write plan ready"
        );
        Ok((plan, actions))
    }

    pub async fn write(&self, plan: &WritePlan) -> Result<BatchReport, BatchFailure> {
        self.executor.execute(plan).await
    }
}
