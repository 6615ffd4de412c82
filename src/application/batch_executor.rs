//! Chunked lead writes
//!
//! Inserts go first, then updates, each split into chunks of a fixed size and
//! committed one transaction per chunk. The first failing chunk stops the run;
//! chunks committed before it stay committed and are reported back.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};

use crate::domain::repositories::LeadRepository;
use crate::domain::services::write_plan::WritePlan;

/// What reached storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub insert_chunks: Vec<usize>,
    pub update_chunks: Vec<usize>,
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug)]
pub struct BatchFailure {
    /// Chunks committed before the failure.
    pub report: BatchReport,
    pub error: anyhow::Error,
}

#[derive(Clone)]
pub struct BatchExecutor {
    leads: Arc<dyn LeadRepository>,
    chunk_size: usize,
}

impl BatchExecutor {
    pub fn new(leads: Arc<dyn LeadRepository>, chunk_size: usize) -> Self {
        Self {
            leads,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn execute(&self, plan: &WritePlan) -> Result<BatchReport, BatchFailure> {
        let mut report = BatchReport::default();

        for (index, chunk) in plan.inserts.chunks(self.chunk_size).enumerate() {
            if let Err(error) = self.leads.insert_batch(chunk).await {
                error!(chunk = index, size = chunk.len(), "insert chunk failed: {error:#}");
                return Err(BatchFailure {
                    report,
                    error: error.context(format!("Failed to insert leads (chunk {})", index + 1)),
                });
            }
            debug!(chunk = index, size = chunk.len(), "insert chunk committed");
            report.insert_chunks.push(chunk.len());
            report.inserted += chunk.len();
        }

        for (index, chunk) in plan.updates.chunks(self.chunk_size).enumerate() {
            if let Err(error) = self.leads.update_batch(chunk).await {
                error!(chunk = index, size = chunk.len(), "update chunk failed: {error:#}");
                return Err(BatchFailure {
                    report,
                    error: error.context(format!("Failed to update leads (chunk {})", index + 1)),
                });
            }
            debug!(chunk = index, size = chunk.len(), "update chunk committed");
            report.update_chunks.push(chunk.len());
            report.updated += chunk.len();
        }

        Ok(report)
    }
}
