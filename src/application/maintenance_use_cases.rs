//! Cron-triggered housekeeping

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::application::IngestionSettings;
use crate::application::dto::SweepResponse;
use crate::application::errors::IngestError;
use crate::domain::repositories::{IdempotencyStore, RateLimitStore};
use crate::infrastructure::credentials::constant_time_eq;

const CRON_RATE_LIMIT_SCOPE: &str = "cron:idempotency-sweep";

pub struct MaintenanceUseCases {
    idempotency: Arc<dyn IdempotencyStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    cron_secret: Option<String>,
    settings: IngestionSettings,
}

impl MaintenanceUseCases {
    pub fn new(
        idempotency: Arc<dyn IdempotencyStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        cron_secret: Option<String>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            idempotency,
            rate_limits,
            cron_secret: cron_secret.filter(|s| !s.is_empty()),
            settings,
        }
    }

    fn verify_secret(&self, presented: Option<&str>) -> Result<(), IngestError> {
        match (&self.cron_secret, presented) {
            (Some(expected), Some(presented)) if constant_time_eq(expected.as_bytes(), presented.as_bytes()) => Ok(()),
            _ => {
                warn!("invalid cron secret attempt");
                Err(IngestError::Unauthorized("Invalid cron secret".into()))
            }
        }
    }

    /// Delete idempotency records older than the retention window.
    pub async fn sweep_idempotency(&self, presented_secret: Option<&str>) -> Result<SweepResponse, IngestError> {
        self.verify_secret(presented_secret)?;

        let decision = self
            .rate_limits
            .try_acquire(CRON_RATE_LIMIT_SCOPE, self.settings.cron_rate_capacity)
            .await?;
        if !decision.allowed {
            return Err(IngestError::RateLimited {
                retry_after_ms: u64::try_from(decision.retry_after.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let cutoff = Utc::now() - self.settings.idempotency_retention;
        let deleted = self.idempotency.sweep_older_than(cutoff).await?;
        info!(deleted, %cutoff, "🧹 idempotency sweep finished");
        Ok(SweepResponse { deleted, cutoff })
    }
}
