use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    config::QuotaConfig,
    error::{ApiError, Result},
    models::usage::{effective_record, month_token, UsageRecord, UsageView},
    services::usage_store::UsageStore,
};

/// Source of the current time, swappable so month rollover can be tested
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Monthly free-tier ledger.
///
/// Each operation is a plain load / modify / overwrite against the store with
/// no locking; concurrent writers for one user are last-write-wins. Reads
/// apply the month rollover in memory only, writes persist it.
pub struct QuotaService {
    store: Arc<dyn UsageStore>,
    config: QuotaConfig,
    clock: Arc<dyn Clock>,
}

impl QuotaService {
    pub fn new(store: Arc<dyn UsageStore>, config: &QuotaConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn UsageStore>,
        config: &QuotaConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config: config.clone(),
            clock,
        }
    }

    /// Current usage for a user; stale or missing records read as fresh
    #[instrument(skip(self))]
    pub async fn read(&self, user_id: &str) -> Result<UsageView> {
        let user_id = validate_user_id(user_id)?;
        let record = self.load(user_id).await?;

        Ok(UsageView::from_record(&record, &self.config))
    }

    /// Record one call. Does not enforce the limit; `remaining` floors at 0.
    #[instrument(skip(self))]
    pub async fn increment(&self, user_id: &str) -> Result<UsageView> {
        let user_id = validate_user_id(user_id)?;
        let mut record = self.load(user_id).await?;

        record.usage_count = record.usage_count.saturating_add(1);
        self.store.set(user_id, &record).await?;

        let view = UsageView::from_record(&record, &self.config);
        info!(
            "Incremented usage for {} to {} (remaining: {})",
            user_id, view.usage_count, view.remaining
        );

        Ok(view)
    }

    /// Add one reward grant, saturating at the monthly ceiling
    #[instrument(skip(self))]
    pub async fn grant_reward(&self, user_id: &str) -> Result<UsageView> {
        let user_id = validate_user_id(user_id)?;
        let mut record = self.load(user_id).await?;

        record.reward_grants = record
            .reward_grants
            .saturating_add(1)
            .min(self.config.reward_max_per_month);
        self.store.set(user_id, &record).await?;

        let view = UsageView::from_record(&record, &self.config);
        info!(
            "Granted reward to {} (grants: {}, remaining: {})",
            user_id, view.reward_grants, view.remaining
        );

        Ok(view)
    }

    pub fn current_month(&self) -> String {
        month_token(self.clock.now_utc())
    }

    async fn load(&self, user_id: &str) -> Result<UsageRecord> {
        let stored = self.store.get(user_id).await?;
        Ok(effective_record(stored, &self.current_month()))
    }
}

/// Trimmed user id, rejecting blank input
fn validate_user_id(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("user_id required".to_string()));
    }
    Ok(trimmed)
}
