use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::config::QuotaConfig;

/// Calls every user gets each month without rewards
pub const FREE_BASE_PER_MONTH: u32 = 1;
/// Ceiling on reward grants per month
pub const REWARD_MAX_PER_MONTH: u32 = 2;

/// Stored per-user usage document.
///
/// Missing fields deserialize to zero / empty month, so a partial document
/// behaves like a stale one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub reward_grants: u32,
    #[serde(default)]
    pub month: String,
}

impl UsageRecord {
    pub fn fresh(month: &str) -> Self {
        Self {
            usage_count: 0,
            reward_grants: 0,
            month: month.to_string(),
        }
    }
}

/// `YYYY-MM` token for the UTC month containing `now`
pub fn month_token(now: OffsetDateTime) -> String {
    let now = now.to_offset(time::UtcOffset::UTC);
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}

/// Record as it applies to `month`: stale or missing records read as fresh.
///
/// Pure; persisting the reset is left to the write paths.
pub fn effective_record(stored: Option<UsageRecord>, month: &str) -> UsageRecord {
    match stored {
        Some(record) if record.month == month => record,
        _ => UsageRecord::fresh(month),
    }
}

/// Base allowance plus rewards, with rewards clamped at the configured ceiling
pub fn effective_limit(reward_grants: u32, config: &QuotaConfig) -> u32 {
    config.free_base_per_month + reward_grants.min(config.reward_max_per_month)
}

/// Derived quota state returned by every ledger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageView {
    pub usage_count: u32,
    pub reward_grants: u32,
    pub month: String,
    pub remaining: u32,
    pub can_use: bool,
    pub reward_slots_remaining: u32,
}

impl UsageView {
    pub fn from_record(record: &UsageRecord, config: &QuotaConfig) -> Self {
        let limit = effective_limit(record.reward_grants, config);
        let remaining = limit.saturating_sub(record.usage_count);

        Self {
            usage_count: record.usage_count,
            reward_grants: record.reward_grants,
            month: record.month.clone(),
            remaining,
            can_use: remaining > 0,
            reward_slots_remaining: config
                .reward_max_per_month
                .saturating_sub(record.reward_grants),
        }
    }
}

/// GET /usage query string
#[derive(Debug, Deserialize, Validate)]
pub struct UsageQuery {
    #[validate(required(message = "user_id required"), length(min = 1, message = "user_id required"))]
    pub user_id: Option<String>,
}

/// Body of POST /usage/increment and /usage/grant_reward
#[derive(Debug, Deserialize, Validate)]
pub struct UsageMutationRequest {
    #[serde(default)]
    #[validate(required(message = "user_id required"), length(min = 1, message = "user_id required"))]
    pub user_id: Option<String>,
}

/// Response for increment and grant; the view without the derived flags
#[derive(Debug, Serialize)]
pub struct UsageMutationResponse {
    pub usage_count: u32,
    pub reward_grants: u32,
    pub month: String,
    pub remaining: u32,
}

impl From<UsageView> for UsageMutationResponse {
    fn from(view: UsageView) -> Self {
        Self {
            usage_count: view.usage_count,
            reward_grants: view.reward_grants,
            month: view.month,
            remaining: view.remaining,
        }
    }
}
