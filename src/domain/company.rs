use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompanyId, ProductId};

/// How a company's AI usage is billed and gated.
///
/// `Legacy` and `EarlyAccess` are metered against a budget owned by the
/// server; `Byok` proxies to the company's own provider credential and is
/// never metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessModel {
    Legacy,
    Byok,
    EarlyAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Pending,
    Active,
    Revoked,
}

/// Server-owned record of a tenant. See spec §3 "Company".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub access_model: AccessModel,
    pub access_status: AccessStatus,
    pub daily_ai_budget: f64,
    pub ai_used_today: f64,
    pub last_usage_reset_date: DateTime<Utc>,
    pub trial_start_date: Option<DateTime<Utc>>,
    pub trial_days_total: Option<u32>,
}

impl Company {
    /// Whether a 24h window has elapsed since the last daily-budget reset.
    #[must_use]
    pub fn daily_reset_due(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_usage_reset_date) >= chrono::Duration::hours(24)
    }

    /// Whether an `early_access` trial has expired as of `now`.
    ///
    /// Expiry is inclusive of the boundary instant: trial ending at
    /// exactly `now` is treated as expired (spec §8 boundary behavior).
    #[must_use]
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.trial_start_date, self.trial_days_total) {
            (Some(start), Some(days)) => now >= start + chrono::Duration::days(i64::from(days)),
            _ => true,
        }
    }
}

/// Server-owned record of a Company×Product entitlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub monthly_claude_budget: f64,
    pub claude_used_this_month: f64,
    pub budget_reset_date: DateTime<Utc>,
    /// Opaque ciphertext; presence indicates BYOK regardless of
    /// `Company::access_model`.
    pub customer_claude_api_key: Option<String>,
}

impl Subscription {
    #[must_use]
    pub fn is_byok(&self) -> bool {
        self.customer_claude_api_key.is_some()
    }

    #[must_use]
    pub fn monthly_reset_due(&self, now: DateTime<Utc>) -> bool {
        self.budget_reset_date <= now
    }

    /// First instant of the next calendar month after `now`.
    #[must_use]
    pub fn next_reset_date(now: DateTime<Utc>) -> DateTime<Utc> {
        use chrono::{Datelike, TimeZone};
        let (year, month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .unwrap_or(now)
    }
}
