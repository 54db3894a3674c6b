//! Pre-flight admission and post-flight usage recording (spec §4.1).
//!
//! Grounded in `ai_budget_service.py`'s `check_budget`/`record_usage`:
//! same admission order (access classification, then mode-specific
//! budget check), same reset-lazily-on-read semantics, same cost model.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{ApiUsage, CompanyId, OperationType, ProductId, UserId};
use crate::store::BudgetStore;

use super::cache::{AccessMode, BudgetCache};
use super::errors::{AccessDeniedCode, BudgetError};

/// Default per-1M-token prices (spec §4.1 cost model).
#[derive(Debug, Clone, Copy)]
pub struct PriceTable {
    pub text_input: f64,
    pub text_output: f64,
    pub vision_input: f64,
    pub vision_output: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            text_input: 3.00,
            text_output: 15.00,
            vision_input: 1.00,
            vision_output: 5.00,
        }
    }
}

impl PriceTable {
    #[must_use]
    pub fn cost(&self, op: OperationType, input_tokens: u64, output_tokens: u64) -> f64 {
        let (price_in, price_out) = if op.is_vision() {
            (self.vision_input, self.vision_output)
        } else {
            (self.text_input, self.text_output)
        };
        let cost = (input_tokens as f64 / 1_000_000.0) * price_in
            + (output_tokens as f64 / 1_000_000.0) * price_out;
        (cost * 1_000_000.0).round() / 1_000_000.0
    }
}

/// Result of a successful `Check` call.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub allowed: bool,
    pub remaining: f64,
    pub total: f64,
}

pub struct BudgetGate<S: BudgetStore> {
    store: Arc<S>,
    cache: BudgetCache,
    prices: PriceTable,
}

impl<S: BudgetStore> BudgetGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: BudgetCache::new(),
            prices: PriceTable::default(),
        }
    }

    #[must_use]
    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    /// Classify the company's access mode, consulting and refreshing the
    /// 60s TTL cache (spec §4.1 step 1).
    async fn classify_access(&self, company_id: CompanyId) -> Result<AccessMode, BudgetError> {
        if let Some(mode) = self.cache.get_access(company_id) {
            return Ok(mode);
        }

        let company = self
            .store
            .get_company(company_id)
            .await?
            .ok_or(BudgetError::AccessDenied {
                company_id,
                code: AccessDeniedCode::CompanyNotFound,
                reason: "Company not found".to_string(),
            })?;

        use crate::domain::{AccessModel, AccessStatus};
        if company.access_status != AccessStatus::Active {
            let code = if company.access_status == AccessStatus::Pending {
                AccessDeniedCode::AccessPending
            } else {
                AccessDeniedCode::AccessDenied
            };
            return Err(BudgetError::AccessDenied {
                company_id,
                code,
                reason: code.as_str().to_string(),
            });
        }

        let mode = match company.access_model {
            AccessModel::Byok => AccessMode::Byok,
            AccessModel::EarlyAccess => AccessMode::EarlyAccess,
            AccessModel::Legacy => AccessMode::Legacy,
        };
        self.cache.put_access(company_id, mode);
        Ok(mode)
    }

    /// Conservative pre-flight cost estimate for a single `op` call (spec
    /// §4.1 `Check`'s `estimated_cost`), based on a representative DOM +
    /// screenshot prompt size. Callers issue this before the real token
    /// counts are known, so it is necessarily an approximation rather
    /// than the post-hoc cost `record_usage` computes from actuals.
    #[must_use]
    pub fn estimate_cost(&self, op: OperationType) -> f64 {
        const TYPICAL_INPUT_TOKENS: u64 = 8_000;
        const TYPICAL_OUTPUT_TOKENS: u64 = 1_500;
        self.prices.cost(op, TYPICAL_INPUT_TOKENS, TYPICAL_OUTPUT_TOKENS)
    }

    /// `Check(company_id, product_id, estimated_cost)` (spec §4.1).
    pub async fn check(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        estimated_cost: f64,
    ) -> Result<Admission, BudgetError> {
        let mode = self.classify_access(company_id).await?;

        match mode {
            AccessMode::Byok => {
                let sub = self
                    .store
                    .get_subscription(company_id, product_id)
                    .await?
                    .ok_or(BudgetError::NoSubscription {
                        company_id,
                        product_id,
                    })?;
                if sub.customer_claude_api_key.is_none() {
                    return Err(BudgetError::AccessDenied {
                        company_id,
                        code: AccessDeniedCode::NoApiKey,
                        reason: "No API key configured".to_string(),
                    });
                }
                Ok(Admission {
                    allowed: true,
                    remaining: f64::INFINITY,
                    total: f64::INFINITY,
                })
            }
            AccessMode::EarlyAccess => self.check_daily_budget(company_id, estimated_cost).await,
            AccessMode::Legacy => {
                self.check_monthly_budget(company_id, product_id, estimated_cost)
                    .await
            }
        }
    }

    async fn check_daily_budget(
        &self,
        company_id: CompanyId,
        estimated_cost: f64,
    ) -> Result<Admission, BudgetError> {
        let now = Utc::now();
        let company = self
            .store
            .with_company_lock(
                company_id,
                Box::new(move |company| {
                    if company.daily_reset_due(now) {
                        company.ai_used_today = 0.0;
                        company.last_usage_reset_date = now;
                    }
                }),
            )
            .await?;

        if company.trial_expired(now) {
            return Err(BudgetError::AccessDenied {
                company_id,
                code: AccessDeniedCode::TrialExpired,
                reason: AccessDeniedCode::TrialExpired.as_str().to_string(),
            });
        }

        let remaining = company.daily_ai_budget - company.ai_used_today;
        if estimated_cost > 0.0 && remaining < estimated_cost {
            return Err(BudgetError::BudgetExceeded {
                company_id,
                product_id: ProductId(0),
                total: company.daily_ai_budget,
                used: company.ai_used_today,
            });
        }

        Ok(Admission {
            allowed: remaining > 0.0,
            remaining,
            total: company.daily_ai_budget,
        })
    }

    async fn check_monthly_budget(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        estimated_cost: f64,
    ) -> Result<Admission, BudgetError> {
        if let Some((budget, used)) = self.cache.get_budget(company_id, product_id) {
            let remaining = budget - used;
            if estimated_cost > 0.0 && remaining < estimated_cost {
                return Err(BudgetError::BudgetExceeded {
                    company_id,
                    product_id,
                    total: budget,
                    used,
                });
            }
            return Ok(Admission {
                allowed: remaining > 0.0,
                remaining,
                total: budget,
            });
        }

        let now = Utc::now();
        let sub = self
            .store
            .with_subscription_lock(
                company_id,
                product_id,
                Box::new(move |sub| {
                    if sub.monthly_reset_due(now) {
                        sub.claude_used_this_month = 0.0;
                        sub.budget_reset_date = crate::domain::Subscription::next_reset_date(now);
                    }
                }),
            )
            .await?;

        self.cache.put_budget(
            company_id,
            product_id,
            sub.monthly_claude_budget,
            sub.claude_used_this_month,
        );

        let remaining = sub.monthly_claude_budget - sub.claude_used_this_month;
        if estimated_cost > 0.0 && remaining < estimated_cost {
            return Err(BudgetError::BudgetExceeded {
                company_id,
                product_id,
                total: sub.monthly_claude_budget,
                used: sub.claude_used_this_month,
            });
        }

        Ok(Admission {
            allowed: remaining > 0.0,
            remaining,
            total: sub.monthly_claude_budget,
        })
    }

    /// `RecordUsage` (spec §4.1): atomic counter update plus append-only
    /// `ApiUsage` row, then cache invalidation.
    pub async fn record_usage(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        user_id: UserId,
        operation_type: OperationType,
        input_tokens: u64,
        output_tokens: u64,
        crawl_session_id: Option<crate::domain::CrawlSessionId>,
    ) -> Result<(f64, f64, f64), BudgetError> {
        let mode = self.classify_access(company_id).await?;
        let cost = self.prices.cost(operation_type, input_tokens, output_tokens);

        if matches!(mode, AccessMode::Byok) {
            self.store
                .record_usage(ApiUsage {
                    company_id,
                    product_id,
                    user_id,
                    crawl_session_id,
                    operation_type,
                    input_tokens,
                    output_tokens,
                    api_cost: cost,
                    timestamp: Utc::now(),
                })
                .await?;
            return Ok((cost, f64::INFINITY, f64::INFINITY));
        }

        let remaining = if matches!(mode, AccessMode::EarlyAccess) {
            let company = self
                .store
                .with_company_lock(
                    company_id,
                    Box::new(move |company| {
                        company.ai_used_today += cost;
                    }),
                )
                .await?;
            self.cache.invalidate_access(company_id);
            company.daily_ai_budget - company.ai_used_today
        } else {
            let sub = self
                .store
                .with_subscription_lock(
                    company_id,
                    product_id,
                    Box::new(move |sub| {
                        sub.claude_used_this_month += cost;
                    }),
                )
                .await?;
            self.cache.invalidate_budget(company_id, product_id);
            sub.monthly_claude_budget - sub.claude_used_this_month
        };

        self.store
            .record_usage(ApiUsage {
                company_id,
                product_id,
                user_id,
                crawl_session_id,
                operation_type,
                input_tokens,
                output_tokens,
                api_cost: cost,
                timestamp: Utc::now(),
            })
            .await?;

        Ok((cost, remaining, remaining + cost))
    }

    /// `RecordBatch`: groups by `(company_id, product_id)`, locking each
    /// group in ascending order to avoid deadlock across concurrent
    /// batches, and applies one counter update per group covering every
    /// row in it rather than one lock acquisition per row (spec §4.1).
    pub async fn record_batch(
        &self,
        mut entries: Vec<(CompanyId, ProductId, UserId, OperationType, u64, u64)>,
    ) -> Result<(), BudgetError> {
        entries.sort_by_key(|(company, product, ..)| (*company, *product));

        let mut start = 0;
        while start < entries.len() {
            let (company_id, product_id) = (entries[start].0, entries[start].1);
            let mut end = start + 1;
            while end < entries.len() && entries[end].0 == company_id && entries[end].1 == product_id {
                end += 1;
            }
            self.record_group(company_id, product_id, &entries[start..end]).await?;
            start = end;
        }
        Ok(())
    }

    /// One lock acquisition (if any) and one bulk insert for every row
    /// sharing `(company_id, product_id)`.
    async fn record_group(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        group: &[(CompanyId, ProductId, UserId, OperationType, u64, u64)],
    ) -> Result<(), BudgetError> {
        let mode = self.classify_access(company_id).await?;
        let now = Utc::now();

        let rows: Vec<(UserId, OperationType, u64, u64, f64)> = group
            .iter()
            .map(|(_, _, user_id, op, input_tokens, output_tokens)| {
                let cost = self.prices.cost(*op, *input_tokens, *output_tokens);
                (*user_id, *op, *input_tokens, *output_tokens, cost)
            })
            .collect();
        let total_cost: f64 = rows.iter().map(|(_, _, _, _, cost)| *cost).sum();

        if !matches!(mode, AccessMode::Byok) {
            if matches!(mode, AccessMode::EarlyAccess) {
                self.store
                    .with_company_lock(
                        company_id,
                        Box::new(move |company| {
                            company.ai_used_today += total_cost;
                        }),
                    )
                    .await?;
                self.cache.invalidate_access(company_id);
            } else {
                self.store
                    .with_subscription_lock(
                        company_id,
                        product_id,
                        Box::new(move |sub| {
                            sub.claude_used_this_month += total_cost;
                        }),
                    )
                    .await?;
                self.cache.invalidate_budget(company_id, product_id);
            }
        }

        for (user_id, operation_type, input_tokens, output_tokens, api_cost) in rows {
            self.store
                .record_usage(ApiUsage {
                    company_id,
                    product_id,
                    user_id,
                    crawl_session_id: None,
                    operation_type,
                    input_tokens,
                    output_tokens,
                    api_cost,
                    timestamp: now,
                })
                .await?;
        }
        Ok(())
    }
}
