//! Budget Gate (C1): admission and usage recording under concurrency.
//!
//! See spec §4.1. Grounded in `ai_budget_service.py`.

mod cache;
mod errors;
mod gate;

pub use cache::{AccessMode, BudgetCache, CACHE_TTL};
pub use errors::{AccessDeniedCode, BudgetError};
pub use gate::{Admission, BudgetGate, PriceTable};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::domain::{AccessModel, AccessStatus, Company, CompanyId, ProductId, Subscription};
    use crate::store::MemoryStore;

    fn legacy_company(id: CompanyId) -> Company {
        Company {
            id,
            access_model: AccessModel::Legacy,
            access_status: AccessStatus::Active,
            daily_ai_budget: 0.0,
            ai_used_today: 0.0,
            last_usage_reset_date: Utc::now(),
            trial_start_date: None,
            trial_days_total: None,
        }
    }

    #[tokio::test]
    async fn boundary_remaining_zero_denies() {
        let store = Arc::new(MemoryStore::new());
        let company_id = CompanyId(uuid::Uuid::new_v4());
        let product_id = ProductId(1);
        store.seed_company(legacy_company(company_id));
        store.seed_subscription(Subscription {
            company_id,
            product_id,
            monthly_claude_budget: 10.0,
            claude_used_this_month: 10.0,
            budget_reset_date: Utc::now() + chrono::Duration::days(10),
            customer_claude_api_key: None,
        });

        let gate = BudgetGate::new(store);
        let admission = gate.check(company_id, product_id, 0.0).await.unwrap();
        assert_eq!(admission.remaining, 0.0);
        assert!(!admission.allowed);
    }

    #[tokio::test]
    async fn budget_exceeded_on_estimated_cost() {
        let store = Arc::new(MemoryStore::new());
        let company_id = CompanyId(uuid::Uuid::new_v4());
        let product_id = ProductId(1);
        store.seed_company(legacy_company(company_id));
        store.seed_subscription(Subscription {
            company_id,
            product_id,
            monthly_claude_budget: 1.0,
            claude_used_this_month: 0.98,
            budget_reset_date: Utc::now() + chrono::Duration::days(10),
            customer_claude_api_key: None,
        });

        let gate = BudgetGate::new(store);
        let err = gate.check(company_id, product_id, 0.05).await.unwrap_err();
        assert!(matches!(err, BudgetError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn record_usage_is_monotone_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let company_id = CompanyId(uuid::Uuid::new_v4());
        let product_id = ProductId(1);
        store.seed_company(legacy_company(company_id));
        store.seed_subscription(Subscription {
            company_id,
            product_id,
            monthly_claude_budget: 100.0,
            claude_used_this_month: 0.0,
            budget_reset_date: Utc::now() + chrono::Duration::days(10),
            customer_claude_api_key: None,
        });

        let gate = Arc::new(BudgetGate::new(store));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.record_usage(
                    company_id,
                    product_id,
                    crate::domain::UserId(uuid::Uuid::new_v4()),
                    crate::domain::OperationType::GenerateFormSteps,
                    1_000_000,
                    1_000_000,
                    None,
                )
                .await
                .unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let admission = gate.check(company_id, product_id, 0.0).await.unwrap();
        // 10 calls x (3 + 15) = 180, against a budget of 100 -> fully consumed, clamped at 0 remaining floor not enforced (negative allowed, allowed=false)
        assert!(!admission.allowed);
    }

    #[tokio::test]
    async fn record_batch_sums_cost_per_group_in_one_update() {
        let store = Arc::new(MemoryStore::new());
        let company_id = CompanyId(uuid::Uuid::new_v4());
        let product_id = ProductId(1);
        store.seed_company(legacy_company(company_id));
        store.seed_subscription(Subscription {
            company_id,
            product_id,
            monthly_claude_budget: 100.0,
            claude_used_this_month: 0.0,
            budget_reset_date: Utc::now() + chrono::Duration::days(10),
            customer_claude_api_key: None,
        });

        let gate = BudgetGate::new(store);
        let user_id = crate::domain::UserId(uuid::Uuid::new_v4());
        gate.record_batch(vec![
            (company_id, product_id, user_id, crate::domain::OperationType::GenerateFormSteps, 1_000_000, 0),
            (company_id, product_id, user_id, crate::domain::OperationType::GenerateFormSteps, 1_000_000, 0),
            (company_id, product_id, user_id, crate::domain::OperationType::GenerateFormSteps, 1_000_000, 0),
        ])
        .await
        .unwrap();

        // 3 x 3.00 (text input price per 1M tokens) = 9.00, applied as a
        // single summed update rather than three independent ones.
        let admission = gate.check(company_id, product_id, 0.0).await.unwrap();
        assert!((admission.remaining - 91.0).abs() < 1e-6);
    }
}
