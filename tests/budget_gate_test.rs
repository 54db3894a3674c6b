//! Cross-mode Budget Gate behavior not already covered by
//! `budget::tests` (which focuses on legacy monthly admission): BYOK's
//! unmetered/no-api-key split, early-access daily reset, and
//! cross-company isolation of the access-mode cache.

use std::sync::Arc;

use chrono::Utc;
use form_mapper_control_plane::budget::BudgetGate;
use form_mapper_control_plane::domain::{
    AccessModel, AccessStatus, Company, CompanyId, OperationType, ProductId, Subscription, UserId,
};
use form_mapper_control_plane::store::MemoryStore;

fn byok_company(id: CompanyId) -> Company {
    Company {
        id,
        access_model: AccessModel::Byok,
        access_status: AccessStatus::Active,
        daily_ai_budget: 0.0,
        ai_used_today: 0.0,
        last_usage_reset_date: Utc::now(),
        trial_start_date: None,
        trial_days_total: None,
    }
}

fn early_access_company(id: CompanyId, daily_budget: f64, used_today: f64, last_reset: chrono::DateTime<Utc>) -> Company {
    Company {
        id,
        access_model: AccessModel::EarlyAccess,
        access_status: AccessStatus::Active,
        daily_ai_budget: daily_budget,
        ai_used_today: used_today,
        last_usage_reset_date: last_reset,
        trial_start_date: Some(Utc::now() - chrono::Duration::days(1)),
        trial_days_total: Some(14),
    }
}

#[tokio::test]
async fn byok_admission_is_unlimited_when_api_key_present() {
    let store = Arc::new(MemoryStore::new());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let product_id = ProductId(1);
    store.seed_company(byok_company(company_id));
    store.seed_subscription(Subscription {
        company_id,
        product_id,
        monthly_claude_budget: 0.0,
        claude_used_this_month: 0.0,
        budget_reset_date: Utc::now(),
        customer_claude_api_key: Some("encrypted-key".to_string()),
    });

    let gate = BudgetGate::new(store);
    let admission = gate.check(company_id, product_id, 1_000_000.0).await.unwrap();
    assert!(admission.allowed);
    assert!(admission.remaining.is_infinite());
}

#[tokio::test]
async fn byok_without_api_key_is_denied() {
    let store = Arc::new(MemoryStore::new());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let product_id = ProductId(1);
    store.seed_company(byok_company(company_id));
    store.seed_subscription(Subscription {
        company_id,
        product_id,
        monthly_claude_budget: 0.0,
        claude_used_this_month: 0.0,
        budget_reset_date: Utc::now(),
        customer_claude_api_key: None,
    });

    let gate = BudgetGate::new(store);
    let err = gate.check(company_id, product_id, 0.0).await.unwrap_err();
    assert!(matches!(
        err,
        form_mapper_control_plane::budget::BudgetError::AccessDenied {
            code: form_mapper_control_plane::budget::AccessDeniedCode::NoApiKey,
            ..
        }
    ));
}

#[tokio::test]
async fn early_access_daily_usage_resets_after_24h() {
    let store = Arc::new(MemoryStore::new());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let product_id = ProductId(1);
    let stale_reset = Utc::now() - chrono::Duration::hours(25);
    store.seed_company(early_access_company(company_id, 10.0, 9.99, stale_reset));

    let gate = BudgetGate::new(store);
    let admission = gate.check(company_id, product_id, 5.0).await.unwrap();
    assert!(admission.allowed);
    assert_eq!(admission.remaining, 10.0);
}

#[tokio::test]
async fn early_access_trial_expiry_denies_regardless_of_remaining_budget() {
    let store = Arc::new(MemoryStore::new());
    let company_id = CompanyId(uuid::Uuid::new_v4());
    let product_id = ProductId(1);
    let mut company = early_access_company(company_id, 100.0, 0.0, Utc::now());
    company.trial_start_date = Some(Utc::now() - chrono::Duration::days(20));
    company.trial_days_total = Some(14);
    store.seed_company(company);

    let gate = BudgetGate::new(store);
    let err = gate.check(company_id, product_id, 0.0).await.unwrap_err();
    assert!(matches!(
        err,
        form_mapper_control_plane::budget::BudgetError::AccessDenied {
            code: form_mapper_control_plane::budget::AccessDeniedCode::TrialExpired,
            ..
        }
    ));
}

#[tokio::test]
async fn access_mode_cache_is_isolated_per_company() {
    let store = Arc::new(MemoryStore::new());
    let byok_id = CompanyId(uuid::Uuid::new_v4());
    let legacy_id = CompanyId(uuid::Uuid::new_v4());
    let product_id = ProductId(1);

    store.seed_company(byok_company(byok_id));
    store.seed_subscription(Subscription {
        company_id: byok_id,
        product_id,
        monthly_claude_budget: 0.0,
        claude_used_this_month: 0.0,
        budget_reset_date: Utc::now(),
        customer_claude_api_key: Some("key".to_string()),
    });

    store.seed_company(Company {
        id: legacy_id,
        access_model: AccessModel::Legacy,
        access_status: AccessStatus::Active,
        daily_ai_budget: 0.0,
        ai_used_today: 0.0,
        last_usage_reset_date: Utc::now(),
        trial_start_date: None,
        trial_days_total: None,
    });
    store.seed_subscription(Subscription {
        company_id: legacy_id,
        product_id,
        monthly_claude_budget: 5.0,
        claude_used_this_month: 0.0,
        budget_reset_date: Utc::now() + chrono::Duration::days(10),
        customer_claude_api_key: None,
    });

    let gate = BudgetGate::new(store);
    let byok_admission = gate.check(byok_id, product_id, 0.0).await.unwrap();
    let legacy_admission = gate.check(legacy_id, product_id, 0.0).await.unwrap();
    assert!(byok_admission.remaining.is_infinite());
    assert_eq!(legacy_admission.remaining, 5.0);

    // A subsequent record_usage against the legacy company must not be
    // priced or billed as the BYOK company's free-of-charge usage.
    let (cost, remaining, _total) = gate
        .record_usage(legacy_id, product_id, UserId(uuid::Uuid::new_v4()), OperationType::GenerateFormSteps, 1_000_000, 1_000_000, None)
        .await
        .unwrap();
    assert!((cost - 18.0).abs() < 1e-9);
    assert!((remaining - (5.0 - 18.0)).abs() < 1e-9);
}
