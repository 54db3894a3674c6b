//! `MapperOrchestrator` phase transitions beyond what `mapper::tests`
//! already covers (empty-login-stages skip, idempotent cancel, and a
//! state-conflict on a stale expected-state). This file walks the full
//! transition sequence end to end: navigation -> dom extraction ->
//! analysis -> step execution -> path completion, plus the
//! unrecoverable-after-repeated-recovery and budget-exceeded failure
//! classes.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use form_mapper_control_plane::ai_broker::{AiBroker, AiError, AiProvider};
use form_mapper_control_plane::budget::BudgetGate;
use form_mapper_control_plane::domain::{
    AccessModel, AccessStatus, Company, CompanyId, CrawlSessionId, FormRouteId, NetworkId, ProductId, Step, StepAction, Subscription, UserId,
};
use form_mapper_control_plane::mapper::{MapperConfig, MapperError, MapperOrchestrator, MapperState};
use form_mapper_control_plane::store::MemoryStore;
use form_mapper_control_plane::task_bus::TaskBus;

struct OneStepProvider;

#[async_trait]
impl AiProvider for OneStepProvider {
    async fn complete(&self, _prompt: &str, _screenshot: Option<&str>) -> Result<(String, u64, u64), AiError> {
        Ok((
            r#"{"steps": [{"action": "click", "selector": "#next", "full_xpath": "/html/body/button"}], "no_more_paths": false}"#
                .to_string(),
            100,
            50,
        ))
    }
}

struct AlwaysFailProvider;

#[async_trait]
impl AiProvider for AlwaysFailProvider {
    async fn complete(&self, _prompt: &str, _screenshot: Option<&str>) -> Result<(String, u64, u64), AiError> {
        Ok((
            r#"{"steps": [{"action": "click", "selector": "#retry-me", "full_xpath": "/html/body/button"}]}"#.to_string(),
            10,
            10,
        ))
    }
}

fn seed_legacy_company(store: &MemoryStore, company_id: CompanyId, product_id: ProductId, monthly_budget: f64, used: f64) {
    store.seed_company(Company {
        id: company_id,
        access_model: AccessModel::Legacy,
        access_status: AccessStatus::Active,
        daily_ai_budget: 0.0,
        ai_used_today: 0.0,
        last_usage_reset_date: chrono::Utc::now(),
        trial_start_date: None,
        trial_days_total: None,
    });
    store.seed_subscription(Subscription {
        company_id,
        product_id,
        monthly_claude_budget: monthly_budget,
        claude_used_this_month: used,
        budget_reset_date: chrono::Utc::now() + chrono::Duration::days(10),
        customer_claude_api_key: None,
    });
}

fn setup<P: AiProvider>(ai_provider: P, monthly_budget: f64, used: f64) -> (MapperOrchestrator<MemoryStore, P>, CrawlSessionId, CompanyId) {
    let store = Arc::new(MemoryStore::new());
    let company_id = CompanyId(Uuid::new_v4());
    let product_id = ProductId(1);
    seed_legacy_company(&store, company_id, product_id, monthly_budget, used);

    let budget = Arc::new(BudgetGate::new(store.clone()));
    let ai = Arc::new(AiBroker::new(ai_provider));
    let bus = Arc::new(TaskBus::new(store.clone(), b"test-secret".to_vec()));
    let orchestrator = MapperOrchestrator::new(budget, ai, bus);

    let session_id = CrawlSessionId(Uuid::new_v4());
    orchestrator.start_session(
        session_id,
        UserId(Uuid::new_v4()),
        company_id,
        product_id,
        NetworkId(Uuid::new_v4()),
        FormRouteId(Uuid::new_v4()),
        MapperConfig::default(),
    );
    (orchestrator, session_id, company_id)
}

#[tokio::test]
async fn full_session_walks_through_every_phase_to_path_complete() {
    let (orchestrator, session_id, _company_id) = setup(OneStepProvider, 1000.0, 0.0);

    assert_eq!(orchestrator.start_login_phase(session_id, &[]).await.unwrap(), MapperState::Navigating);
    assert_eq!(orchestrator.start_navigation_phase(session_id, &[]).await.unwrap(), MapperState::ExtractingDom);
    assert_eq!(
        orchestrator.handle_dom_extraction_result(session_id, "dom-hash-1".to_string()).unwrap(),
        MapperState::Analyzing
    );

    let after_analysis = orchestrator.run_analysis(session_id, "<html></html>", None).await.unwrap();
    assert_eq!(after_analysis, MapperState::ExecutingStep);
    assert_eq!(orchestrator.get_session_status(session_id).unwrap().all_steps.len(), 1);

    // The single step completes the main path, handing off to the
    // verification sub-prompt (spec §4.5 "After Save/Submit, switch to
    // verification sub-prompt").
    let after_step = orchestrator.handle_step_result(session_id, true, false, "<html></html>", None).await.unwrap();
    assert_eq!(after_step, MapperState::ExecutingStep);
    assert!(orchestrator.get_session_status(session_id).unwrap().verifying);

    // Completing the (one-step) verification sub-path finishes the path
    // and, with paths remaining under the junction cap, re-enters analysis.
    let after_verify = orchestrator.handle_step_result(session_id, true, false, "<html></html>", None).await.unwrap();
    assert_eq!(after_verify, MapperState::Analyzing);
    assert_eq!(orchestrator.get_session_status(session_id).unwrap().total_paths_discovered, 1);
}

#[tokio::test]
async fn step_failure_without_alert_queues_a_recovery_and_stays_in_executing_step() {
    let (orchestrator, session_id, _company_id) = setup(AlwaysFailProvider, 1000.0, 0.0);

    orchestrator.start_login_phase(session_id, &[]).await.unwrap();
    orchestrator.start_navigation_phase(session_id, &[]).await.unwrap();
    orchestrator.handle_dom_extraction_result(session_id, "dom-hash".to_string()).unwrap();
    orchestrator.run_analysis(session_id, "<html></html>", None).await.unwrap();

    let next = orchestrator.handle_step_result(session_id, false, false, "<html></html>", None).await.unwrap();
    assert_eq!(next, MapperState::ExecutingStep);
}

#[tokio::test]
async fn repeated_identical_recovery_declares_the_session_unrecoverable() {
    let (orchestrator, session_id, _company_id) = setup(AlwaysFailProvider, 1000.0, 0.0);

    orchestrator.start_login_phase(session_id, &[]).await.unwrap();
    orchestrator.start_navigation_phase(session_id, &[]).await.unwrap();
    orchestrator.handle_dom_extraction_result(session_id, "dom-hash".to_string()).unwrap();
    orchestrator.run_analysis(session_id, "<html></html>", None).await.unwrap();

    for _ in 0..3 {
        let state = orchestrator.handle_step_result(session_id, false, false, "<html></html>", None).await.unwrap();
        assert_eq!(state, MapperState::ExecutingStep);
    }

    let err = orchestrator.handle_step_result(session_id, false, false, "<html></html>", None).await.unwrap_err();
    assert!(matches!(err, MapperError::Other(_)));
    assert_eq!(orchestrator.get_session_status(session_id).unwrap().state, MapperState::Failed);
}

#[tokio::test]
async fn budget_exceeded_during_analysis_ends_the_session_with_a_distinct_error_code() {
    let (orchestrator, session_id, _company_id) = setup(OneStepProvider, 1.0, 1.0);

    orchestrator.start_login_phase(session_id, &[]).await.unwrap();
    orchestrator.start_navigation_phase(session_id, &[]).await.unwrap();
    orchestrator.handle_dom_extraction_result(session_id, "dom-hash".to_string()).unwrap();

    let err = orchestrator.run_analysis(session_id, "<html></html>", None).await.unwrap_err();
    assert!(matches!(err, MapperError::BudgetExceeded));

    // A budget cutoff mid-session ends in `failed` with a distinct,
    // actionable error code, not a bare error with the session left
    // dangling in its prior state (spec §7, §8 scenario 3).
    let record = orchestrator.get_session_status(session_id).unwrap();
    assert_eq!(record.state, MapperState::Failed);
    assert_eq!(record.error_code.as_deref(), Some("BUDGET_EXCEEDED"));
}

#[tokio::test]
async fn expired_trial_during_analysis_surfaces_a_distinct_code_from_budget_exceeded() {
    let store = Arc::new(MemoryStore::new());
    let company_id = CompanyId(Uuid::new_v4());
    let product_id = ProductId(1);
    store.seed_company(Company {
        id: company_id,
        access_model: AccessModel::EarlyAccess,
        access_status: AccessStatus::Active,
        daily_ai_budget: 1000.0,
        ai_used_today: 0.0,
        last_usage_reset_date: chrono::Utc::now(),
        trial_start_date: Some(chrono::Utc::now() - chrono::Duration::days(30)),
        trial_days_total: Some(14),
    });
    store.seed_subscription(Subscription {
        company_id,
        product_id,
        monthly_claude_budget: 1000.0,
        claude_used_this_month: 0.0,
        budget_reset_date: chrono::Utc::now() + chrono::Duration::days(10),
        customer_claude_api_key: None,
    });

    let budget = Arc::new(BudgetGate::new(store.clone()));
    let ai = Arc::new(AiBroker::new(OneStepProvider));
    let bus = Arc::new(TaskBus::new(store.clone(), b"test-secret".to_vec()));
    let orchestrator = MapperOrchestrator::new(budget, ai, bus);

    let session_id = CrawlSessionId(Uuid::new_v4());
    orchestrator.start_session(
        session_id,
        UserId(Uuid::new_v4()),
        company_id,
        product_id,
        NetworkId(Uuid::new_v4()),
        FormRouteId(Uuid::new_v4()),
        MapperConfig::default(),
    );

    orchestrator.start_login_phase(session_id, &[]).await.unwrap();
    orchestrator.start_navigation_phase(session_id, &[]).await.unwrap();
    orchestrator.handle_dom_extraction_result(session_id, "dom-hash".to_string()).unwrap();

    let err = orchestrator.run_analysis(session_id, "<html></html>", None).await.unwrap_err();
    assert!(matches!(
        err,
        MapperError::AccessDenied(form_mapper_control_plane::budget::AccessDeniedCode::TrialExpired)
    ));

    let record = orchestrator.get_session_status(session_id).unwrap();
    assert_eq!(record.state, MapperState::Failed);
    assert_eq!(record.error_code.as_deref(), Some("TRIAL_EXPIRED"));
}

#[test]
fn step_click_helper_produces_a_click_action() {
    let step = Step::click("#btn", "/html/body/button");
    assert_eq!(step.action, StepAction::Click);
    assert_eq!(step.full_xpath.as_deref(), Some("/html/body/button"));
}
