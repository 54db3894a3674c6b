//! Mapper Orchestrator (C5): the server-side state machine driving one
//! form-mapping session end to end.
//!
//! See spec §4.5. Grounded in `form_mapper_orchestrator.py` for phase
//! semantics and in the teacher's `mcp::registry` for the session
//! registry pattern.

mod config;
mod orchestrator;
mod session;
mod state;

pub use config::MapperConfig;
pub use orchestrator::{MapperError, MapperOrchestrator};
pub use session::{MapperSessionRecord, RecoveryAttempt, DOM_BUFFER_TTL_HOURS, SESSION_TTL_HOURS};
pub use state::{MapperState, SessionStatus};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::ai_broker::{AiBroker, AiError, AiProvider};
    use crate::budget::BudgetGate;
    use crate::domain::{
        AccessModel, AccessStatus, Company, CompanyId, CrawlSessionId, FormRouteId, NetworkId,
        ProductId, Subscription, UserId,
    };
    use crate::store::MemoryStore;
    use crate::task_bus::TaskBus;

    struct StubProvider;

    #[async_trait]
    impl AiProvider for StubProvider {
        async fn complete(&self, _prompt: &str, _screenshot: Option<&str>) -> Result<(String, u64, u64), AiError> {
            Ok(("{\"steps\": [], \"no_more_paths\": true}".to_string(), 1, 1))
        }
    }

    fn setup() -> (
        MapperOrchestrator<MemoryStore, StubProvider>,
        CrawlSessionId,
    ) {
        let store = Arc::new(MemoryStore::new());
        let company_id = CompanyId(Uuid::new_v4());
        let product_id = ProductId(1);
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
            monthly_claude_budget: 1000.0,
            claude_used_this_month: 0.0,
            budget_reset_date: chrono::Utc::now() + chrono::Duration::days(10),
            customer_claude_api_key: None,
        });

        let budget = Arc::new(BudgetGate::new(store.clone()));
        let ai = Arc::new(AiBroker::new(StubProvider));
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
        (orchestrator, session_id)
    }

    #[test]
    fn empty_login_stages_skip_straight_to_navigating() {
        let (orchestrator, session_id) = setup();
        let state = tokio_test_block_on(orchestrator.start_login_phase(session_id, &[]));
        assert_eq!(state.unwrap(), MapperState::Navigating);
    }

    #[test]
    fn cancel_is_idempotent_on_terminal_session() {
        let (orchestrator, session_id) = setup();
        let first = orchestrator.cancel_session(session_id).unwrap();
        let second = orchestrator.cancel_session(session_id).unwrap();
        assert_eq!(first, MapperState::Cancelled);
        assert_eq!(second, MapperState::Cancelled);
    }

    #[test]
    fn state_conflict_on_wrong_expected_state() {
        let (orchestrator, session_id) = setup();
        tokio_test_block_on(orchestrator.start_login_phase(session_id, &[])).unwrap();
        let err = tokio_test_block_on(orchestrator.start_login_phase(session_id, &[]));
        assert!(err.is_err());
    }

    /// Minimal same-thread block_on so these tests don't need a full
    /// `#[tokio::test]` runtime for pure state-machine checks.
    fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }
}
