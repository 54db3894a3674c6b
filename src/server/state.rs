use std::sync::Arc;

use crate::ai_broker::AiBroker;
use crate::budget::BudgetGate;
use crate::mapper::MapperOrchestrator;
use crate::store::MemoryStore;
use crate::task_bus::TaskBus;

use super::provider::ReqwestAiProvider;

/// Concrete store and provider choices for this deployment. The traits in
/// `crate::store`/`crate::ai_broker` stay generic; this is where the
/// generic seams get nailed down to real types for the HTTP surface
/// (spec §1 names both as out-of-scope concrete technologies).
pub type Store = MemoryStore;
pub type Provider = ReqwestAiProvider;

pub struct AppStateInner {
    pub store: Arc<Store>,
    pub budget: Arc<BudgetGate<Store>>,
    pub ai: Arc<AiBroker<Provider>>,
    pub bus: Arc<TaskBus<Store>>,
    pub mapper: Arc<MapperOrchestrator<Store, Provider>>,
}

/// Axum `State` extractor target; cloning only bumps the inner `Arc`s.
pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    #[must_use]
    pub fn new(store: Arc<Store>, provider: Provider, jwt_secret: impl Into<Vec<u8>>) -> Self {
        let budget = Arc::new(BudgetGate::new(store.clone()));
        let ai = Arc::new(AiBroker::new(provider));
        let bus = Arc::new(TaskBus::new(store.clone(), jwt_secret));
        let mapper = Arc::new(MapperOrchestrator::new(budget.clone(), ai.clone(), bus.clone()));
        Self {
            store,
            budget,
            ai,
            bus,
            mapper,
        }
    }
}
