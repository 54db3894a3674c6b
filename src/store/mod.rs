//! Persistence seam.
//!
//! spec §1 explicitly puts "the concrete persistent store and cache
//! technology" out of scope, assuming only "any transactional
//! row-locking store plus any in-memory key-value cache with atomic
//! counters and TTLs." These traits are that assumption made concrete;
//! `memory` is the one in-process implementation this repo ships, modeled
//! on the teacher's trait-plus-swappable-impl split for `CrawlEventBus`.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::domain::{
    Agent, AgentTask, Company, CompanyId, CrawlSessionId, CrawlSessionRecord, FormPageRoute,
    FormRouteId, Network, NetworkId, ProductId, ProjectFormHierarchy, ProjectId, Subscription,
    TaskId, UserId,
};

/// Row-locked read-modify-write access to Company/Subscription budget
/// fields. A real implementation would take a database row lock for the
/// duration of the closure; `MemoryStore` uses a per-key async mutex.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn get_company(&self, id: CompanyId) -> anyhow::Result<Option<Company>>;
    async fn get_subscription(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> anyhow::Result<Option<Subscription>>;

    /// Runs `f` with exclusive access to the subscription row, persisting
    /// whatever mutation `f` makes before releasing the lock.
    async fn with_subscription_lock(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        f: Box<dyn FnOnce(&mut Subscription) + Send>,
    ) -> anyhow::Result<Subscription>;

    async fn with_company_lock(
        &self,
        company_id: CompanyId,
        f: Box<dyn FnOnce(&mut Company) + Send>,
    ) -> anyhow::Result<Company>;

    async fn record_usage(&self, usage: crate::domain::ApiUsage) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_by_user(&self, user_id: UserId) -> anyhow::Result<Option<Agent>>;
    async fn upsert(&self, agent: Agent) -> anyhow::Result<()>;
    async fn touch_heartbeat(
        &self,
        user_id: UserId,
        status: crate::domain::AgentStatus,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn enqueue(&self, task: AgentTask) -> anyhow::Result<()>;
    async fn pop_next(&self, user_id: UserId) -> anyhow::Result<Option<AgentTask>>;
    async fn update_status(
        &self,
        task_id: TaskId,
        status: crate::domain::TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> anyhow::Result<()>;
    async fn get(&self, task_id: TaskId) -> anyhow::Result<Option<AgentTask>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: CrawlSessionRecord) -> anyhow::Result<()>;
    async fn get(&self, id: CrawlSessionId) -> anyhow::Result<Option<CrawlSessionRecord>>;
    async fn update(&self, session: CrawlSessionRecord) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn insert(&self, route: FormPageRoute) -> anyhow::Result<()>;
    async fn get(&self, id: FormRouteId) -> anyhow::Result<Option<FormPageRoute>>;
    async fn list_for_project(&self, project_id: ProjectId) -> anyhow::Result<Vec<FormPageRoute>>;
    /// Whether `(project_id, normalized_url)` is already taken (spec §3,
    /// §8 uniqueness invariant).
    async fn url_exists(&self, project_id: ProjectId, normalized_url: &str) -> anyhow::Result<bool>;
}

/// `Network` is out-of-scope CRUD (spec §1); only the shape the Mapper
/// Orchestrator reads (`login_stages`/`logout_stages`) matters here.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    async fn get_network(&self, id: NetworkId) -> anyhow::Result<Option<Network>>;
    async fn upsert_network(&self, network: Network) -> anyhow::Result<()>;
}

/// Rebuilt atomically after each crawl completes (spec §3
/// `ProjectFormHierarchy`).
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn replace_hierarchy(
        &self,
        project_id: ProjectId,
        forest: Vec<ProjectFormHierarchy>,
    ) -> anyhow::Result<()>;
    async fn get_hierarchy(&self, project_id: ProjectId) -> anyhow::Result<Vec<ProjectFormHierarchy>>;
}
