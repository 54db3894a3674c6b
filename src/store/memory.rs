use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::domain::{
    Agent, AgentTask, Company, CompanyId, CrawlSessionId, CrawlSessionRecord, FormPageRoute,
    FormRouteId, Network, NetworkId, ProductId, ProjectFormHierarchy, ProjectId, Subscription,
    TaskId, TaskStatus, UserId,
};

use super::{AgentStore, BudgetStore, HierarchyStore, NetworkStore, RouteStore, SessionStore, TaskStore};

/// Single in-process store backing every trait in this module, deliberately
/// simple: a transactional store and TTL cache are named out of scope by
/// the spec as concrete technologies, so this exists only to give the
/// control plane something real to run against in this repo and in tests.
#[derive(Default)]
pub struct MemoryStore {
    companies: DashMap<CompanyId, Company>,
    subscriptions: DashMap<(CompanyId, ProductId), Subscription>,
    subscription_locks: DashMap<(CompanyId, ProductId), std::sync::Arc<Mutex<()>>>,
    company_locks: DashMap<CompanyId, std::sync::Arc<Mutex<()>>>,
    usage: Mutex<Vec<crate::domain::ApiUsage>>,
    agents: DashMap<UserId, Agent>,
    queues: DashMap<UserId, Mutex<VecDeque<AgentTask>>>,
    tasks: DashMap<TaskId, AgentTask>,
    sessions: DashMap<CrawlSessionId, CrawlSessionRecord>,
    routes: DashMap<FormRouteId, FormPageRoute>,
    networks: DashMap<NetworkId, Network>,
    hierarchies: DashMap<ProjectId, Vec<ProjectFormHierarchy>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn subscription_lock(&self, key: (CompanyId, ProductId)) -> std::sync::Arc<Mutex<()>> {
        self.subscription_locks
            .entry(key)
            .or_insert_with(|| std::sync::Arc::new(Mutex::new(())))
            .clone()
    }

    fn company_lock(&self, key: CompanyId) -> std::sync::Arc<Mutex<()>> {
        self.company_locks
            .entry(key)
            .or_insert_with(|| std::sync::Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn seed_company(&self, company: Company) {
        self.companies.insert(company.id, company);
    }

    pub fn seed_subscription(&self, sub: Subscription) {
        self.subscriptions
            .insert((sub.company_id, sub.product_id), sub);
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn get_company(&self, id: CompanyId) -> anyhow::Result<Option<Company>> {
        Ok(self.companies.get(&id).map(|e| e.clone()))
    }

    async fn get_subscription(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> anyhow::Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .get(&(company_id, product_id))
            .map(|e| e.clone()))
    }

    async fn with_subscription_lock(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        f: Box<dyn FnOnce(&mut Subscription) + Send>,
    ) -> anyhow::Result<Subscription> {
        let lock = self.subscription_lock((company_id, product_id));
        let _guard = lock.lock().await;
        let mut entry = self
            .subscriptions
            .get_mut(&(company_id, product_id))
            .ok_or_else(|| anyhow::anyhow!("no subscription for {company_id:?}/{product_id:?}"))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    async fn with_company_lock(
        &self,
        company_id: CompanyId,
        f: Box<dyn FnOnce(&mut Company) + Send>,
    ) -> anyhow::Result<Company> {
        let lock = self.company_lock(company_id);
        let _guard = lock.lock().await;
        let mut entry = self
            .companies
            .get_mut(&company_id)
            .ok_or_else(|| anyhow::anyhow!("no company {company_id:?}"))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    async fn record_usage(&self, usage: crate::domain::ApiUsage) -> anyhow::Result<()> {
        self.usage.lock().await.push(usage);
        Ok(())
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn get_by_user(&self, user_id: UserId) -> anyhow::Result<Option<Agent>> {
        Ok(self.agents.get(&user_id).map(|e| e.clone()))
    }

    async fn upsert(&self, agent: Agent) -> anyhow::Result<()> {
        self.agents.insert(agent.user_id, agent);
        Ok(())
    }

    async fn touch_heartbeat(
        &self,
        user_id: UserId,
        status: crate::domain::AgentStatus,
    ) -> anyhow::Result<()> {
        if let Some(mut agent) = self.agents.get_mut(&user_id) {
            agent.last_heartbeat = chrono::Utc::now();
            agent.status = status;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn enqueue(&self, task: AgentTask) -> anyhow::Result<()> {
        self.tasks.insert(task.task_id, task.clone());
        let queue = self
            .queues
            .entry(task.user_id)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        queue.lock().await.push_back(task);
        Ok(())
    }

    async fn pop_next(&self, user_id: UserId) -> anyhow::Result<Option<AgentTask>> {
        let Some(queue) = self.queues.get(&user_id) else {
            return Ok(None);
        };
        Ok(queue.lock().await.pop_front())
    }

    async fn update_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(mut task) = self.tasks.get_mut(&task_id) {
            task.status = status;
            task.result = result;
            task.error = error;
        }
        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> anyhow::Result<Option<AgentTask>> {
        Ok(self.tasks.get(&task_id).map(|e| e.clone()))
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: CrawlSessionRecord) -> anyhow::Result<()> {
        self.sessions.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, id: CrawlSessionId) -> anyhow::Result<Option<CrawlSessionRecord>> {
        Ok(self.sessions.get(&id).map(|e| e.clone()))
    }

    async fn update(&self, session: CrawlSessionRecord) -> anyhow::Result<()> {
        self.sessions.insert(session.id, session);
        Ok(())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn insert(&self, route: FormPageRoute) -> anyhow::Result<()> {
        self.routes.insert(route.id, route);
        Ok(())
    }

    async fn get(&self, id: FormRouteId) -> anyhow::Result<Option<FormPageRoute>> {
        Ok(self.routes.get(&id).map(|e| e.clone()))
    }

    async fn list_for_project(&self, project_id: ProjectId) -> anyhow::Result<Vec<FormPageRoute>> {
        Ok(self
            .routes
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn url_exists(&self, project_id: ProjectId, normalized_url: &str) -> anyhow::Result<bool> {
        Ok(self.routes.iter().any(|e| {
            e.project_id == project_id && FormPageRoute::normalize_url(&e.url) == normalized_url
        }))
    }
}

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn get_network(&self, id: NetworkId) -> anyhow::Result<Option<Network>> {
        Ok(self.networks.get(&id).map(|e| e.clone()))
    }

    async fn upsert_network(&self, network: Network) -> anyhow::Result<()> {
        self.networks.insert(network.id, network);
        Ok(())
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    async fn replace_hierarchy(
        &self,
        project_id: ProjectId,
        forest: Vec<ProjectFormHierarchy>,
    ) -> anyhow::Result<()> {
        self.hierarchies.insert(project_id, forest);
        Ok(())
    }

    async fn get_hierarchy(&self, project_id: ProjectId) -> anyhow::Result<Vec<ProjectFormHierarchy>> {
        Ok(self.hierarchies.get(&project_id).map(|e| e.clone()).unwrap_or_default())
    }
}
