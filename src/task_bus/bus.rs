//! The complete Agent<->Server surface (spec §4.3).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;

use crate::domain::{Agent, AgentStatus, AgentTask, CompanyId, TaskId, TaskStatus, UserId};
use crate::store::{AgentStore, TaskStore};

use super::auth::AuthRegistry;
use super::errors::TaskBusError;
use super::queue::PollNotifiers;

pub struct RegisterRequest {
    pub agent_id: String,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub hostname: String,
    pub platform: String,
    pub version: String,
}

pub struct RegisterResponse {
    pub api_key: String,
    pub jwt: String,
    pub expires_in: i64,
}

/// Ties the auth lifecycle, the per-user queue, and a DB-flag
/// cancellation set together (spec §4.3 "Cancellation is a DB flag read
/// by the next heartbeat").
pub struct TaskBus<S: AgentStore + TaskStore> {
    store: Arc<S>,
    auth: AuthRegistry,
    notifiers: PollNotifiers,
    cancel_flags: DashSet<UserId>,
}

impl<S: AgentStore + TaskStore> TaskBus<S> {
    pub fn new(store: Arc<S>, jwt_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            store,
            auth: AuthRegistry::new(jwt_secret),
            notifiers: PollNotifiers::new(),
            cancel_flags: DashSet::new(),
        }
    }

    pub fn provision_legacy_token(&self, user_id: UserId, token: impl Into<String>) {
        self.auth.provision_legacy_token(user_id, token);
    }

    pub async fn register(&self, req: RegisterRequest, legacy_token: &str) -> Result<RegisterResponse, TaskBusError> {
        let (api_key, jwt, expires_in) = self.auth.register(req.user_id, legacy_token)?;
        self.store
            .upsert(Agent {
                agent_id: req.agent_id,
                user_id: req.user_id,
                company_id: req.company_id,
                api_key: api_key.clone(),
                last_heartbeat: Utc::now(),
                status: AgentStatus::Idle,
                current_task_id: None,
                current_crawl_session_id: None,
            })
            .await?;
        Ok(RegisterResponse {
            api_key,
            jwt,
            expires_in,
        })
    }

    pub fn refresh_token(&self, user_id: UserId, api_key: &str) -> Result<(String, i64), TaskBusError> {
        self.auth.refresh(user_id, api_key)
    }

    /// Validates a bearer JWT presented on the form-page AI callback
    /// routes (spec §6.1), returning the user it was minted for.
    pub fn verify_jwt(&self, token: &str) -> Result<UserId, TaskBusError> {
        self.auth.verify_jwt(token)
    }

    /// Returns `cancel_requested`; the flag stays set across repeated
    /// heartbeats until `report_task_status` reports the task
    /// `cancelled`, so a slow agent doesn't miss it between polls.
    pub async fn heartbeat(
        &self,
        user_id: UserId,
        api_key: &str,
        status: AgentStatus,
    ) -> Result<bool, TaskBusError> {
        self.auth.verify_api_key(user_id, api_key)?;
        self.store.touch_heartbeat(user_id, status).await?;
        Ok(self.cancel_flags.contains(&user_id))
    }

    pub async fn poll_task(&self, user_id: UserId, api_key: &str) -> Result<Option<AgentTask>, TaskBusError> {
        self.auth.verify_api_key(user_id, api_key)?;
        Ok(self.notifiers.poll(&*self.store, user_id).await?)
    }

    pub async fn enqueue(&self, task: AgentTask) -> Result<(), TaskBusError> {
        let user_id = task.user_id;
        self.store.enqueue(task).await?;
        self.notifiers.notify_pushed(user_id);
        Ok(())
    }

    /// A task reported `failed` is never re-enqueued automatically (spec
    /// §8 idempotence). Reporting a task `cancelled` clears the user's
    /// cancel flag: the agent has now acted on it, so a later heartbeat
    /// for a *different* task must not see a stale `cancel_requested`.
    pub async fn report_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<(), TaskBusError> {
        if status == TaskStatus::Cancelled {
            if let Some(task) = self.store.get(task_id).await? {
                self.clear_cancel(task.user_id);
            }
        }
        self.store.update_status(task_id, status, result, error).await?;
        Ok(())
    }

    /// Sets the DB cancellation flag the next heartbeat will surface.
    /// Idempotent: a second cancel on an already-flagged user is a no-op.
    pub fn request_cancel(&self, user_id: UserId) {
        self.cancel_flags.insert(user_id);
    }

    pub fn clear_cancel(&self, user_id: UserId) {
        self.cancel_flags.remove(&user_id);
    }

    pub fn is_cancel_requested(&self, user_id: UserId) -> bool {
        self.cancel_flags.contains(&user_id)
    }
}
