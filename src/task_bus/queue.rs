//! Per-user FIFO task queue with long-poll dispatch (spec §4.3).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::domain::{AgentTask, UserId};
use crate::store::TaskStore;

/// Server-side long-poll cap (spec §5 Timeouts).
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Notifies a user's waiting `PollTask` handler when a task is enqueued.
/// The actual FIFO storage lives in the `TaskStore`; this only provides
/// the wakeup so pushes don't need to be polled.
#[derive(Default)]
pub struct PollNotifiers {
    notifiers: DashMap<UserId, Arc<Notify>>,
}

impl PollNotifiers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier_for(&self, user_id: UserId) -> Arc<Notify> {
        self.notifiers.entry(user_id).or_insert_with(|| Arc::new(Notify::new())).clone()
    }

    pub fn notify_pushed(&self, user_id: UserId) {
        self.notifier_for(user_id).notify_waiters();
    }

    /// Long-polls the store's queue for `user_id` up to `LONG_POLL_TIMEOUT`,
    /// returning `None` on an empty queue once the timeout elapses (spec
    /// §4.3, §8 "Long-poll with empty queue for 30s returns 204 without
    /// consuming tasks").
    pub async fn poll<S: TaskStore>(&self, store: &S, user_id: UserId) -> anyhow::Result<Option<AgentTask>> {
        if let Some(task) = store.pop_next(user_id).await? {
            return Ok(Some(task));
        }

        let notify = self.notifier_for(user_id);
        let woke = timeout(LONG_POLL_TIMEOUT, notify.notified()).await.is_ok();
        if !woke {
            return Ok(None);
        }
        store.pop_next(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentTask, CompanyId, TaskId, TaskStatus, TaskType};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn poll_wakes_on_push_without_waiting_full_timeout() {
        let store = Arc::new(MemoryStore::new());
        let notifiers = Arc::new(PollNotifiers::new());
        let user_id = UserId(uuid::Uuid::new_v4());

        let poll_store = store.clone();
        let poll_notifiers = notifiers.clone();
        let handle = tokio::spawn(async move { poll_notifiers.poll(&*poll_store, user_id).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let task = AgentTask {
            task_id: TaskId(uuid::Uuid::new_v4()),
            company_id: CompanyId(uuid::Uuid::new_v4()),
            user_id,
            task_type: TaskType::DiscoverFormPages,
            parameters: serde_json::json!({}),
            status: TaskStatus::Pending,
            result: None,
            error: None,
        };
        store.enqueue(task.clone()).await.unwrap();
        notifiers.notify_pushed(user_id);

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poll should wake promptly")
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap().task_id, task.task_id);
    }
}
