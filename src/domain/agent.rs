use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompanyId, CrawlSessionId, TaskId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    /// Inferred, never stored: `now - last_heartbeat > 60s`.
    Disconnected,
}

/// Server-owned record of a registered crawl Agent. One per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub user_id: UserId,
    pub company_id: CompanyId,
    /// The single currently-valid api_key for this user. Re-registration
    /// replaces it, invalidating whatever value was here before.
    pub api_key: String,
    pub last_heartbeat: DateTime<Utc>,
    pub status: AgentStatus,
    pub current_task_id: Option<TaskId>,
    pub current_crawl_session_id: Option<CrawlSessionId>,
}

/// Heartbeat timeout per spec §4.3.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 60;

impl Agent {
    #[must_use]
    pub fn is_disconnected(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_heartbeat)
            > chrono::Duration::seconds(HEARTBEAT_TIMEOUT_SECS)
    }
}
