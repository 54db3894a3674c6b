use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompanyId, NetworkId, ProductId, ProjectId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlSessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlSessionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Server-owned crawl session, driven by agent progress reports and
/// finalized on completion or agent disconnect (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSessionRecord {
    pub id: super::CrawlSessionId,
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub project_id: ProjectId,
    pub network_id: NetworkId,
    pub user_id: UserId,
    pub status: CrawlSessionStatus,
    pub pages_crawled: u32,
    pub forms_found: u32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlSessionRecord {
    /// Transition to a terminal failure, stamping `completed_at`.
    pub fn fail(&mut self, code: impl Into<String>, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = CrawlSessionStatus::Failed;
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = CrawlSessionStatus::Completed;
        self.completed_at = Some(now);
    }

    /// Cancellation is settable at any non-terminal state (spec §3).
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = CrawlSessionStatus::Cancelled;
        self.error_code = Some("USER_CANCELLED".to_string());
        self.completed_at = Some(now);
        true
    }
}
