use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CompanyId, TaskId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Transitions are monotone except `pending -> cancelled`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use TaskStatus::{Cancelled, Completed, Failed, Pending, Running};
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Closed sum of recognized task types (spec §9: "accept an unknown
/// `task_type` as an explicit unhandled response, not a silent failure").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskType {
    DiscoverFormPages,
    ExecuteTest,
    ExecuteSteps,
    FormMapperLogin,
    FormMapperNavigate,
    FormMapperExtractDom,
    FormMapperExecuteStep,
    FormMapperMap,
    FormsRunnerReplay,
    /// Any task_type string not recognized above; carried verbatim so the
    /// agent can report it back as an explicit unhandled response.
    Unhandled(String),
}

impl TaskType {
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "discover_form_pages" => Self::DiscoverFormPages,
            "execute_test" => Self::ExecuteTest,
            "execute_steps" => Self::ExecuteSteps,
            "form_mapper_login" => Self::FormMapperLogin,
            "form_mapper_navigate" => Self::FormMapperNavigate,
            "form_mapper_extract_dom" => Self::FormMapperExtractDom,
            "form_mapper_execute_step" => Self::FormMapperExecuteStep,
            "form_mapper_map" => Self::FormMapperMap,
            "forms_runner_replay" => Self::FormsRunnerReplay,
            other => Self::Unhandled(other.to_string()),
        }
    }
}

/// Server-owned unit of dispatchable work on a per-user FIFO queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: TaskId,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub task_type: TaskType,
    pub parameters: Value,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}
