//! Wire DTOs for the agent<->server protocol (spec §6.1) and the
//! crawl-session REST surface (spec §6.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    AgentStatus, CompanyId, CrawlSessionId, NetworkId, ProductId, ProjectId, TaskId, TaskStatus,
    TaskType, UserId,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRequestDto {
    pub agent_id: String,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub hostname: String,
    pub platform: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponseDto {
    pub api_key: String,
    pub jwt: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponseDto {
    pub jwt: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequestDto {
    pub agent_id: String,
    pub status: AgentStatus,
    pub current_task_id: Option<TaskId>,
    pub current_crawl_session_id: Option<CrawlSessionId>,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponseDto {
    pub cancel_requested: bool,
}

#[derive(Debug, Deserialize)]
pub struct PollTaskQuery {
    pub agent_id: String,
    pub company_id: CompanyId,
}

#[derive(Debug, Serialize)]
pub struct TaskDto {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
pub struct ReportTaskStatusRequestDto {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: Option<String>,
    pub result: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ReportFormMapperResultRequestDto {
    pub session_id: CrawlSessionId,
    pub task_type: String,
    pub success: bool,
    pub payload: Value,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportFormMapperResultResponseDto {
    pub next_action: String,
}

/// Shared envelope for every `POST /api/form-pages/ai/{op}` callback
/// (spec §6.1).
#[derive(Debug, Deserialize)]
pub struct FormPagesAiRequestDto {
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub crawl_session_id: Option<CrawlSessionId>,
    #[serde(flatten)]
    pub fields: Value,
}

#[derive(Debug, Serialize)]
pub struct LocateResponseDto {
    pub crawl_session_id: CrawlSessionId,
    pub task_id: TaskId,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LocateRequestDto {
    pub product_id: ProductId,
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    #[serde(default)]
    pub network_id_override: Option<NetworkId>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponseDto {
    pub session: SessionSummaryDto,
    pub forms: Vec<crate::domain::FormPageRoute>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummaryDto {
    pub status: String,
    pub pages_crawled: u32,
    pub forms_found: u32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponseDto {
    pub status: String,
}
