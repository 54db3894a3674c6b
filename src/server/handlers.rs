//! HTTP handlers for the agent<->server protocol (spec §6.1) and the
//! crawl-session REST surface (spec §6.2). Grounded in the teacher's
//! axum-handler-per-route layout, adapted from `pawz-code/server`'s
//! `State<AppState>` extractor pattern.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    self, AgentTask, CrawlSessionId, CrawlSessionRecord, CrawlSessionStatus, FormRouteId,
    NetworkId, OperationType, TaskId, TaskStatus, TaskType, UserId,
};
use crate::mapper::{MapperConfig, MapperState};
use crate::store::{AgentStore, HierarchyStore, NetworkStore, RouteStore, SessionStore};

use super::dto::{
    CancelResponseDto, FormPagesAiRequestDto, HeartbeatRequestDto, HeartbeatResponseDto,
    LocateRequestDto, LocateResponseDto, PollTaskQuery, RefreshTokenResponseDto,
    RegisterRequestDto, RegisterResponseDto, ReportFormMapperResultRequestDto,
    ReportFormMapperResultResponseDto, ReportTaskStatusRequestDto, SessionStatusResponseDto,
    SessionSummaryDto, TaskDto,
};
use super::errors::AppError;
use super::state::AppState;

fn api_key(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get("x-agent-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing X-Agent-API-Key header".to_string()))
}

fn bearer_jwt(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::BadRequest("missing bearer token".to_string()))
}

fn legacy_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get("x-legacy-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing X-Legacy-Token header".to_string()))
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequestDto>,
) -> Result<Json<RegisterResponseDto>, AppError> {
    let legacy = legacy_token(&headers)?;
    let response = state
        .bus
        .register(
            crate::task_bus::RegisterRequest {
                agent_id: body.agent_id,
                company_id: body.company_id,
                user_id: body.user_id,
                hostname: body.hostname,
                platform: body.platform,
                version: body.version,
            },
            legacy,
        )
        .await?;
    Ok(Json(RegisterResponseDto {
        api_key: response.api_key,
        jwt: response.jwt,
        expires_in: response.expires_in,
    }))
}

#[derive(Debug, serde::Deserialize)]
pub struct RefreshTokenQuery {
    pub user_id: UserId,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Query(query): Query<RefreshTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<RefreshTokenResponseDto>, AppError> {
    let key = api_key(&headers)?;
    let (jwt, expires_in) = state.bus.refresh_token(query.user_id, key)?;
    Ok(Json(RefreshTokenResponseDto { jwt, expires_in }))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatRequestDto>,
) -> Result<Json<HeartbeatResponseDto>, AppError> {
    let key = api_key(&headers)?;
    let user_id = body_user_id(&body)?;
    let cancel_requested = state.bus.heartbeat(user_id, key, body.status).await?;
    Ok(Json(HeartbeatResponseDto { cancel_requested }))
}

/// The wire heartbeat doesn't carry a typed `user_id` field separately
/// from `agent_id`; this deployment parses `agent_id` as the `UserId` it
/// was registered under (spec §4.3: "keyed by user_id").
fn body_user_id(body: &HeartbeatRequestDto) -> Result<UserId, AppError> {
    Uuid::parse_str(&body.agent_id)
        .map(UserId)
        .map_err(|_| AppError::BadRequest("agent_id must be a user_id".to_string()))
}

pub async fn poll_task(
    State(state): State<AppState>,
    Query(query): Query<PollTaskQuery>,
    headers: HeaderMap,
) -> Result<Json<Option<TaskDto>>, AppError> {
    let key = api_key(&headers)?;
    let user_id = Uuid::parse_str(&query.agent_id)
        .map(UserId)
        .map_err(|_| AppError::BadRequest("agent_id must be a user_id".to_string()))?;
    let task = state.bus.poll_task(user_id, key).await?;
    Ok(Json(task.map(|t| TaskDto {
        task_id: t.task_id,
        task_type: t.task_type,
        company_id: t.company_id,
        user_id: t.user_id,
        parameters: t.parameters,
    })))
}

pub async fn report_task_status(
    State(state): State<AppState>,
    Json(body): Json<ReportTaskStatusRequestDto>,
) -> Result<Json<()>, AppError> {
    state
        .bus
        .report_task_status(body.task_id, body.status, body.result, body.error)
        .await?;
    Ok(Json(()))
}

/// Dispatches one agent report to the matching C5 phase handler and chains
/// through every AI-only phase that follows without another agent round
/// trip, until either the next phase requires new agent work or the
/// session reaches a terminal state (spec §4.5's full per-phase loop,
/// `navigating -> extracting_dom -> analyzing -> executing_step ->
/// handling_alert -> verifying_ui -> path_complete -> ... ->
/// assigning_test_cases -> completed`).
pub async fn report_form_mapper_result(
    State(state): State<AppState>,
    Json(body): Json<ReportFormMapperResultRequestDto>,
) -> Result<Json<ReportFormMapperResultResponseDto>, AppError> {
    let dom = body.payload.get("dom").and_then(|v| v.as_str()).unwrap_or_default();
    let screenshot = body.payload.get("screenshot").and_then(|v| v.as_str());

    let phase = match body.task_type.as_str() {
        "form_mapper_login" => {
            let username = body.payload.get("username").and_then(|v| v.as_str()).unwrap_or_default();
            let password = body.payload.get("password").and_then(|v| v.as_str()).unwrap_or_default();
            let credentials = crate::ai_broker::Credentials {
                username: username.to_string(),
                password: password.to_string(),
            };
            let dom_opt = body.payload.get("dom").and_then(|v| v.as_str());
            let mut phase = state
                .mapper
                .handle_login_phase_complete(body.session_id, body.success, &credentials, dom_opt, screenshot)
                .await?;
            if phase == MapperState::Navigating {
                let navigation_steps: Vec<crate::domain::Step> = serde_json::from_value(
                    body.payload.get("navigation_steps").cloned().unwrap_or_default(),
                )
                .unwrap_or_default();
                phase = state.mapper.start_navigation_phase(body.session_id, &navigation_steps).await?;
            }
            phase
        }
        "form_mapper_navigate" => state.mapper.handle_navigation_phase_complete(body.session_id, body.success).await?,
        "form_mapper_extract_dom" => {
            let dom_hash = body.payload.get("dom_hash").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            state.mapper.handle_dom_extraction_result(body.session_id, dom_hash)?;
            state.mapper.run_analysis(body.session_id, dom, screenshot).await?
        }
        "form_mapper_execute_step" => {
            let alert_detected = body.payload.get("alert_detected").and_then(|v| v.as_bool()).unwrap_or(false);
            let mut phase = state
                .mapper
                .handle_step_result(body.session_id, body.success, alert_detected, dom, screenshot)
                .await?;
            if phase == MapperState::HandlingAlert {
                let error_info = body.payload.get("error_info").and_then(|v| v.as_str()).unwrap_or("alert detected");
                phase = state.mapper.handle_alert(body.session_id, error_info, dom, screenshot).await?;
            }
            phase
        }
        _ if !body.success => {
            return Ok(Json(ReportFormMapperResultResponseDto {
                next_action: "retry".to_string(),
            }));
        }
        _ => {
            return Ok(Json(ReportFormMapperResultResponseDto {
                next_action: "continue".to_string(),
            }));
        }
    };

    let next_action = match phase {
        MapperState::AllPathsComplete => {
            state.mapper.handle_all_paths_complete(body.session_id)?;
            let phase = state.mapper.assign_test_cases(body.session_id).await?;
            if phase == MapperState::Completed {
                finalize_crawl_session(&state, body.session_id).await?;
            }
            "done"
        }
        MapperState::Completed | MapperState::Failed | MapperState::Cancelled => "done",
        _ => "continue",
    };
    Ok(Json(ReportFormMapperResultResponseDto {
        next_action: next_action.to_string(),
    }))
}

/// Marks the `CrawlSessionRecord` completed and rebuilds the project's
/// `ProjectFormHierarchy` forest from its current routes (spec §3, §4.5
/// "Assigning test cases... final result persisted as `final_steps`").
async fn finalize_crawl_session(state: &AppState, session_id: CrawlSessionId) -> Result<(), AppError> {
    let mut session = state
        .store
        .get(session_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::BadRequest("unknown session".to_string()))?;
    let forms = state
        .store
        .list_for_project(session.project_id)
        .await
        .map_err(AppError::Internal)?;
    session.forms_found = forms.len() as u32;
    session.complete(chrono::Utc::now());
    state.store.update(session.clone()).await.map_err(AppError::Internal)?;

    let forest = domain::build_hierarchy(session.project_id, &forms);
    state
        .store
        .replace_hierarchy(session.project_id, forest)
        .await
        .map_err(AppError::Internal)?;
    Ok(())
}

/// `POST /networks/{id}/locate` (spec §6.2): admission-controlled starting
/// point. 400 if no online agent for the user, 402 if budget exceeded.
pub async fn locate(
    State(state): State<AppState>,
    axum::extract::Path(path_network_id): axum::extract::Path<Uuid>,
    Json(body): Json<LocateRequestDto>,
) -> Result<Json<LocateResponseDto>, AppError> {
    let agent = state.store.get_by_user(body.user_id).await.map_err(AppError::Internal)?;
    match agent {
        Some(a) if !a.is_disconnected(Utc::now()) => {}
        _ => return Err(AppError::NoOnlineAgent),
    }
    // No AI call has happened yet, so there's no concrete operation to
    // price; estimate against the first call a session makes once pages
    // start coming back (spec §4.5 `analyzing`: `GenerateFormSteps`).
    state
        .budget
        .check(body.company_id, body.product_id, state.budget.estimate_cost(OperationType::GenerateFormSteps))
        .await?;

    let network_id = body.network_id_override.unwrap_or(NetworkId(path_network_id));
    let session_id = CrawlSessionId(Uuid::new_v4());
    let session = CrawlSessionRecord {
        id: session_id,
        company_id: body.company_id,
        product_id: body.product_id,
        project_id: body.project_id,
        network_id,
        user_id: body.user_id,
        status: CrawlSessionStatus::Pending,
        pages_crawled: 0,
        forms_found: 0,
        error_code: None,
        error_message: None,
        started_at: Utc::now(),
        completed_at: None,
    };
    state.store.create(session).await.map_err(AppError::Internal)?;

    let task_id = TaskId(Uuid::new_v4());
    let task = AgentTask {
        task_id,
        company_id: body.company_id,
        user_id: body.user_id,
        task_type: TaskType::DiscoverFormPages,
        parameters: serde_json::json!({ "crawl_session_id": session_id, "network_id": network_id }),
        status: TaskStatus::Pending,
        result: None,
        error: None,
    };
    state.bus.enqueue(task).await?;

    state.mapper.start_session(
        session_id,
        body.user_id,
        body.company_id,
        body.product_id,
        network_id,
        FormRouteId(Uuid::new_v4()),
        MapperConfig::default(),
    );
    let login_stages = state
        .store
        .get_network(network_id)
        .await
        .map_err(AppError::Internal)?
        .map(|n| n.login_stages)
        .unwrap_or_default();
    state.mapper.start_login_phase(session_id, &login_stages).await?;

    Ok(Json(LocateResponseDto {
        crawl_session_id: session_id,
        task_id,
        status: "pending".to_string(),
    }))
}

pub async fn session_status(
    State(state): State<AppState>,
    axum::extract::Path(session_id): axum::extract::Path<Uuid>,
) -> Result<Json<SessionStatusResponseDto>, AppError> {
    let session_id = CrawlSessionId(session_id);
    let mut session = state
        .store
        .get(session_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::BadRequest("unknown session".to_string()))?;

    // Lazily mark a `running` session failed if its agent's heartbeat has
    // lapsed; no background sweeper required (spec §4.3, §6.2).
    if session.status == CrawlSessionStatus::Running {
        let agent = state.store.get_by_user(session.user_id).await.map_err(AppError::Internal)?;
        let disconnected = match agent {
            Some(a) => a.is_disconnected(Utc::now()),
            None => true,
        };
        if disconnected {
            session.fail("AGENT_DISCONNECTED", "agent heartbeat lapsed", Utc::now());
            state.store.update(session.clone()).await.map_err(AppError::Internal)?;
        }
    }

    let forms = state
        .store
        .list_for_project(session.project_id)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(SessionStatusResponseDto {
        session: SessionSummaryDto {
            status: format!("{:?}", session.status).to_lowercase(),
            pages_crawled: session.pages_crawled,
            forms_found: session.forms_found,
            error_code: session.error_code,
            error_message: session.error_message,
        },
        forms,
    }))
}

pub async fn session_cancel(
    State(state): State<AppState>,
    axum::extract::Path(session_id): axum::extract::Path<Uuid>,
) -> Result<Json<CancelResponseDto>, AppError> {
    let session_id = CrawlSessionId(session_id);
    let mut session = state
        .store
        .get(session_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::BadRequest("unknown session".to_string()))?;

    if session.cancel(Utc::now()) {
        state.store.update(session.clone()).await.map_err(AppError::Internal)?;
        state.bus.request_cancel(session.user_id);
        if let Ok(record) = state.mapper.cancel_session(session_id) {
            let _ = record;
        }
    }
    Ok(Json(CancelResponseDto {
        status: format!("{:?}", session.status).to_lowercase(),
    }))
}

/// `POST /api/form-pages/ai/{op}` (spec §6.1): the budget-gated callback
/// surface the agent's crawl engine drives instead of talking to the AI
/// broker directly.
pub async fn form_pages_ai_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::extract::Path(op): axum::extract::Path<String>,
    Json(body): Json<FormPagesAiRequestDto>,
) -> Result<Json<serde_json::Value>, AppError> {
    let jwt = bearer_jwt(&headers)?;
    state.bus.verify_jwt(jwt)?;

    let operation_type = match op.as_str() {
        "form-name" => OperationType::ExtractFormName,
        "is-submission-button" => OperationType::IsSubmissionButton,
        "navigation-clickables" => OperationType::GetNavigationClickables,
        "login-steps" => OperationType::GenerateLoginSteps,
        other => return Err(AppError::BadRequest(format!("unknown AI op '{other}'"))),
    };

    state
        .budget
        .check(body.company_id, body.product_id, state.budget.estimate_cost(operation_type))
        .await?;

    let (value, input_tokens, output_tokens) = match operation_type {
        OperationType::ExtractFormName => {
            let context = body.fields.get("context").and_then(|v| v.as_str()).unwrap_or_default();
            let existing: Vec<String> = serde_json::from_value(body.fields.get("existing_names").cloned().unwrap_or_default()).unwrap_or_default();
            let (name, input, output) = state.ai.extract_form_name(context, &existing).await;
            (serde_json::json!({ "form_name": name }), input, output)
        }
        OperationType::IsSubmissionButton => {
            let text = body.fields.get("button_text").and_then(|v| v.as_str()).unwrap_or_default();
            let screenshot = body.fields.get("screenshot").and_then(|v| v.as_str());
            let (verdict, input, output) = state.ai.is_submission_button(text, screenshot).await;
            (serde_json::json!({ "is_submission_button": verdict }), input, output)
        }
        OperationType::GetNavigationClickables => {
            let screenshot = body.fields.get("screenshot").and_then(|v| v.as_str()).unwrap_or_default();
            let (clickables, input, output) = state.ai.get_navigation_clickables(screenshot).await;
            (serde_json::json!({ "clickables": clickables }), input, output)
        }
        OperationType::GenerateLoginSteps => {
            let dom = body.fields.get("dom").and_then(|v| v.as_str()).unwrap_or_default();
            let screenshot = body.fields.get("screenshot").and_then(|v| v.as_str());
            let username = body.fields.get("username").and_then(|v| v.as_str()).unwrap_or_default();
            let password = body.fields.get("password").and_then(|v| v.as_str()).unwrap_or_default();
            let credentials = crate::ai_broker::Credentials {
                username: username.to_string(),
                password: password.to_string(),
            };
            let hints = body.fields.get("hints").and_then(|v| v.as_str()).unwrap_or_default();
            let (result, input, output) = state.ai.generate_login_steps(dom, screenshot, &credentials, hints).await;
            (serde_json::to_value(result).map_err(|e| AppError::Internal(e.into()))?, input, output)
        }
        _ => unreachable!("matched above"),
    };

    state
        .budget
        .record_usage(body.company_id, body.product_id, body.user_id, operation_type, input_tokens, output_tokens, body.crawl_session_id)
        .await?;

    Ok(Json(value))
}
