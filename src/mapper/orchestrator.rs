//! Mapper Orchestrator (C5): drives one session through login, navigation,
//! and form-mapping phases, invoking C1/C2 per AI call and pushing tasks
//! through C3 (spec §4.5).

use std::sync::Arc;

use dashmap::DashMap;
use log::{info, warn};
use uuid::Uuid;

use crate::ai_broker::{AiBroker, AiProvider, Credentials, ErrorScenario, IssueType};
use crate::budget::{AccessDeniedCode, BudgetError, BudgetGate};
use crate::domain::{
    AgentTask, CompanyId, CrawlSessionId, FormRouteId, NetworkId, OperationType, ProductId, Step,
    TaskId, TaskStatus, TaskType, UserId,
};
use crate::store::{AgentStore, BudgetStore, RouteStore, SessionStore, TaskStore};
use crate::task_bus::TaskBus;

use super::config::MapperConfig;
use super::session::MapperSessionRecord;
use super::state::MapperState;

#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    #[error("unknown session {0:?}")]
    UnknownSession(CrawlSessionId),
    #[error("session {0:?} is not in the expected state {1:?} (actual: {2:?})")]
    StateConflict(CrawlSessionId, MapperState, MapperState),
    #[error("login failed")]
    LoginFailed,
    #[error("AI budget exceeded")]
    BudgetExceeded,
    /// Access-denial taxonomy, kept distinct from `BudgetExceeded` and
    /// from each other so callers can surface an actionable message
    /// (spec §7 "budget and access errors must not be masked as other
    /// errors; they propagate as-is").
    #[error("AI access denied: {0}")]
    AccessDenied(AccessDeniedCode),
    #[error(transparent)]
    Budget(#[from] BudgetError),
    #[error(transparent)]
    Bus(#[from] crate::task_bus::TaskBusError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct MapperOrchestrator<S, P>
where
    S: BudgetStore + AgentStore + TaskStore + SessionStore + RouteStore,
    P: AiProvider,
{
    sessions: DashMap<CrawlSessionId, MapperSessionRecord>,
    budget: Arc<BudgetGate<S>>,
    ai: Arc<AiBroker<P>>,
    bus: Arc<TaskBus<S>>,
}

impl<S, P> MapperOrchestrator<S, P>
where
    S: BudgetStore + AgentStore + TaskStore + SessionStore + RouteStore,
    P: AiProvider,
{
    pub fn new(budget: Arc<BudgetGate<S>>, ai: Arc<AiBroker<P>>, bus: Arc<TaskBus<S>>) -> Self {
        Self {
            sessions: DashMap::new(),
            budget,
            ai,
            bus,
        }
    }

    pub fn start_session(
        &self,
        session_id: CrawlSessionId,
        user_id: UserId,
        company_id: CompanyId,
        product_id: ProductId,
        network_id: NetworkId,
        form_route_id: FormRouteId,
        config: MapperConfig,
    ) {
        self.sessions.insert(
            session_id,
            MapperSessionRecord::new(session_id, user_id, company_id, product_id, network_id, form_route_id, config),
        );
    }

    fn get(&self, session_id: CrawlSessionId) -> Result<MapperSessionRecord, MapperError> {
        self.sessions
            .get(&session_id)
            .map(|e| e.clone())
            .ok_or(MapperError::UnknownSession(session_id))
    }

    fn put(&self, record: MapperSessionRecord) {
        self.sessions.insert(record.session_id, record);
    }

    /// Pushes one unit of agent work through C3 on behalf of `record`
    /// (spec §2 "C5 Mapper Orchestrator: ... pushing tasks through C3").
    async fn enqueue_task(
        &self,
        record: &MapperSessionRecord,
        task_type: TaskType,
        parameters: serde_json::Value,
    ) -> Result<(), MapperError> {
        let task = AgentTask {
            task_id: TaskId(Uuid::new_v4()),
            company_id: record.company_id,
            user_id: record.user_id,
            task_type,
            parameters,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        };
        self.bus.enqueue(task).await?;
        Ok(())
    }

    /// Requests a DOM/screenshot capture for the session's current page
    /// (spec §4.5 `extracting_dom`), honoring the per-company DOM-variant
    /// config (spec §4.5 "Configuration (per company)").
    async fn request_dom_extraction(&self, record: &MapperSessionRecord) -> Result<(), MapperError> {
        self.enqueue_task(
            record,
            TaskType::FormMapperExtractDom,
            serde_json::json!({
                "use_full_dom": record.config.use_full_dom,
                "use_optimized_dom": record.config.use_optimized_dom,
                "use_forms_dom": record.config.use_forms_dom,
                "include_js_in_dom": record.config.include_js_in_dom,
            }),
        )
        .await
    }

    /// Dispatches the step at `current_step_index` to the agent for
    /// execution (spec §4.5 `executing_step`).
    async fn emit_next_step(&self, record: &MapperSessionRecord) -> Result<(), MapperError> {
        let step = record
            .all_steps
            .get(record.current_step_index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no step at index {}", record.current_step_index))?;
        self.enqueue_task(record, TaskType::FormMapperExecuteStep, serde_json::json!({ "step": step }))
            .await
    }

    /// Drives `record` to `Failed`, recording the actual admission
    /// failure as a distinct taxonomy code rather than collapsing every
    /// variant to `BUDGET_EXCEEDED` (spec §7, §9 "Exceptions for control
    /// flow"). The session is always terminated on an admission failure
    /// (spec §8 scenario 3); only the reported code distinguishes why.
    fn fail_on_admission_error(&self, mut record: MapperSessionRecord, err: BudgetError) -> MapperError {
        let (code, mapped) = match &err {
            BudgetError::BudgetExceeded { .. } => ("BUDGET_EXCEEDED".to_string(), MapperError::BudgetExceeded),
            BudgetError::AccessDenied { code, .. } => (code.as_str().to_string(), MapperError::AccessDenied(*code)),
            BudgetError::NoSubscription { .. } => {
                (AccessDeniedCode::NoApiKey.as_str().to_string(), MapperError::AccessDenied(AccessDeniedCode::NoApiKey))
            }
            BudgetError::Store(_) => ("UNKNOWN".to_string(), MapperError::Other(anyhow::anyhow!(err.to_string()))),
        };
        record.error_code = Some(code);
        record.transition(record.state, MapperState::Failed).ok();
        self.put(record);
        mapped
    }

    /// Login phase: empty `login_stages` skips straight to navigating
    /// (spec §4.5).
    pub async fn start_login_phase(&self, session_id: CrawlSessionId, login_stages: &[Step]) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        if login_stages.is_empty() {
            record.transition(MapperState::Initializing, MapperState::Navigating)
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::Initializing, actual))?;
            self.put(record.clone());
            return Ok(record.state);
        }
        record.transition(MapperState::Initializing, MapperState::LoggingIn)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::Initializing, actual))?;
        self.enqueue_task(&record, TaskType::FormMapperLogin, serde_json::json!({ "steps": login_stages }))
            .await?;
        self.put(record.clone());
        Ok(record.state)
    }

    pub async fn handle_login_phase_complete(
        &self,
        session_id: CrawlSessionId,
        success: bool,
        credentials: &Credentials,
        dom: Option<&str>,
        screenshot_b64: Option<&str>,
    ) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        if success {
            record.transition(MapperState::LoggingIn, MapperState::Navigating)
                .or_else(|_| record.transition(MapperState::LoginRecovering, MapperState::Navigating))
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::LoggingIn, actual))?;
            self.put(record.clone());
            return Ok(record.state);
        }

        if record.retry_count >= record.config.max_retries {
            record.transition(record.state, MapperState::Failed).ok();
            self.put(record.clone());
            return Err(MapperError::LoginFailed);
        }

        record.retry_count += 1;
        record.transition(MapperState::LoggingIn, MapperState::LoginRecovering)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::LoggingIn, actual))?;

        if let (Some(dom), Some(screenshot)) = (dom, screenshot_b64) {
            self.budget
                .check(
                    record.company_id,
                    record.product_id,
                    self.budget.estimate_cost(OperationType::GenerateFormSteps),
                )
                .await
                .map_err(|e| self.fail_on_admission_error(record.clone(), e))?;
            let (steps, in_tok, out_tok) = self
                .ai
                .generate_login_steps(dom, Some(screenshot), credentials, "recovering from failed login")
                .await;
            self.budget
                .record_usage(
                    record.company_id,
                    record.product_id,
                    record.user_id,
                    OperationType::GenerateFormSteps,
                    in_tok,
                    out_tok,
                    Some(session_id),
                )
                .await?;
            self.put(record.clone());
            self.enqueue_task(&record, TaskType::FormMapperLogin, serde_json::json!({ "steps": steps.steps }))
                .await?;
            return Ok(record.state);
        }
        self.put(record.clone());
        Ok(record.state)
    }

    /// Navigation phase: empty `navigation_steps` skips straight to
    /// extracting_dom (spec §4.5).
    pub async fn start_navigation_phase(&self, session_id: CrawlSessionId, navigation_steps: &[Step]) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        let next = if navigation_steps.is_empty() {
            MapperState::ExtractingDom
        } else {
            MapperState::Navigating
        };
        record.transition(record.state, next)
            .map_err(|actual| MapperError::StateConflict(session_id, record.state, actual))?;
        self.put(record.clone());
        if navigation_steps.is_empty() {
            self.request_dom_extraction(&record).await?;
        } else {
            self.enqueue_task(&record, TaskType::FormMapperNavigate, serde_json::json!({ "steps": navigation_steps }))
                .await?;
        }
        Ok(record.state)
    }

    pub async fn handle_navigation_phase_complete(&self, session_id: CrawlSessionId, success: bool) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        if success {
            record.transition(MapperState::Navigating, MapperState::ExtractingDom)
                .or_else(|_| record.transition(MapperState::NavRecovering, MapperState::ExtractingDom))
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::Navigating, actual))?;
            self.put(record.clone());
            self.request_dom_extraction(&record).await?;
        } else {
            record.transition(MapperState::Navigating, MapperState::NavRecovering)
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::Navigating, actual))?;
            self.put(record.clone());
        }
        Ok(record.state)
    }

    /// Stores dom_hash on the session; dom/screenshot bytes themselves
    /// belong in the short-TTL side cache (spec §4.5, §5), not here.
    pub fn handle_dom_extraction_result(&self, session_id: CrawlSessionId, dom_hash: String) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        record.transition(MapperState::ExtractingDom, MapperState::Analyzing)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::ExtractingDom, actual))?;
        record.current_dom_hash = Some(dom_hash);
        self.put(record.clone());
        Ok(record.state)
    }

    /// `analyzing`: calls `GenerateFormSteps`/`RegenerateSteps`. If
    /// `no_more_paths` or `current_path >= max_junction_paths`, jumps to
    /// `assigning_test_cases` (spec §4.5).
    pub async fn run_analysis(
        &self,
        session_id: CrawlSessionId,
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        let op = if record.all_steps.is_empty() {
            OperationType::GenerateFormSteps
        } else {
            OperationType::RegenerateSteps
        };
        self.budget
            .check(record.company_id, record.product_id, self.budget.estimate_cost(op))
            .await
            .map_err(|e| self.fail_on_admission_error(record.clone(), e))?;

        let (result, in_tok, out_tok) = if record.all_steps.is_empty() {
            self.ai.generate_form_steps(dom, screenshot_b64, &record.test_cases).await
        } else {
            self.ai
                .regenerate_steps(dom, screenshot_b64, &record.all_steps, &record.test_cases)
                .await
        };
        self.budget
            .record_usage(
                record.company_id,
                record.product_id,
                record.user_id,
                OperationType::GenerateFormSteps,
                in_tok,
                out_tok,
                Some(session_id),
            )
            .await?;

        record.all_steps.extend(result.steps);
        let reached_limit = result.no_more_paths || record.current_path >= record.config.max_junction_paths;
        let next = if reached_limit {
            MapperState::AssigningTestCases
        } else {
            MapperState::ExecutingStep
        };
        record.transition(MapperState::Analyzing, next)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::Analyzing, actual))?;
        self.put(record.clone());
        if next == MapperState::ExecutingStep {
            self.emit_next_step(&record).await?;
        }
        Ok(record.state)
    }

    /// `executing_step`: advance on success; on alert go to
    /// `handling_alert`; on other failure consult
    /// `AnalyzeFailureAndRecover` and retry (spec §4.5). Finishing the
    /// main path switches to the verification sub-prompt (`verifying_ui`)
    /// before `path_complete`; finishing the verification sub-path (spec
    /// §4.5 "After Save/Submit, switch to verification sub-prompt") goes
    /// straight to `path_complete`.
    pub async fn handle_step_result(
        &self,
        session_id: CrawlSessionId,
        success: bool,
        alert_detected: bool,
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;

        if success {
            record.current_step_index += 1;
            if record.current_step_index >= record.all_steps.len() {
                if record.verifying {
                    record.transition(MapperState::ExecutingStep, MapperState::PathComplete)
                        .map_err(|actual| MapperError::StateConflict(session_id, MapperState::ExecutingStep, actual))?;
                    self.put(record.clone());
                    return self.finish_path(session_id).await;
                }
                record.transition(MapperState::ExecutingStep, MapperState::VerifyingUi)
                    .map_err(|actual| MapperError::StateConflict(session_id, MapperState::ExecutingStep, actual))?;
                self.put(record.clone());
                return self.run_verification(session_id, dom, screenshot_b64).await;
            }
            record
                .transition(MapperState::ExecutingStep, MapperState::ExecutingStep)
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::ExecutingStep, actual))?;
            self.put(record.clone());
            self.emit_next_step(&record).await?;
            return Ok(record.state);
        }

        if alert_detected {
            record.transition(MapperState::ExecutingStep, MapperState::HandlingAlert)
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::ExecutingStep, actual))?;
            self.put(record.clone());
            return Ok(record.state);
        }

        let failed_step = record
            .all_steps
            .get(record.current_step_index)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no step at index {}", record.current_step_index))?;

        self.budget
            .check(
                record.company_id,
                record.product_id,
                self.budget.estimate_cost(OperationType::AnalyzeFailureAndRecover),
            )
            .await
            .map_err(|e| self.fail_on_admission_error(record.clone(), e))?;
        let (recovery_steps, in_tok, out_tok) = self
            .ai
            .analyze_failure_and_recover(&failed_step, &record.all_steps[..record.current_step_index], dom, screenshot_b64)
            .await;
        self.budget
            .record_usage(
                record.company_id,
                record.product_id,
                record.user_id,
                OperationType::AnalyzeFailureAndRecover,
                in_tok,
                out_tok,
                Some(session_id),
            )
            .await?;

        let unrecoverable = record.record_recovery(
            format!("{:?}", failed_step.action),
            failed_step.selector.clone(),
        );
        if unrecoverable {
            record.transition(record.state, MapperState::Failed).ok();
            self.put(record.clone());
            return Err(anyhow::anyhow!("session unrecoverable: repeated recovery on same action/target").into());
        }

        for (offset, step) in recovery_steps.into_iter().enumerate() {
            record.all_steps.insert(record.current_step_index + offset, step);
        }
        self.put(record.clone());
        self.emit_next_step(&record).await?;
        Ok(record.state)
    }

    /// `handling_alert`: classify scenario and branch (spec §4.5).
    pub async fn handle_alert(
        &self,
        session_id: CrawlSessionId,
        error_info: &str,
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        self.budget
            .check(
                record.company_id,
                record.product_id,
                self.budget.estimate_cost(OperationType::AnalyzeError),
            )
            .await
            .map_err(|e| self.fail_on_admission_error(record.clone(), e))?;
        let (analysis, in_tok, out_tok) = self
            .ai
            .analyze_error(error_info, &record.all_steps[..record.current_step_index], dom, screenshot_b64)
            .await;
        self.budget
            .record_usage(
                record.company_id,
                record.product_id,
                record.user_id,
                OperationType::AnalyzeError,
                in_tok,
                out_tok,
                Some(session_id),
            )
            .await?;

        let next = match analysis.scenario {
            ErrorScenario::A => MapperState::ExecutingStep,
            ErrorScenario::B => match analysis.issue_type {
                Some(IssueType::RealIssue) => {
                    warn!("alert scenario B/real_issue: reportable defect, aborting path");
                    record.last_error = Some(analysis);
                    MapperState::PathComplete
                }
                _ => {
                    info!("alert scenario B/ai_issue: re-analyzing with critical-fields checklist");
                    record.last_error = Some(analysis);
                    MapperState::Analyzing
                }
            },
        };
        record.transition(MapperState::HandlingAlert, next)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::HandlingAlert, actual))?;
        self.put(record.clone());

        match next {
            MapperState::ExecutingStep => {
                self.emit_next_step(&record).await?;
                Ok(record.state)
            }
            MapperState::PathComplete => self.finish_path(session_id).await,
            MapperState::Analyzing => self.run_analysis(session_id, dom, screenshot_b64).await,
            _ => Ok(record.state),
        }
    }

    /// `verifying_ui`: generates verification steps from the `value`s of
    /// previously executed fill/select steps, never the post-submit DOM
    /// (spec §4.5), then re-enters `executing_step` to run them.
    async fn run_verification(&self, session_id: CrawlSessionId, dom: &str, screenshot_b64: Option<&str>) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        let expected_values: Vec<(String, String)> = record
            .all_steps
            .iter()
            .filter_map(|s| match (&s.field_name, &s.value) {
                (Some(name), Some(value)) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect();

        self.budget
            .check(
                record.company_id,
                record.product_id,
                self.budget.estimate_cost(OperationType::RegenerateVerifySteps),
            )
            .await
            .map_err(|e| self.fail_on_admission_error(record.clone(), e))?;
        let (verify_steps, in_tok, out_tok) = self.ai.regenerate_verify_steps(dom, screenshot_b64, &expected_values).await;
        self.budget
            .record_usage(
                record.company_id,
                record.product_id,
                record.user_id,
                OperationType::RegenerateVerifySteps,
                in_tok,
                out_tok,
                Some(session_id),
            )
            .await?;

        if verify_steps.steps.is_empty() {
            record.transition(MapperState::VerifyingUi, MapperState::PathComplete)
                .map_err(|actual| MapperError::StateConflict(session_id, MapperState::VerifyingUi, actual))?;
            self.put(record.clone());
            return self.finish_path(session_id).await;
        }

        record.verifying = true;
        record.all_steps = verify_steps.steps;
        record.current_step_index = 0;
        record.transition(MapperState::VerifyingUi, MapperState::ExecutingStep)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::VerifyingUi, actual))?;
        self.put(record.clone());
        self.emit_next_step(&record).await?;
        Ok(record.state)
    }

    /// `path_complete`: pure bookkeeping — advances path counters and
    /// decides whether more junction paths remain to analyze (spec
    /// §4.5).
    async fn finish_path(&self, session_id: CrawlSessionId) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        record.total_paths_discovered += 1;
        record.current_path += 1;
        record.previous_paths.push(std::mem::take(&mut record.all_steps));
        record.current_step_index = 0;
        record.verifying = false;

        let next = if record.current_path >= record.config.max_junction_paths {
            MapperState::AllPathsComplete
        } else {
            MapperState::Analyzing
        };
        record.transition(MapperState::PathComplete, next)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::PathComplete, actual))?;
        self.put(record.clone());
        Ok(record.state)
    }

    pub fn handle_all_paths_complete(&self, session_id: CrawlSessionId) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        record.transition(MapperState::AllPathsComplete, MapperState::AssigningTestCases)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::AllPathsComplete, actual))?;
        self.put(record.clone());
        Ok(record.state)
    }

    /// `assigning_test_cases`: a dedicated AI step annotates the
    /// flattened, discovered step list with test-case identifiers before
    /// the session completes (spec §4.5).
    pub async fn assign_test_cases(&self, session_id: CrawlSessionId) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        let mut final_steps: Vec<Step> = record.previous_paths.iter().flatten().cloned().collect();

        self.budget
            .check(
                record.company_id,
                record.product_id,
                self.budget.estimate_cost(OperationType::AssignTestCases),
            )
            .await
            .map_err(|e| self.fail_on_admission_error(record.clone(), e))?;
        let (test_case_ids, in_tok, out_tok) = self.ai.assign_test_cases(&final_steps).await;
        self.budget
            .record_usage(
                record.company_id,
                record.product_id,
                record.user_id,
                OperationType::AssignTestCases,
                in_tok,
                out_tok,
                Some(session_id),
            )
            .await?;

        for (step, test_case_id) in final_steps.iter_mut().zip(test_case_ids) {
            step.test_case_id = Some(test_case_id);
        }
        record.final_steps = final_steps;
        record.transition(MapperState::AssigningTestCases, MapperState::Completed)
            .map_err(|actual| MapperError::StateConflict(session_id, MapperState::AssigningTestCases, actual))?;
        self.put(record.clone());
        Ok(record.state)
    }

    /// Idempotent: a second cancel on a terminal session is a no-op
    /// returning success (spec §8).
    pub fn cancel_session(&self, session_id: CrawlSessionId) -> Result<MapperState, MapperError> {
        let mut record = self.get(session_id)?;
        if !record.state.is_terminal() {
            record.transition(record.state, MapperState::Cancelled).ok();
            self.put(record.clone());
        }
        self.bus.request_cancel(record.user_id);
        Ok(record.state)
    }

    pub fn get_session_status(&self, session_id: CrawlSessionId) -> Result<MapperSessionRecord, MapperError> {
        self.get(session_id)
    }
}
