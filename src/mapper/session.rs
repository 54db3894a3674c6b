use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai_broker::ErrorAnalysis;
use crate::domain::{
    CompanyId, CrawlSessionId, FormRouteId, NetworkId, ProductId, Step, UserId,
};

use super::config::MapperConfig;
use super::state::MapperState;

/// Session TTL in the state cache (spec §4.5).
pub const SESSION_TTL_HOURS: i64 = 24;
/// DOM/screenshot buffer TTL (spec §5 shared resources).
pub const DOM_BUFFER_TTL_HOURS: i64 = 1;

/// The full mapper session record (spec §4.5 "State record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperSessionRecord {
    pub session_id: CrawlSessionId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub network_id: NetworkId,
    pub form_route_id: FormRouteId,
    pub state: MapperState,
    pub previous_state: Option<MapperState>,
    pub current_path: u32,
    pub total_paths_discovered: u32,
    pub current_step_index: usize,
    pub all_steps: Vec<Step>,
    pub current_dom_hash: Option<String>,
    pub previous_paths: Vec<Vec<Step>>,
    pub current_path_junctions: Vec<Step>,
    pub test_cases: serde_json::Value,
    pub config: MapperConfig,
    pub retry_count: u32,
    pub last_error: Option<ErrorAnalysis>,
    /// Set alongside a transition into `Failed` so status polls can tell
    /// a budget cutoff apart from a recovery-loop or login failure (spec
    /// §8 scenario 3: session lands in `failed` with `BUDGET_EXCEEDED`).
    pub error_code: Option<String>,
    /// History of recovery attempts, kept to detect a stuck loop (spec
    /// §4.5: "if >=4 recoveries share the same action/target pattern the
    /// orchestrator declares the session unrecoverable").
    pub recovery_attempts: Vec<RecoveryAttempt>,
    pub final_steps: Vec<Step>,
    /// Distinguishes the shared `executing_step` loop's two callers: the
    /// main discovery path (finishes into `verifying_ui`) and the
    /// verification sub-path spawned from it (finishes straight into
    /// `path_complete`). Spec §4.5 "After Save/Submit, switch to
    /// verification sub-prompt."
    pub verifying: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub action: String,
    pub target_selector: Option<String>,
    pub at: DateTime<Utc>,
}

impl MapperSessionRecord {
    #[must_use]
    pub fn new(
        session_id: CrawlSessionId,
        user_id: UserId,
        company_id: CompanyId,
        product_id: ProductId,
        network_id: NetworkId,
        form_route_id: FormRouteId,
        config: MapperConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            company_id,
            product_id,
            network_id,
            form_route_id,
            state: MapperState::Initializing,
            previous_state: None,
            current_path: 0,
            total_paths_discovered: 0,
            current_step_index: 0,
            all_steps: Vec::new(),
            current_dom_hash: None,
            previous_paths: Vec::new(),
            current_path_junctions: Vec::new(),
            test_cases: serde_json::Value::Null,
            config,
            retry_count: 0,
            last_error: None,
            error_code: None,
            recovery_attempts: Vec::new(),
            final_steps: Vec::new(),
            verifying: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Every transition is a compare-and-set from `previous_state` to
    /// `state` (spec §5 ordering guarantees): the caller must present the
    /// state it last observed, so a concurrent handler racing on the same
    /// session fails instead of silently clobbering it.
    pub fn transition(&mut self, expected_current: MapperState, next: MapperState) -> Result<(), MapperState> {
        if self.state != expected_current {
            return Err(self.state);
        }
        self.previous_state = Some(self.state);
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a recovery attempt and reports whether the session should
    /// now be declared unrecoverable (4+ recoveries sharing the same
    /// action/target).
    pub fn record_recovery(&mut self, action: impl Into<String>, target_selector: Option<String>) -> bool {
        let action = action.into();
        self.recovery_attempts.push(RecoveryAttempt {
            action: action.clone(),
            target_selector: target_selector.clone(),
            at: Utc::now(),
        });
        let matching = self
            .recovery_attempts
            .iter()
            .filter(|a| a.action == action && a.target_selector == target_selector)
            .count();
        matching >= 4
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > chrono::Duration::hours(SESSION_TTL_HOURS)
    }
}
