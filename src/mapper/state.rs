use serde::{Deserialize, Serialize};

/// The form-mapping session state machine (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapperState {
    Initializing,
    LoggingIn,
    LoginRecovering,
    Navigating,
    NavRecovering,
    ExtractingDom,
    Analyzing,
    ExecutingStep,
    HandlingAlert,
    VerifyingUi,
    PathComplete,
    AllPathsComplete,
    AssigningTestCases,
    Completed,
    Failed,
    Cancelled,
}

impl MapperState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Backwards-compat alias exposed to status polls (spec §4.5).
    #[must_use]
    pub const fn as_session_status(self) -> SessionStatus {
        match self {
            Self::Initializing => SessionStatus::Initializing,
            Self::Completed => SessionStatus::Completed,
            Self::Failed => SessionStatus::Failed,
            Self::Cancelled => SessionStatus::Cancelled,
            _ => SessionStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}
