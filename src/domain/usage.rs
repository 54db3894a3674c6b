use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CompanyId, CrawlSessionId, ProductId, UserId};

/// One of C2's bound operations, used for `ApiUsage.operation_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    GenerateLoginSteps,
    GenerateLogoutSteps,
    ExtractFormName,
    ExtractParentFields,
    VerifyUiDefects,
    IsSubmissionButton,
    GetNavigationClickables,
    GenerateFormSteps,
    RegenerateSteps,
    RegenerateVerifySteps,
    AnalyzeError,
    AnalyzeValidationErrors,
    AnalyzeFailureAndRecover,
    VerifyJunction,
    AssignTestCases,
}

impl OperationType {
    /// Whether this call is vision-augmented, used to pick the
    /// vision-haiku price tier in the cost model (spec §4.1).
    #[must_use]
    pub const fn is_vision(self) -> bool {
        matches!(
            self,
            Self::VerifyUiDefects | Self::IsSubmissionButton | Self::GetNavigationClickables | Self::VerifyJunction
        )
    }
}

/// Append-only record of a metered AI call (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiUsage {
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub crawl_session_id: Option<CrawlSessionId>,
    pub operation_type: OperationType,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// `f(input_tokens, output_tokens)`, stored with 6-decimal precision.
    pub api_cost: f64,
    pub timestamp: DateTime<Utc>,
}
