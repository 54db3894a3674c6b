use std::fmt;

use crate::domain::{CompanyId, ProductId};

/// Admission failure codes (spec §4.1, §7). Distinguished error values,
/// never collapsed to a string, so callers can pattern-match them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDeniedCode {
    CompanyNotFound,
    AccessPending,
    TrialExpired,
    NoApiKey,
    AccessDenied,
}

impl AccessDeniedCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CompanyNotFound => "COMPANY_NOT_FOUND",
            Self::AccessPending => "ACCESS_PENDING",
            Self::TrialExpired => "TRIAL_EXPIRED",
            Self::NoApiKey => "NO_API_KEY",
            Self::AccessDenied => "ACCESS_DENIED",
        }
    }
}

impl fmt::Display for AccessDeniedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("AI access denied for company {company_id:?}: {reason} ({code})")]
    AccessDenied {
        company_id: CompanyId,
        code: AccessDeniedCode,
        reason: String,
    },
    #[error("AI budget exceeded for company {company_id:?} product {product_id:?}: ${used:.6}/${total:.6}")]
    BudgetExceeded {
        company_id: CompanyId,
        product_id: ProductId,
        total: f64,
        used: f64,
    },
    #[error("no active subscription for company {company_id:?} product {product_id:?}")]
    NoSubscription {
        company_id: CompanyId,
        product_id: ProductId,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
