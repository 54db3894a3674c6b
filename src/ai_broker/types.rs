use serde::{Deserialize, Serialize};

use crate::domain::Step;

/// Common result shape for every step-generating operation (spec §4.2).
///
/// Deserializes both the modern `{steps: […], no_more_paths, …}` object
/// shape and a legacy bare `[…]` array of steps, the latter treated as
/// `{steps: […], no_more_paths: false}` with every other field absent
/// (spec §4.2 rule 4: "tolerate both shapes").
#[derive(Debug, Clone, Serialize, Default)]
pub struct StepsResult {
    pub steps: Vec<Step>,
    pub no_more_paths: bool,
    pub page_error_detected: Option<bool>,
    pub login_failed: Option<bool>,
    pub already_logged_in: Option<bool>,
    pub validation_errors_detected: Option<bool>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl<'de> Deserialize<'de> for StepsResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Object {
                #[serde(default)]
                steps: Vec<Step>,
                #[serde(default)]
                no_more_paths: bool,
                #[serde(default)]
                page_error_detected: Option<bool>,
                #[serde(default)]
                login_failed: Option<bool>,
                #[serde(default)]
                already_logged_in: Option<bool>,
                #[serde(default)]
                validation_errors_detected: Option<bool>,
                #[serde(default)]
                error_type: Option<String>,
                #[serde(default)]
                error_message: Option<String>,
            },
            Array(Vec<Step>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Object {
                steps,
                no_more_paths,
                page_error_detected,
                login_failed,
                already_logged_in,
                validation_errors_detected,
                error_type,
                error_message,
            } => StepsResult {
                steps,
                no_more_paths,
                page_error_detected,
                login_failed,
                already_logged_in,
                validation_errors_detected,
                error_type,
                error_message,
            },
            Repr::Array(steps) => StepsResult {
                steps,
                ..Default::default()
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScenario {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    RealIssue,
    AiIssue,
    ApiError,
    ParseError,
}

/// `AnalyzeError`/`AnalyzeValidationErrors` result (spec §4.2, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub scenario: ErrorScenario,
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub problematic_fields: Vec<String>,
    pub field_requirements: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentField {
    pub name: String,
    pub value_hint: Option<String>,
}

/// `VerifyJunction` verdict: does a selection open a truly distinct field
/// set (junction) or merely a cascading dependent dropdown (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JunctionVerdict {
    Junction,
    CascadingDropdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
