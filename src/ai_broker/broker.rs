//! Single façade over the AI provider (spec §4.2).

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use rand::Rng;
use serde_json::Value;

use super::errors::AiError;
use super::json_extract::extract_json;
use super::types::{Credentials, ErrorAnalysis, JunctionVerdict, ParentField, StepsResult};

/// Black-box AI text/vision request-response service (spec §1: out of
/// scope as a concrete technology, interface only).
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends `prompt` (and an optional base64 screenshot) to the provider
    /// and returns the raw response text plus token accounting.
    async fn complete(
        &self,
        prompt: &str,
        screenshot_b64: Option<&str>,
    ) -> Result<(String, u64, u64), AiError>;
}

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Wraps a provider with the retry/backoff policy shared by every C2
/// operation: up to 3 attempts, exponential backoff from 2s with ±50%
/// jitter on overload or transient error (spec §4.2).
pub struct AiBroker<P: AiProvider> {
    provider: P,
}

impl<P: AiProvider> AiBroker<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns `None` once retries are exhausted; callers must treat that
    /// as "no answer," never as success (spec §4.2, §7).
    async fn call_with_retry(&self, prompt: &str, screenshot_b64: Option<&str>) -> Option<(String, u64, u64)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.complete(prompt, screenshot_b64).await {
                Ok(result) => return Some(result),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    let jitter_frac = rand::rng().random_range(-0.5..=0.5);
                    let jittered = backoff.mul_f64(1.0 + jitter_frac);
                    warn!("AI call attempt {attempt} failed ({err}), retrying in {jittered:?}");
                    tokio::time::sleep(jittered).await;
                }
                Err(err) => {
                    info!("AI call exhausted {MAX_ATTEMPTS} attempts, last error: {err}");
                    return None;
                }
            }
        }
    }

    async fn call_json<T: serde::de::DeserializeOwned + Default>(
        &self,
        prompt: &str,
        screenshot_b64: Option<&str>,
    ) -> (T, u64, u64) {
        match self.call_with_retry(prompt, screenshot_b64).await {
            Some((text, input_tokens, output_tokens)) => match extract_json::<T>(&text) {
                Ok(parsed) => (parsed, input_tokens, output_tokens),
                Err(err) => {
                    warn!("AI response failed to parse as JSON: {err}");
                    (T::default(), input_tokens, output_tokens)
                }
            },
            None => (T::default(), 0, 0),
        }
    }

    pub async fn generate_login_steps(
        &self,
        dom: &str,
        screenshot_b64: Option<&str>,
        credentials: &Credentials,
        hints: &str,
    ) -> (StepsResult, u64, u64) {
        let prompt = format!(
            "Generate login steps.\nDOM:\n{dom}\nUsername: {}\nPassword: {}\nHints: {hints}",
            credentials.username, credentials.password
        );
        self.call_json(&prompt, screenshot_b64).await
    }

    pub async fn generate_logout_steps(&self, dom: &str, screenshot_b64: Option<&str>, hints: &str) -> (StepsResult, u64, u64) {
        let prompt = format!("Generate logout steps.\nDOM:\n{dom}\nHints: {hints}");
        self.call_json(&prompt, screenshot_b64).await
    }

    pub async fn extract_form_name(&self, context: &str, existing_names: &[String]) -> (String, u64, u64) {
        let prompt = format!(
            "Extract a concise form name.\nContext:\n{context}\nExisting names: {}",
            existing_names.join(", ")
        );
        match self.call_with_retry(&prompt, None).await {
            Some((text, i, o)) => (text.trim().trim_matches('"').to_string(), i, o),
            None => (String::new(), 0, 0),
        }
    }

    pub async fn extract_parent_fields(
        &self,
        form_name: &str,
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> (Vec<ParentField>, u64, u64) {
        let prompt = format!("Extract parent fields for form {form_name}.\nDOM:\n{dom}");
        self.call_json(&prompt, screenshot_b64).await
    }

    /// Empty string = no defects (spec §4.2).
    pub async fn verify_ui_defects(&self, form_name: &str, screenshot_b64: &str) -> (String, u64, u64) {
        let prompt = format!("Verify UI defects for form {form_name}.");
        match self.call_with_retry(&prompt, Some(screenshot_b64)).await {
            Some((text, i, o)) => (text.trim().to_string(), i, o),
            None => (String::new(), 0, 0),
        }
    }

    pub async fn is_submission_button(&self, button_text: &str, screenshot_b64: Option<&str>) -> (bool, u64, u64) {
        let prompt = format!("Is \"{button_text}\" a form submission button? Answer true or false.");
        match self.call_with_retry(&prompt, screenshot_b64).await {
            Some((text, i, o)) => (text.trim().eq_ignore_ascii_case("true"), i, o),
            None => (false, 0, 0),
        }
    }

    pub async fn get_navigation_clickables(&self, screenshot_b64: &str) -> (Vec<String>, u64, u64) {
        let prompt = "List the navigation-target clickables visible in this screenshot.".to_string();
        self.call_json::<Vec<String>>(&prompt, Some(screenshot_b64)).await
    }

    pub async fn generate_form_steps(
        &self,
        dom: &str,
        screenshot_b64: Option<&str>,
        test_cases: &Value,
    ) -> (StepsResult, u64, u64) {
        let prompt = format!("Generate form-filling steps.\nDOM:\n{dom}\nTest cases: {test_cases}");
        self.call_json(&prompt, screenshot_b64).await
    }

    pub async fn regenerate_steps(
        &self,
        dom: &str,
        screenshot_b64: Option<&str>,
        executed: &[crate::domain::Step],
        test_cases: &Value,
    ) -> (StepsResult, u64, u64) {
        let prompt = format!(
            "Regenerate steps.\nDOM:\n{dom}\nAlready executed: {} steps\nTest cases: {test_cases}",
            executed.len()
        );
        self.call_json(&prompt, screenshot_b64).await
    }

    pub async fn regenerate_verify_steps(
        &self,
        dom: &str,
        screenshot_b64: Option<&str>,
        expected_values: &[(String, String)],
    ) -> (StepsResult, u64, u64) {
        let expectations = expected_values
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!("Generate verification steps.\nDOM:\n{dom}\nExpected values: {expectations}");
        self.call_json(&prompt, screenshot_b64).await
    }

    pub async fn analyze_error(
        &self,
        error_info: &str,
        executed_steps: &[crate::domain::Step],
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> (ErrorAnalysis, u64, u64) {
        let prompt = format!(
            "Analyze this alert/error.\nError: {error_info}\nExecuted steps: {}\nDOM:\n{dom}",
            executed_steps.len()
        );
        let (result, i, o): (Option<ErrorAnalysis>, u64, u64) = self.call_json(&prompt, screenshot_b64).await;
        (
            result.unwrap_or(ErrorAnalysis {
                scenario: super::types::ErrorScenario::A,
                issue_type: Some(super::types::IssueType::ParseError),
                problematic_fields: Vec::new(),
                field_requirements: None,
                explanation: None,
            }),
            i,
            o,
        )
    }

    pub async fn analyze_validation_errors(
        &self,
        executed_steps: &[crate::domain::Step],
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> (ErrorAnalysis, u64, u64) {
        self.analyze_error("validation error banner detected", executed_steps, dom, screenshot_b64)
            .await
    }

    pub async fn analyze_failure_and_recover(
        &self,
        failed_step: &crate::domain::Step,
        executed: &[crate::domain::Step],
        dom: &str,
        screenshot_b64: Option<&str>,
    ) -> (Vec<crate::domain::Step>, u64, u64) {
        let prompt = format!(
            "Recover from failed step (action {:?}, selector {:?}).\nExecuted: {} steps\nDOM:\n{dom}",
            failed_step.action,
            failed_step.selector,
            executed.len()
        );
        self.call_json::<Vec<crate::domain::Step>>(&prompt, screenshot_b64).await
    }

    /// Assigns a test-case identifier to each of a session's final steps
    /// (spec §4.5 "assigning test cases": "a separate AI step annotates
    /// the discovered step list with test-case identifiers").
    pub async fn assign_test_cases(&self, steps: &[crate::domain::Step]) -> (Vec<String>, u64, u64) {
        let prompt = format!("Assign test-case identifiers to these {} steps.", steps.len());
        self.call_json::<Vec<String>>(&prompt, None).await
    }

    pub async fn verify_junction(
        &self,
        before_screenshot_b64: &str,
        after_screenshot_b64: &str,
        _step: &crate::domain::Step,
    ) -> (JunctionVerdict, u64, u64) {
        let prompt = "Compare before/after screenshots: did this selection reveal a genuinely different field set (junction) or just a cascading dependent dropdown?".to_string();
        match self.call_with_retry(&prompt, Some(after_screenshot_b64)).await {
            Some((text, i, o)) => {
                let _ = before_screenshot_b64;
                let verdict = if text.to_lowercase().contains("cascad") {
                    JunctionVerdict::CascadingDropdown
                } else {
                    JunctionVerdict::Junction
                };
                (verdict, i, o)
            }
            // Defaults to true/Junction on failure to verify (spec §4.5).
            None => (JunctionVerdict::Junction, 0, 0),
        }
    }
}
