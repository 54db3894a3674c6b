//! The agent's side of the form-page AI callbacks (spec §6.1: "the agent
//! is itself an HTTP client; it posts to routes `POST
//! /api/form-pages/ai/{op}`"). Unlike the server's `AiBroker`, the crawl
//! engine never talks to the AI provider directly — every classification
//! call is budget-gated on the server, so a budget failure must surface
//! here as a distinct, non-maskable error (spec §4.1, §7).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{CompanyId, CrawlSessionId, ProductId, UserId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AiCallbackError {
    #[error("AI budget exceeded for company {company_id:?}")]
    BudgetExceeded { company_id: CompanyId },
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("request error: {0}")]
    Request(String),
}

/// Shared envelope every `/api/form-pages/ai/{op}` call carries (spec §6.1).
#[derive(Debug, Clone, Serialize)]
pub struct CallbackContext {
    pub company_id: CompanyId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub crawl_session_id: CrawlSessionId,
}

/// The subset of C2 operations the crawl engine drives directly. Login
/// steps are also exposed here since the Form-Mapper's login phase and
/// the crawler's credentialed start share the same callback surface.
#[async_trait]
pub trait FormPageAiClient: Send + Sync {
    async fn extract_form_name(&self, ctx: &CallbackContext, context: &str, existing_names: &[String]) -> Result<String, AiCallbackError>;

    async fn is_submission_button(&self, ctx: &CallbackContext, button_text: &str, screenshot_b64: Option<&str>) -> Result<bool, AiCallbackError>;

    async fn get_navigation_clickables(&self, ctx: &CallbackContext, screenshot_b64: &str) -> Result<Vec<String>, AiCallbackError>;

    async fn generate_login_steps(
        &self,
        ctx: &CallbackContext,
        dom: &str,
        screenshot_b64: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<crate::ai_broker::StepsResult, AiCallbackError>;
}

/// HTTP implementation against the server's form-page callback routes.
pub struct HttpFormPageAiClient {
    client: reqwest::Client,
    base_url: String,
    bearer: String,
}

impl HttpFormPageAiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, bearer_jwt: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer: bearer_jwt.into(),
        }
    }

    async fn post(&self, op: &str, body: Value) -> Result<Value, AiCallbackError> {
        let response = self
            .client
            .post(format!("{}/api/form-pages/ai/{op}", self.base_url))
            .bearer_auth(&self.bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiCallbackError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            let body: Value = response.json().await.unwrap_or_default();
            let company_id = body
                .get("company_id")
                .and_then(Value::as_str)
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .map(CompanyId)
                .unwrap_or(CompanyId(uuid::Uuid::nil()));
            return Err(AiCallbackError::BudgetExceeded { company_id });
        }
        if response.status() == reqwest::StatusCode::FORBIDDEN {
            let body: Value = response.json().await.unwrap_or_default();
            let message = body.get("message").and_then(Value::as_str).unwrap_or("access denied").to_string();
            return Err(AiCallbackError::AccessDenied(message));
        }
        if !response.status().is_success() {
            return Err(AiCallbackError::Request(format!("status {}", response.status())));
        }
        response.json().await.map_err(|e| AiCallbackError::Request(e.to_string()))
    }
}

#[async_trait]
impl FormPageAiClient for HttpFormPageAiClient {
    async fn extract_form_name(&self, ctx: &CallbackContext, context: &str, existing_names: &[String]) -> Result<String, AiCallbackError> {
        let body = self
            .post(
                "form-name",
                serde_json::json!({
                    "company_id": ctx.company_id, "product_id": ctx.product_id, "user_id": ctx.user_id,
                    "crawl_session_id": ctx.crawl_session_id, "context": context, "existing_names": existing_names,
                }),
            )
            .await?;
        Ok(body.get("form_name").and_then(Value::as_str).unwrap_or_default().to_string())
    }

    async fn is_submission_button(&self, ctx: &CallbackContext, button_text: &str, screenshot_b64: Option<&str>) -> Result<bool, AiCallbackError> {
        let body = self
            .post(
                "is-submission-button",
                serde_json::json!({
                    "company_id": ctx.company_id, "product_id": ctx.product_id, "user_id": ctx.user_id,
                    "crawl_session_id": ctx.crawl_session_id, "button_text": button_text, "screenshot": screenshot_b64,
                }),
            )
            .await?;
        Ok(body.get("is_submission_button").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn get_navigation_clickables(&self, ctx: &CallbackContext, screenshot_b64: &str) -> Result<Vec<String>, AiCallbackError> {
        let body = self
            .post(
                "navigation-clickables",
                serde_json::json!({
                    "company_id": ctx.company_id, "product_id": ctx.product_id, "user_id": ctx.user_id,
                    "crawl_session_id": ctx.crawl_session_id, "screenshot": screenshot_b64,
                }),
            )
            .await?;
        Ok(serde_json::from_value(body.get("clickables").cloned().unwrap_or_default()).unwrap_or_default())
    }

    async fn generate_login_steps(
        &self,
        ctx: &CallbackContext,
        dom: &str,
        screenshot_b64: Option<&str>,
        username: &str,
        password: &str,
    ) -> Result<crate::ai_broker::StepsResult, AiCallbackError> {
        let body = self
            .post(
                "login-steps",
                serde_json::json!({
                    "company_id": ctx.company_id, "product_id": ctx.product_id, "user_id": ctx.user_id,
                    "crawl_session_id": ctx.crawl_session_id, "dom": dom, "screenshot": screenshot_b64,
                    "username": username, "password": password,
                }),
            )
            .await?;
        serde_json::from_value(body).map_err(|e| AiCallbackError::Request(e.to_string()))
    }
}
