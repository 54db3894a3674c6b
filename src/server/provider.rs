//! The one concrete `AiProvider`: an HTTP client against a configured AI
//! text/vision endpoint (spec §1: "the AI text/vision model... only its
//! interface specified"). Grounded in the teacher's reqwest usage for
//! outbound calls and in `pawz-code/server`'s reqwest+rustls-tls stack.

use async_trait::async_trait;
use serde::Serialize;

use crate::ai_broker::{AiError, AiProvider};

#[derive(Clone)]
pub struct ReqwestAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    screenshot_base64: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    text: String,
    input_tokens: u64,
    output_tokens: u64,
}

impl ReqwestAiProvider {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl AiProvider for ReqwestAiProvider {
    async fn complete(&self, prompt: &str, screenshot_b64: Option<&str>) -> Result<(String, u64, u64), AiError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                prompt,
                screenshot_base64: screenshot_b64,
            })
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE
            || response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(AiError::Overloaded);
        }
        if !response.status().is_success() {
            return Err(AiError::Request(format!("status {}", response.status())));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::ParseError(e.to_string()))?;
        Ok((body.text, body.input_tokens, body.output_tokens))
    }
}
