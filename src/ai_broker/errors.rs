#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI provider request failed: {0}")]
    Request(String),
    #[error("AI provider overloaded after retries")]
    Overloaded,
    #[error("failed to parse AI response: {0}")]
    ParseError(String),
    #[error("AI call exhausted retries, treat as no answer")]
    ExhaustedRetries,
}
