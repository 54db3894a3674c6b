//! AI Broker (C2): retry/backoff, JSON extraction, structured results.
//!
//! See spec §4.2. Grounded in `ai_form_mapper_main_prompter.py` for result
//! parsing and in the teacher's `crawl_engine::circuit_breaker`/
//! `retry_queue` for the retry/backoff idiom.

mod broker;
mod errors;
mod json_extract;
mod types;

pub use broker::{AiBroker, AiProvider};
pub use errors::AiError;
pub use json_extract::{extract_balanced_block, extract_json, sanitize_escapes, strip_fences};
pub use types::{Credentials, ErrorAnalysis, ErrorScenario, IssueType, JunctionVerdict, ParentField, StepsResult};

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FlakyProvider {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AiProvider for FlakyProvider {
        async fn complete(&self, _prompt: &str, _screenshot: Option<&str>) -> Result<(String, u64, u64), AiError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(AiError::Overloaded)
            } else {
                Ok(("{\"steps\": [], \"no_more_paths\": true}".to_string(), 10, 20))
            }
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let broker = AiBroker::new(FlakyProvider {
            fail_times: 2,
            calls: AtomicU32::new(0),
        });
        let (result, input, output) = broker
            .generate_form_steps("<html></html>", None, &serde_json::json!([]))
            .await;
        assert!(result.no_more_paths);
        assert_eq!((input, output), (10, 20));
    }

    #[tokio::test]
    async fn exhausted_retries_yield_empty_not_success() {
        let broker = AiBroker::new(FlakyProvider {
            fail_times: 10,
            calls: AtomicU32::new(0),
        });
        let (result, input, output) = broker
            .generate_form_steps("<html></html>", None, &serde_json::json!([]))
            .await;
        assert!(result.steps.is_empty());
        assert!(!result.no_more_paths);
        assert_eq!((input, output), (0, 0));
    }
}
