//! Crawl Engine (spec §4.4): the agent-side DFS that discovers and maps
//! every reachable form page on a target site and produces minimized,
//! verified navigation routes to each one.
//!
//! The browser itself is a black box behind [`driver::BrowserDriver`];
//! AI classification is never called directly (unlike the server's
//! `AiBroker`) but routed through the budget-gated HTTP callbacks in
//! [`ai_client`].

pub mod ai_client;
pub mod circuit_breaker;
pub mod dom;
pub mod domain_limiter;
pub mod driver;
pub mod explorer;
pub mod minimize;
pub mod rate_limiter;
pub mod selectors;
pub mod state;
pub mod verify;

pub use ai_client::{AiCallbackError, CallbackContext, FormPageAiClient, HttpFormPageAiClient};
pub use circuit_breaker::{CircuitBreaker, CircuitState, DomainHealth, extract_domain};
pub use domain_limiter::DomainLimiter;
pub use driver::{BrowserDriver, StepOutcome, WindowHandle};
pub use explorer::{DiscoveredFormPage, DiscoveryMethod, ExplorerConfig, FormPageExplorer};
pub use minimize::minimize_path;
pub use rate_limiter::{CrawlRateLimiter, RateLimitDecision, check_crawl_rate_limit, check_http_rate_limit};
pub use state::{CrawlState, Frontier, PathEntry};
pub use verify::{VerificationOutcome, verify_and_fix_route};
