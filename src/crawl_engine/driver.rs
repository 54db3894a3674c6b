//! The browser driver boundary (spec §6.3).
//!
//! The concrete browser (chromiumoxide, or anything else) is an external
//! collaborator per spec §1 — only this trait's shape is specified. The
//! crawl engine is written entirely against `BrowserDriver` so it can be
//! exercised with a fake driver in tests, mirroring the teacher's
//! `Crawler` trait split in `crawl_types.rs`.

use async_trait::async_trait;

use crate::domain::Step;

/// Outcome of executing one `Step` (spec §6.3: "each takes a selector...
/// and returns `{success, error?, alert_present?, alert_type?, alert_text?}`").
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub alert_present: bool,
    pub alert_type: Option<String>,
    pub alert_text: Option<String>,
}

impl StepOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A live browser window/tab handle, opaque to the crawl engine.
pub type WindowHandle = String;

/// Operations the crawl engine (and the mapper's DOM-extraction phase)
/// need from a live browser session. The step action vocabulary is
/// `domain::StepAction`; every action the driver must support takes a
/// selector, an optional value, and returns a `StepOutcome`.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate the main tab to `url`, replacing current history entry.
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;

    /// Execute one driver-level step (spec §6.3). `wait`/`wait_for_*`
    /// actions must cap at 10s regardless of slow mode.
    async fn execute_step(&self, step: &Step) -> anyhow::Result<StepOutcome>;

    /// Current URL of the focused tab/window.
    async fn current_url(&self) -> anyhow::Result<String>;

    /// Serialized DOM of the focused tab (outer HTML of `<html>`),
    /// parsed by the crawl engine with `scraper` for structural checks.
    async fn dom_html(&self) -> anyhow::Result<String>;

    /// Base64-encoded screenshot of the focused tab, used for AI vision
    /// calls (`GetNavigationClickables`, `IsSubmissionButton`, `VerifyJunction`).
    async fn screenshot(&self) -> anyhow::Result<String>;

    /// Whether the element matching `selector` is currently visible
    /// (computed display/visibility/size), not merely present in the DOM.
    /// This is the one fact `scraper`'s static parse cannot answer.
    async fn is_visible(&self, selector: &str) -> anyhow::Result<bool>;

    /// All open window/tab handles, main tab first.
    async fn window_handles(&self) -> anyhow::Result<Vec<WindowHandle>>;

    async fn switch_to_window(&self, handle: &WindowHandle) -> anyhow::Result<()>;

    async fn close_window(&self, handle: &WindowHandle) -> anyhow::Result<()>;

    /// Dismiss cookie banners / consent overlays before exploring a page.
    async fn dismiss_popups(&self) -> anyhow::Result<()>;

    /// Block until the DOM is stable (no further mutations) or a
    /// driver-defined timeout elapses.
    async fn wait_for_page_stable(&self) -> anyhow::Result<()>;
}
