//! The recursive form-page crawler (spec §4.4): DFS exploration of a
//! target site, producing deduplicated, minimum-length reproducible
//! routes to every discovered form page. Grounded in
//! `form_pages_crawler.py`'s `_gather_all_form_pages`.

use std::collections::HashSet;
use std::sync::Arc;

use scraper::{Html, Selector};

use crate::domain::Step;

use super::ai_client::{CallbackContext, FormPageAiClient};
use super::circuit_breaker::CircuitBreaker;
use super::dom::{self, ElementView};
use super::domain_limiter::DomainLimiter;
use super::driver::BrowserDriver;
use super::minimize::minimize_path;
use super::rate_limiter::{CrawlRateLimiter, RateLimitDecision};
use super::selectors::{css_preferred_selector, unique_xpath};
use super::state::{CrawlState, Frontier, PathEntry};
use super::verify::verify_and_fix_route;

/// Safety ceiling on total explored states (spec §4.4).
const MAX_EXPLORED_STATES: usize = 500;

/// How a form page was found (spec §4.4 "Outputs").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    DirectFormPage,
    OpensInNewTab,
    IsModal,
    Default,
}

#[derive(Debug, Clone)]
pub struct DiscoveredFormPage {
    pub form_name: String,
    pub form_url: String,
    pub navigation_steps: Vec<Step>,
    pub depth: u32,
    pub discovery_method: DiscoveryMethod,
    /// Whether replaying `navigation_steps` from `start_url` reached
    /// `form_url` within the verification attempt cap (spec §4.4
    /// "Verification", §8: "verified at least once within 3 attempts").
    pub verified: bool,
    pub verification_attempts: u32,
}

pub struct ExplorerConfig {
    pub max_depth: u32,
    pub slow_mode: bool,
    pub target_form_pages: Vec<String>,
    /// Politeness ceiling on navigation replays per target domain (spec
    /// §4.4 is silent on crawl politeness; this is ambient resilience
    /// carried from the teacher's `rate_limiter`, not a spec feature).
    pub requests_per_second: f64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            slow_mode: false,
            target_form_pages: Vec::new(),
            requests_per_second: 4.0,
        }
    }
}

/// Owns the exploration run: the visited path-key set, the global
/// navigation-item set captured at depth 0, and the global selector-
/// uniqueness set (spec §4.4 step 5).
pub struct FormPageExplorer {
    driver: Arc<dyn BrowserDriver>,
    ai: Arc<dyn FormPageAiClient>,
    ctx: CallbackContext,
    config: ExplorerConfig,
    start_url: String,
    base_url: String,

    visited_states: HashSet<String>,
    global_navigation_items: HashSet<String>,
    global_locators: HashSet<String>,
    discovered: Vec<DiscoveredFormPage>,
    rate_limiter: CrawlRateLimiter,
    circuit_breaker: CircuitBreaker,
    /// Caps concurrent verification replays per domain (spec §4.4
    /// "Verification" is silent on concurrency; this guards against
    /// hammering one target site when many routes verify back to back).
    domain_limiter: DomainLimiter,
}

impl FormPageExplorer {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        ai: Arc<dyn FormPageAiClient>,
        ctx: CallbackContext,
        start_url: impl Into<String>,
        base_url: impl Into<String>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            driver,
            ai,
            ctx,
            config,
            start_url: start_url.into(),
            base_url: base_url.into(),
            visited_states: HashSet::new(),
            global_navigation_items: HashSet::new(),
            global_locators: HashSet::new(),
            discovered: Vec::new(),
            rate_limiter: CrawlRateLimiter::new(),
            circuit_breaker: CircuitBreaker::new(5, 2, std::time::Duration::from_secs(30)),
            domain_limiter: DomainLimiter::new(2),
        }
    }

    /// Runs the DFS to completion (or the safety ceiling/cancellation),
    /// returning every discovered form page.
    pub async fn discover(
        &mut self,
        mut cancel_check: impl FnMut() -> bool,
    ) -> anyhow::Result<Vec<DiscoveredFormPage>> {
        self.driver.navigate(&self.start_url).await?;
        self.driver.dismiss_popups().await?;
        self.driver.wait_for_page_stable().await?;

        let mut frontier = Frontier::new(CrawlState::root(self.start_url.clone()));
        let mut explored = 0usize;

        while let Some(state) = frontier.pop() {
            if cancel_check() {
                break;
            }
            if explored >= MAX_EXPLORED_STATES {
                break;
            }

            let key = state.path_key();
            if self.visited_states.contains(&key) {
                continue;
            }
            self.visited_states.insert(key);
            explored += 1;

            if self.manage_new_tabs(&state).await? {
                continue;
            }

            if state.depth > self.config.max_depth {
                continue;
            }

            if !self.navigate_to_state(&state).await? {
                continue;
            }

            if state.depth == 0 {
                self.capture_global_navigation(&state).await?;
            }

            if self.handle_dropdown_if_opened(&state, &mut frontier).await? {
                continue;
            }

            let dom_html = self.driver.dom_html().await?;
            let doc = Html::parse_document(&dom_html);

            if self.page_has_form_fields(&doc).await? {
                self.record_direct_form_page(&state).await?;
                continue;
            }

            self.click_form_opening_buttons(&state, &mut frontier).await?;
            self.enqueue_generic_clickables(&state, &doc, &mut frontier).await?;
        }

        Ok(std::mem::take(&mut self.discovered))
    }

    /// Re-navigates to `start_url` and replays `state.path`, respecting
    /// per-domain politeness (rate limiter) and health (circuit breaker)
    /// before every replay — the DFS re-navigates from scratch on each
    /// state visit, so this is the hot path those two guard.
    async fn navigate_to_state(&self, state: &CrawlState) -> anyhow::Result<bool> {
        let domain = super::rate_limiter::extract_domain(&self.start_url);
        if let Some(domain) = &domain {
            if !self.circuit_breaker.should_attempt(domain) {
                return Ok(false);
            }
            loop {
                match self.rate_limiter.check(&self.start_url, self.config.requests_per_second).await {
                    RateLimitDecision::Allow => break,
                    RateLimitDecision::Deny { retry_after } => tokio::time::sleep(retry_after).await,
                }
            }
        }

        let result = self.replay(state).await;
        if let Some(domain) = &domain {
            match &result {
                Ok(true) => self.circuit_breaker.record_success(domain),
                Ok(false) => self.circuit_breaker.record_failure(domain, "replay step failed"),
                Err(e) => self.circuit_breaker.record_failure(domain, &e.to_string()),
            }
        }
        result
    }

    async fn replay(&self, state: &CrawlState) -> anyhow::Result<bool> {
        self.driver.navigate(&self.start_url).await?;
        self.driver.dismiss_popups().await?;
        self.driver.wait_for_page_stable().await?;

        for entry in &state.path {
            let outcome = self
                .driver
                .execute_step(&Step::click(entry.selector.clone(), entry.selector.clone()))
                .await?;
            if !outcome.success {
                return Ok(false);
            }
            self.driver.wait_for_page_stable().await?;
        }
        Ok(true)
    }

    async fn capture_global_navigation(&mut self, _state: &CrawlState) -> anyhow::Result<()> {
        let dom_html = self.driver.dom_html().await?;
        let doc = Html::parse_document(&dom_html);
        for el in Self::clickable_candidates(&doc) {
            let view = ElementView::new(el);
            let text = view.visible_text();
            if !text.is_empty() {
                self.global_navigation_items.insert(text.to_lowercase());
            }
        }
        Ok(())
    }

    /// spec §4.4 step 2: new tabs opened by the previous click.
    /// Returns `true` if the caller should skip further exploration of
    /// this state (a form was found and the tab closed).
    async fn manage_new_tabs(&mut self, state: &CrawlState) -> anyhow::Result<bool> {
        let handles = self.driver.window_handles().await?;
        if handles.len() <= 1 {
            return Ok(false);
        }
        let main = handles[0].clone();
        let mut found = false;
        for handle in &handles[1..] {
            self.driver.switch_to_window(handle).await?;
            let url = self.driver.current_url().await?;
            if Self::is_same_origin(&url, &self.base_url) {
                let dom_html = self.driver.dom_html().await?;
                let doc = Html::parse_document(&dom_html);
                if self.page_has_form_fields(&doc).await? {
                    let form_name = self.resolve_form_name(&url).await?;
                    let before = self.discovered.len();
                    self.finalize_and_record(form_name, url, &state.path, state.depth, DiscoveryMethod::OpensInNewTab)
                        .await?;
                    found = found || self.discovered.len() > before;
                }
            }
            self.driver.close_window(handle).await?;
        }
        self.driver.switch_to_window(&main).await?;
        Ok(found)
    }

    /// spec §4.4 step 3: if the last step opened a dropdown, enqueue its
    /// items (each inheriting the opener annotation) instead of treating
    /// the page as a normal state.
    async fn handle_dropdown_if_opened(&mut self, state: &CrawlState, frontier: &mut Frontier) -> anyhow::Result<bool> {
        if state.path.is_empty() {
            return Ok(false);
        }
        let dom_html = self.driver.dom_html().await?;
        let doc = Html::parse_document(&dom_html);
        let Some(dropdown) = dom::find_open_dropdown(&doc) else {
            return Ok(false);
        };
        let mut items = dom::find_dropdown_items(&doc, dropdown);
        // Explore likely form-openers first: the stack pops from the
        // tail, so push them last.
        items.sort_by_key(|item| item.likely_opens_form);
        for item in items {
            let dedup_key = format!("{}|dropdown", item.text);
            if self.global_locators.contains(&dedup_key) {
                continue;
            }
            let new_state = state.dropdown_child(item.text.clone(), item.selector.clone());
            frontier.push(new_state);
            self.global_locators.insert(dedup_key);
        }
        Ok(true)
    }

    async fn page_has_form_fields(&mut self, doc: &Html) -> anyhow::Result<bool> {
        // Resolve uncertain submission-button text via the budget-gated
        // AI callback; textual whitelist/blacklist are checked first and
        // synchronously inside `dom::page_has_form_fields`.
        let button_selector = Selector::parse("button, input[type='submit'], input[type='button'], a[role='button']")
            .expect("static selector");
        let mut uncertain_texts = Vec::new();
        for button in doc.select(&button_selector) {
            let text = ElementView::new(button).visible_text();
            if dom::classify_submission_text(&text).is_none() {
                uncertain_texts.push(text);
            }
        }
        let mut verdicts = std::collections::HashMap::new();
        for text in uncertain_texts {
            if verdicts.contains_key(&text) {
                continue;
            }
            let verdict = self.ai.is_submission_button(&self.ctx, &text, None).await.unwrap_or(false);
            verdicts.insert(text, verdict);
        }
        Ok(dom::page_has_form_fields(doc, |text| {
            verdicts.get(text).copied().unwrap_or(false)
        }))
    }

    async fn record_direct_form_page(&mut self, state: &CrawlState) -> anyhow::Result<()> {
        let form_url = self.driver.current_url().await?;
        let form_name = self.resolve_form_name(&form_url).await?;
        if form_name.to_lowercase().contains("password") {
            return Ok(());
        }
        self.finalize_and_record(form_name, form_url, &state.path, state.depth, DiscoveryMethod::DirectFormPage)
            .await?;
        Ok(())
    }

    async fn resolve_form_name(&self, url: &str) -> anyhow::Result<String> {
        let existing: Vec<String> = self.discovered.iter().map(|f| f.form_name.clone()).collect();
        Ok(self.ai.extract_form_name(&self.ctx, url, &existing).await.unwrap_or_default())
    }

    /// spec §4.4 `_matches_target`: empty filter matches everything;
    /// otherwise substring match either direction. Also dedupes on
    /// `form_url` across the run.
    fn accept_form(&self, form_name: &str, form_url: &str) -> bool {
        if self.discovered.iter().any(|f| f.form_url == form_url) {
            return false;
        }
        if self.config.target_form_pages.is_empty() {
            return true;
        }
        let lower = form_name.to_lowercase();
        self.config
            .target_form_pages
            .iter()
            .any(|target| lower.contains(&target.to_lowercase()) || target.to_lowercase().contains(&lower))
    }

    /// spec §4.4 step 5 "Form-opening buttons": whitelist-matched, not in
    /// any table container; click each, classify the outcome.
    async fn click_form_opening_buttons(&mut self, state: &CrawlState, frontier: &mut Frontier) -> anyhow::Result<()> {
        let mut clicked_texts = HashSet::new();
        loop {
            let dom_html = self.driver.dom_html().await?;
            let doc = Html::parse_document(&dom_html);
            let candidates = Self::form_opening_buttons(&doc);
            let Some((text, selector)) = candidates.into_iter().find(|(t, _)| !clicked_texts.contains(t)) else {
                break;
            };
            clicked_texts.insert(text.clone());
            self.global_locators.insert(format!("{text}|{selector}"));

            let url_before = self.driver.current_url().await?;
            let outcome = self.driver.execute_step(&Step::click(selector.clone(), selector.clone())).await?;
            if !outcome.success {
                continue;
            }
            self.driver.wait_for_page_stable().await?;
            let url_after = self.driver.current_url().await?;

            if url_before != url_after {
                let child = state.child(text, selector, url_after);
                frontier.push(child);
                // Navigate back to re-find remaining buttons on the origin page.
                if !self.navigate_to_state(state).await? {
                    break;
                }
                continue;
            }

            let dom_html = self.driver.dom_html().await?;
            let doc = Html::parse_document(&dom_html);
            if dom::find_open_modal(&doc).is_some() && self.page_has_form_fields(&doc).await? {
                let form_name = self.resolve_form_name(&url_after).await?;
                self.finalize_and_record(form_name, url_after, &state.path, state.depth, DiscoveryMethod::IsModal)
                    .await?;
            }
        }
        Ok(())
    }

    /// spec §4.4 step 5 "Generic clickables", filtered and capped at ~50
    /// ordered by y-position. Static parse has no layout info, so
    /// document order stands in for y-position (elements are laid out in
    /// source order for the overwhelming majority of real pages).
    async fn enqueue_generic_clickables(&mut self, state: &CrawlState, doc: &Html, frontier: &mut Frontier) -> anyhow::Result<()> {
        let screenshot = self.driver.screenshot().await?;
        let ai_targets: HashSet<String> = self
            .ai
            .get_navigation_clickables(&self.ctx, &screenshot)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();

        let mut count = 0;
        for el in Self::clickable_candidates(doc) {
            if count >= 50 {
                break;
            }
            let view = ElementView::new(el);
            if view.is_hidden() || view.text_is_blacklisted() {
                continue;
            }
            let text = view.visible_text();
            if text.is_empty() {
                continue;
            }
            let text_lower = text.to_lowercase();
            if state.depth == 0 {
                // captured below for subsequent depths via global_navigation_items
            } else if self.global_navigation_items.contains(&text_lower) {
                continue;
            }
            if !ai_targets.is_empty() && !ai_targets.contains(&text_lower) {
                continue;
            }
            if state.is_circular(&text) {
                continue;
            }
            let selector = css_preferred_selector(doc, el);
            let unique_key = format!("{text}|{selector}");
            if self.global_locators.contains(&unique_key) {
                continue;
            }
            self.global_locators.insert(unique_key);
            count += 1;

            let child = state.child(text, selector, state.url.clone());
            frontier.push(child);
        }
        Ok(())
    }

    fn clickable_candidates(doc: &Html) -> Vec<scraper::ElementRef<'_>> {
        let Ok(selector) = Selector::parse("a, button, [onclick], [role='button'], [role='tab'], [role='menuitem']") else {
            return Vec::new();
        };
        doc.select(&selector).collect()
    }

    /// spec §4.4 step 5 whitelist match, not inside a table container.
    fn form_opening_buttons(doc: &Html) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for el in Self::clickable_candidates(doc) {
            let view = ElementView::new(el);
            if view.is_hidden() {
                continue;
            }
            let text = view.visible_text();
            if text.is_empty() || !dom::text_opens_form(&text) {
                continue;
            }
            if view.text_is_blacklisted() {
                continue;
            }
            if Self::is_inside_table(el) {
                continue;
            }
            out.push((text, unique_xpath(el)));
        }
        out
    }

    fn is_inside_table(el: scraper::ElementRef<'_>) -> bool {
        let mut node = Some(el);
        while let Some(n) = node {
            let value = n.value();
            let tag = value.name();
            if tag == "table" {
                return true;
            }
            if let Some(role) = value.attr("role") {
                if role == "table" || role == "grid" {
                    return true;
                }
            }
            if let Some(class) = value.attr("class") {
                if class.to_lowercase().ends_with("table") {
                    return true;
                }
            }
            node = n.parent_element();
        }
        false
    }

    fn is_same_origin(url: &str, base_url: &str) -> bool {
        let (Ok(a), Ok(b)) = (url::Url::parse(url), url::Url::parse(base_url)) else {
            return false;
        };
        a.host_str() == b.host_str()
    }

    fn path_to_steps(path: &[super::state::PathEntry]) -> Vec<Step> {
        path.iter().map(super::state::PathEntry::to_step).collect()
    }

    /// Shared tail for every discovery site (spec §4.4 "Minimization",
    /// "Verification"; §8: "verified at least once within 3 attempts").
    /// Shrinks `path` to the shortest subsequence that still reaches
    /// `form_url`, then replays it (repairing a failing step once) to
    /// confirm it, before recording the page under `discovery_method`.
    async fn finalize_and_record(
        &mut self,
        form_name: String,
        form_url: String,
        path: &[PathEntry],
        depth: u32,
        discovery_method: DiscoveryMethod,
    ) -> anyhow::Result<()> {
        if !self.accept_form(&form_name, &form_url) {
            return Ok(());
        }
        let minimized = minimize_path(&self.driver, &self.start_url, path).await?;
        let outcome =
            verify_and_fix_route(&self.driver, &self.domain_limiter, &self.start_url, &form_url, &minimized).await?;
        self.discovered.push(DiscoveredFormPage {
            form_name,
            form_url,
            navigation_steps: Self::path_to_steps(&outcome.path),
            depth,
            discovery_method,
            verified: outcome.verified,
            verification_attempts: outcome.attempts,
        });
        Ok(())
    }
}
