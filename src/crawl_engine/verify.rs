//! Route verification (spec §4.4 "Route verification"): re-navigate a
//! discovered route up to three times, repairing the first step whose
//! selector no longer finds its element, and accept the route only if
//! the final URL matches the recorded `form_url` (trailing slash
//! tolerant). Grounded in `_verify_and_fix_form`/`_fix_failing_step`.

use std::sync::Arc;

use scraper::{Html, Selector};

use super::domain_limiter::DomainLimiter;
use super::driver::BrowserDriver;
use super::rate_limiter::extract_domain;
use super::selectors::css_preferred_selector;
use super::state::PathEntry;

const MAX_VERIFICATION_ATTEMPTS: u32 = 3;

pub struct VerificationOutcome {
    pub verified: bool,
    pub attempts: u32,
    pub path: Vec<PathEntry>,
}

/// Replays `path` from `start_url`, repairing the first failing step's
/// selector with `css_preferred_selector` on each retry, up to
/// [`MAX_VERIFICATION_ATTEMPTS`] times. `domain_limiter` caps how many
/// verification replays run concurrently against the same domain, since
/// callers typically verify every discovered route for a site at once.
pub async fn verify_and_fix_route(
    driver: &Arc<dyn BrowserDriver>,
    domain_limiter: &DomainLimiter,
    start_url: &str,
    expected_form_url: &str,
    path: &[PathEntry],
) -> anyhow::Result<VerificationOutcome> {
    let _permit = match extract_domain(start_url) {
        Some(domain) => Some(domain_limiter.acquire(domain).await),
        None => None,
    };
    let mut path = path.to_vec();

    for attempt in 1..=MAX_VERIFICATION_ATTEMPTS {
        driver.navigate(start_url).await?;
        driver.dismiss_popups().await?;
        driver.wait_for_page_stable().await?;

        let mut failed_step = None;
        for (i, entry) in path.iter().enumerate() {
            let outcome = driver.execute_step(&entry.to_step()).await?;
            if !outcome.success {
                failed_step = Some(i);
                break;
            }
            driver.wait_for_page_stable().await?;
        }

        if failed_step.is_none() {
            driver.wait_for_page_stable().await?;
            let current_url = driver.current_url().await?;
            if urls_match(&current_url, expected_form_url) {
                return Ok(VerificationOutcome {
                    verified: true,
                    attempts: attempt,
                    path,
                });
            }
            failed_step = Some(path.len().saturating_sub(1));
        }

        let Some(failed_index) = failed_step else {
            continue;
        };
        if attempt == MAX_VERIFICATION_ATTEMPTS {
            break;
        }
        if !fix_failing_step(driver, start_url, &mut path, failed_index).await? {
            break;
        }
    }

    Ok(VerificationOutcome {
        verified: false,
        attempts: MAX_VERIFICATION_ATTEMPTS,
        path,
    })
}

fn urls_match(a: &str, b: &str) -> bool {
    a == b || a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Re-navigates to the step before `failed_index`, then re-finds the
/// failing step's element by its locator text and replaces its selector.
async fn fix_failing_step(
    driver: &Arc<dyn BrowserDriver>,
    start_url: &str,
    path: &mut [PathEntry],
    failed_index: usize,
) -> anyhow::Result<bool> {
    driver.navigate(start_url).await?;
    driver.dismiss_popups().await?;
    driver.wait_for_page_stable().await?;

    for entry in &path[..failed_index] {
        let outcome = driver.execute_step(&entry.to_step()).await?;
        if !outcome.success {
            return Ok(false);
        }
        driver.wait_for_page_stable().await?;
    }

    let text = path[failed_index].text.clone();
    let dom_html = driver.dom_html().await?;
    let doc = Html::parse_document(&dom_html);
    let Some(element) = find_by_text(&doc, &text) else {
        return Ok(false);
    };
    path[failed_index].selector = css_preferred_selector(&doc, element);
    Ok(true)
}

fn find_by_text<'a>(doc: &'a Html, text: &str) -> Option<scraper::ElementRef<'a>> {
    let selector = Selector::parse("a, button, input, select, textarea, [role='menuitem'], li").ok()?;
    doc.select(&selector).find(|el| {
        el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ") == text
    })
}
