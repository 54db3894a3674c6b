//! Frontier/path-key identity (spec §3, §4.4, §9) and the DOM
//! classifiers against literal HTML fixtures, plus the politeness
//! primitives (`rate_limiter`, `circuit_breaker`, `domain_limiter`) now
//! wired into `explorer`/`verify`.

use std::time::Duration;

use form_mapper_control_plane::crawl_engine::dom::{
    classify_submission_text, fields_changed, find_dropdown_items, find_open_dropdown,
    find_open_modal, page_has_form_fields, snapshot_fields, text_opens_form,
};
use form_mapper_control_plane::crawl_engine::{CircuitBreaker, CrawlRateLimiter, CrawlState, DomainLimiter, Frontier, RateLimitDecision};
use scraper::Html;

#[test]
fn path_key_identifies_states_reached_by_the_same_clicks() {
    let root = CrawlState::root("https://app.example.com/");
    let via_click = root.child("Add Employee", "#add-emp", "https://app.example.com/#spa");
    let via_back_then_same_click = root.child("Add Employee", "#add-emp", "https://app.example.com/#different-pseudo-url");

    assert_eq!(via_click.path_key(), via_back_then_same_click.path_key());
    assert_ne!(via_click.url, via_back_then_same_click.url);
}

#[test]
fn is_circular_detects_a_repeated_click_text_on_the_same_path() {
    let root = CrawlState::root("https://app.example.com/");
    let one_level = root.child("Reports", "#reports", "https://app.example.com/reports");
    assert!(!one_level.is_circular("Add Employee"));
    assert!(one_level.is_circular("Reports"));
}

#[test]
fn dropdown_child_marks_the_opener_without_detaching_it_from_its_item() {
    let root = CrawlState::root("https://app.example.com/");
    let opened = root.child("Actions", "#actions-btn", "https://app.example.com/");
    let picked = opened.dropdown_child("Rate Employee", "li:nth-child(2)");

    assert!(picked.path[0].opens_dropdown, "the opener entry must be flagged");
    assert_eq!(picked.path.len(), 2);
    assert_eq!(picked.path[1].text, "Rate Employee");
}

#[test]
fn frontier_pops_children_before_siblings_depth_first() {
    let root = CrawlState::root("https://app.example.com/");
    let mut frontier = Frontier::new(root.clone());

    let branch_a = root.child("A", "#a", "https://app.example.com/a");
    let branch_b = root.child("B", "#b", "https://app.example.com/b");
    frontier.pop();
    frontier.push(branch_a.clone());
    frontier.push(branch_b.clone());

    let leaf_of_b = branch_b.child("B1", "#b1", "https://app.example.com/b/1");
    frontier.push(leaf_of_b.clone());

    assert_eq!(frontier.pop().unwrap().path_key(), leaf_of_b.path_key());
    assert_eq!(frontier.pop().unwrap().path_key(), branch_a.path_key());
    assert!(frontier.is_empty());
}

const FORM_PAGE_HTML: &str = r#"
<html><body>
  <form>
    <input id="name" type="text" />
    <select id="dept"><option>Eng</option></select>
    <div class="actions">
      <button id="save-btn">Save Employee</button>
    </div>
  </form>
</body></html>
"#;

const NO_SUBMIT_BUTTON_HTML: &str = r#"
<html><body>
  <form>
    <input id="name" type="text" />
  </form>
</body></html>
"#;

#[test]
fn page_has_form_fields_requires_a_nearby_submission_button() {
    let doc = Html::parse_document(FORM_PAGE_HTML);
    assert!(page_has_form_fields(&doc, |_| false));

    let doc_no_button = Html::parse_document(NO_SUBMIT_BUTTON_HTML);
    assert!(!page_has_form_fields(&doc_no_button, |_| false));
}

#[test]
fn submission_classifier_prefers_whitelist_over_uncertain_fallback() {
    assert_eq!(classify_submission_text("Save"), Some(true));
    assert_eq!(classify_submission_text("Cancel"), Some(false));
    assert_eq!(classify_submission_text("Proceed"), None);
}

#[test]
fn text_opens_form_matches_configured_keywords_case_insensitively() {
    assert!(text_opens_form("+ Add Employee"));
    assert!(text_opens_form("REGISTER NOW"));
    assert!(!text_opens_form("Log out"));
}

const OPEN_DROPDOWN_HTML: &str = r#"
<html><body>
  <ul class="dropdown-menu show">
    <li><a href="#">Rate Employee</a></li>
    <li><a href="#">Upgrade Plan</a></li>
    <li hidden><a href="#">Hidden Item</a></li>
  </ul>
</body></html>
"#;

#[test]
fn dropdown_items_exclude_hidden_and_blacklisted_entries() {
    let doc = Html::parse_document(OPEN_DROPDOWN_HTML);
    let dropdown = find_open_dropdown(&doc).expect("dropdown should be detected as open");
    let items = find_dropdown_items(&doc, dropdown);

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "Rate Employee");
    assert!(items[0].likely_opens_form);
}

const MODAL_HTML: &str = r#"<html><body><div role="dialog">Confirm?</div></body></html>"#;

#[test]
fn find_open_modal_matches_role_dialog() {
    let doc = Html::parse_document(MODAL_HTML);
    assert!(find_open_modal(&doc).is_some());
}

#[test]
fn fields_changed_detects_a_newly_appeared_field_and_large_element_deltas() {
    let before_doc = Html::parse_document(NO_SUBMIT_BUTTON_HTML);
    let after_doc = Html::parse_document(FORM_PAGE_HTML);
    let before = snapshot_fields(&before_doc);
    let after = snapshot_fields(&after_doc);

    assert!(fields_changed(&before, &after, 2, 2));
    assert!(!fields_changed(&before, &before, 2, 2));
}

#[tokio::test]
async fn rate_limiter_denies_bursts_above_the_configured_rate() {
    let limiter = CrawlRateLimiter::new();
    let url = "https://slow-site.example.com/form";

    let mut allowed = 0;
    let mut denied = 0;
    for _ in 0..5 {
        match limiter.check(url, 1.0).await {
            RateLimitDecision::Allow => allowed += 1,
            RateLimitDecision::Deny { .. } => denied += 1,
        }
    }
    assert!(allowed >= 1);
    assert!(denied >= 1, "a 1 req/s limit should deny some of 5 back-to-back checks");
}

#[test]
fn circuit_breaker_opens_after_threshold_failures_and_blocks_new_attempts() {
    let breaker = CircuitBreaker::new(3, 1, Duration::from_secs(30));
    let domain = "flaky-site.example.com";

    assert!(breaker.should_attempt(domain));
    for _ in 0..3 {
        breaker.record_failure(domain, "navigation timeout");
    }
    assert!(!breaker.should_attempt(domain));
}

#[test]
fn circuit_breaker_stays_closed_under_the_failure_threshold() {
    let breaker = CircuitBreaker::new(3, 1, Duration::from_secs(30));
    let domain = "mostly-fine.example.com";
    breaker.record_failure(domain, "one-off blip");
    assert!(breaker.should_attempt(domain));
}

#[tokio::test]
async fn domain_limiter_caps_concurrent_permits_per_domain() {
    let limiter = std::sync::Arc::new(DomainLimiter::new(1));
    let _first = limiter.acquire("example.com".to_string()).await;

    let limiter2 = limiter.clone();
    let second_attempt = tokio::time::timeout(Duration::from_millis(50), async move {
        limiter2.acquire("example.com".to_string()).await
    })
    .await;
    assert!(second_attempt.is_err(), "a second permit on a max_per_domain=1 limiter should not be granted while the first is held");
}
