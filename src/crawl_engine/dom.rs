//! Static DOM inspection: the element whitelist/blacklist, dropdown and
//! modal detection, form-field-present check, and field-change detection
//! (spec §4.4). Operates on a `scraper::Html` parse of the driver's
//! `dom_html()`; the one fact static parsing can't answer (real computed
//! visibility) comes from `BrowserDriver::is_visible`.

use scraper::{ElementRef, Html, Selector};

/// Buttons whose visible text opens a form (spec §4.4 step 5, "Form-opening
/// buttons"). Checked as a substring match against lowercased text.
pub const FORM_OPENING_KEYWORDS: &[&str] = &[
    "add", "create", "new", "insert", "edit", "modify", "change", "revise", "amend", "rate",
    "review", "feedback", "survey", "open", "start", "begin", "launch", "assign", "register",
    "sign up", "signup", "join", "enroll", "subscribe", "apply", "file", "claim", "request",
    "pay", "transfer", "deposit", "withdraw", "buy", "purchase", "donate", "invest", "book",
    "reserve", "schedule", "send message", "contact", "share", "invite", "comment", "reply",
    "+", "➕",
];

/// Elements whose text rules them out pre-click (spec §4.4 "Blacklist").
pub const BUTTON_BLACKLIST: &[&str] = &[
    "upgrade", "pricing", "checkout", "order", "logout", "log out", "sign out", "about", "help",
    "support", "contact", "faq", "documentation", "docs", "tutorial", "guide", "feedback",
    "report", "terms", "privacy", "download", "export", "import", "print", "share", "save as",
    "copy", "delete", "remove", "cancel", "close", "reset", "clear", "clean", "facebook",
    "twitter", "linkedin", "instagram", "youtube", "social", "follow", "like", "subscribe",
    "preferences", "settings", "profile", "account", "notifications", "password",
    "change password", "update password", "reset password", "forgot password", "new password",
    "back", "home", "previous", "next page", "search", "filter", "×", "✓", "✕", "dismiss",
];

/// Whitelist for the submission-button classifier (spec §4.4).
pub const SUBMISSION_WHITELIST: &[&str] = &[
    "submit", "save", "update", "create", "send", "transfer", "register", "pay", "subscribe",
    "donate",
];

/// CSS patterns an opened dropdown/menu matches (spec §4.4 step 3).
pub const DROPDOWN_SELECTORS: &[&str] = &[
    ".dropdown-menu.show",
    ".oxd-dropdown-menu",
    ".MuiMenu-paper",
    ".MuiPopover-paper",
    "[role='menu']",
    "ul.menu.open",
    "ul.submenu",
    ".nav-dropdown.active",
];

/// CSS patterns an opened modal/dialog matches (spec §4.4 step 5).
pub const MODAL_SELECTORS: &[&str] = &[
    ".modal.show",
    ".modal.in",
    "[role='dialog']",
    ".dialog[open]",
    ".popup",
    ".overlay.active",
    ".ant-modal-wrap",
    ".MuiDialog-root",
];

/// Container elements that disqualify a form-opening button candidate
/// (spec §4.4: "AND are not inside any table container").
pub const TABLE_CONTAINER_SELECTORS: &[&str] = &["table", "[role='table']", "[role='grid']"];

/// Thin wrapper over `scraper::ElementRef` exposing the visibility and
/// text rules the spec names directly (§3 `CrawlState`'s field-change
/// detection, §4.4).
pub struct ElementView<'a> {
    pub el: ElementRef<'a>,
}

impl<'a> ElementView<'a> {
    #[must_use]
    pub fn new(el: ElementRef<'a>) -> Self {
        Self { el }
    }

    /// Visible text, collapsing internal whitespace (spec: `visible_text`).
    #[must_use]
    pub fn visible_text(&self) -> String {
        self.el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Static-only hidden check (spec §4.4 "Field-change detection"):
    /// `type='hidden'`, inline `display:none`/`visibility:hidden`, a class
    /// containing `hidden`, the `hidden` attribute, `aria-hidden='true'`,
    /// or any ancestor up to `<body>` matching one of those.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        let mut current = Some(self.el);
        while let Some(node) = current {
            if Self::node_hides_itself(node) {
                return true;
            }
            if node.value().name() == "body" {
                break;
            }
            current = node.parent_element();
        }
        false
    }

    fn node_hides_itself(node: ElementRef<'_>) -> bool {
        let value = node.value();
        if value.attr("type") == Some("hidden") {
            return true;
        }
        if value.attr("hidden").is_some() {
            return true;
        }
        if value.attr("aria-hidden") == Some("true") {
            return true;
        }
        if let Some(style) = value.attr("style") {
            let style = style.to_lowercase();
            if style.contains("display:none") || style.contains("display: none") {
                return true;
            }
            if style.contains("visibility:hidden") || style.contains("visibility: hidden") {
                return true;
            }
        }
        if let Some(class) = value.attr("class") {
            if class.to_lowercase().contains("hidden") {
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn text_is_blacklisted(&self) -> bool {
        text_is_blacklisted(&self.visible_text())
    }
}

#[must_use]
pub fn text_is_blacklisted(text: &str) -> bool {
    let lower = text.to_lowercase();
    BUTTON_BLACKLIST.iter().any(|blocked| lower.contains(blocked))
}

#[must_use]
pub fn text_opens_form(text: &str) -> bool {
    let lower = text.to_lowercase();
    FORM_OPENING_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Submission-button classifier, textual half of spec §4.4's rule (a):
/// present in whitelist; (b): not in blacklist. The AI-augmented
/// uncertain-case fallback lives in the orchestrator, which calls
/// `AiBroker::is_submission_button` when this returns `None`.
#[must_use]
pub fn classify_submission_text(text: &str) -> Option<bool> {
    let lower = text.to_lowercase();
    if text_is_blacklisted(&lower) {
        return Some(false);
    }
    if SUBMISSION_WHITELIST.iter().any(|w| lower.contains(w)) {
        return Some(true);
    }
    None
}

fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// spec §4.4 step 3: is a dropdown/menu currently open in the DOM.
/// Visibility (display + non-zero height) is a driver fact; callers
/// combine this structural match with `BrowserDriver::is_visible`.
#[must_use]
pub fn find_open_dropdown<'a>(doc: &'a Html) -> Option<ElementRef<'a>> {
    for css in DROPDOWN_SELECTORS {
        if let Some(el) = select_all(doc, css).into_iter().find(|e| !ElementView::new(*e).is_hidden()) {
            return Some(el);
        }
    }
    None
}

#[must_use]
pub fn find_open_modal<'a>(doc: &'a Html) -> Option<ElementRef<'a>> {
    for css in MODAL_SELECTORS {
        if let Some(el) = select_all(doc, css)
            .into_iter()
            .find(|e| !ElementView::new(*e).is_hidden() && !ElementView::new(*e).visible_text().is_empty())
        {
            return Some(el);
        }
    }
    None
}

/// One candidate clickable item inside an open dropdown (spec §4.4 step 3).
pub struct DropdownItem {
    pub text: String,
    pub selector: String,
    pub likely_opens_form: bool,
}

/// spec §4.4 step 3: items inside the dropdown located by `find_open_dropdown`.
/// `doc` is needed to verify the CSS selector's uniqueness for each item.
#[must_use]
pub fn find_dropdown_items<'a>(doc: &Html, dropdown: ElementRef<'a>) -> Vec<DropdownItem> {
    let item_selector = Selector::parse("a, button, li[onclick], [role='menuitem'], li").ok();
    let Some(item_selector) = item_selector else {
        return Vec::new();
    };
    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();
    for item in dropdown.select(&item_selector) {
        let view = ElementView::new(item);
        if view.is_hidden() {
            continue;
        }
        let text = view.visible_text();
        if text.is_empty() || text.len() > 50 {
            continue;
        }
        if view.text_is_blacklisted() {
            continue;
        }
        let key = text.to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        items.push(DropdownItem {
            likely_opens_form: text_opens_form(&text),
            selector: super::selectors::css_preferred_selector(doc, item),
            text,
        });
    }
    items
}

/// spec "Form-field-present check": the DOM has form fields + submission
/// button iff >=1 visible non-hidden input/select/textarea AND >=1 visible
/// submission-classified button AND the button shares a common ancestor
/// within 10 levels with some visible input. `uncertain_is_submission` is
/// consulted for buttons the textual classifier can't resolve; resolves
/// Open Question #2 by failing closed (no exception fallback exists in a
/// typed rewrite) — see DESIGN.md.
pub fn page_has_form_fields(doc: &Html, mut uncertain_is_submission: impl FnMut(&str) -> bool) -> bool {
    let field_selector = match Selector::parse("input, select, textarea") {
        Ok(s) => s,
        Err(_) => return false,
    };
    let visible_fields: Vec<ElementRef<'_>> = doc
        .select(&field_selector)
        .filter(|e| !ElementView::new(*e).is_hidden())
        .collect();
    if visible_fields.is_empty() {
        return false;
    }

    let button_selector = match Selector::parse("button, input[type='submit'], input[type='button'], a[role='button']") {
        Ok(s) => s,
        Err(_) => return false,
    };

    for button in doc.select(&button_selector) {
        let view = ElementView::new(button);
        if view.is_hidden() {
            continue;
        }
        let text = view.visible_text();
        let is_submission = match classify_submission_text(&text) {
            Some(verdict) => verdict,
            None => uncertain_is_submission(&text),
        };
        if !is_submission {
            continue;
        }
        if visible_fields.iter().any(|field| shares_ancestor_within(*field, button, 10)) {
            return true;
        }
    }
    false
}

/// Whether `a` and `b` share a common ancestor within `max_levels` steps
/// up from each (spec's form-field-present check).
fn shares_ancestor_within(a: ElementRef<'_>, b: ElementRef<'_>, max_levels: usize) -> bool {
    let mut a_ancestors = std::collections::HashSet::new();
    let mut node = Some(a);
    for _ in 0..=max_levels {
        let Some(n) = node else { break };
        a_ancestors.insert(n.id());
        node = n.parent_element();
    }
    let mut node = Some(b);
    for _ in 0..=max_levels {
        let Some(n) = node else { break };
        if a_ancestors.contains(&n.id()) {
            return true;
        }
        node = n.parent_element();
    }
    false
}

/// Per-field visibility snapshot for field-change detection (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSnapshot {
    pub id: String,
    pub tag: String,
    pub field_type: Option<String>,
    pub is_hidden: bool,
}

#[must_use]
pub fn snapshot_fields(doc: &Html) -> Vec<FieldSnapshot> {
    let Ok(selector) = Selector::parse("input, select, textarea") else {
        return Vec::new();
    };
    doc.select(&selector)
        .enumerate()
        .map(|(idx, el)| {
            let view = ElementView::new(el);
            let value = el.value();
            let id = value
                .attr("id")
                .or_else(|| value.attr("name"))
                .map_or_else(|| format!("anon-{idx}"), ToString::to_string);
            FieldSnapshot {
                id,
                tag: value.name().to_string(),
                field_type: value.attr("type").map(ToString::to_string),
                is_hidden: view.is_hidden(),
            }
        })
        .collect()
}

/// Total visible element count, used for the >30% delta heuristic.
#[must_use]
pub fn total_element_count(doc: &Html) -> usize {
    let Ok(selector) = Selector::parse("*") else {
        return 0;
    };
    doc.select(&selector).count()
}

/// Whether the DOM changed meaningfully between two snapshots (spec
/// §4.4 "Field-change detection"): any field added, visible->hidden,
/// hidden->visible, or a >30% total-element-count delta. Advisory only.
#[must_use]
pub fn fields_changed(before: &[FieldSnapshot], after: &[FieldSnapshot], before_count: usize, after_count: usize) -> bool {
    let before_by_id: std::collections::HashMap<_, _> = before.iter().map(|f| (f.id.as_str(), f)).collect();
    for field in after {
        match before_by_id.get(field.id.as_str()) {
            None => return true,
            Some(prior) if prior.is_hidden != field.is_hidden => return true,
            _ => {}
        }
    }
    if before_count > 0 {
        let delta = (after_count as f64 - before_count as f64).abs() / before_count as f64;
        if delta > 0.30 {
            return true;
        }
    }
    false
}
