//! Selector generation (spec §4.4 "Selector quality").
//!
//! Two generators, grounded in `_get_unique_selector`/`_get_css_preferred_selector`:
//! `unique_xpath` always produces a full, positional XPath from `/html`,
//! used while the crawler is still exploring (doesn't need to survive a
//! page layout change). `css_preferred_selector` is used once a route is
//! finalized for storage, preferring ID > data-test* > `[name=...]` >
//! tag+class, falling back to XPath with the `xpath:` prefix.

use scraper::{ElementRef, Html, Selector};

/// Full positional XPath from `/html`, as `_get_unique_selector` builds it.
/// Ancestors are not anchored on IDs — positional indices throughout, so
/// the same selector keeps working as the crawler re-navigates a page
/// whose subtree hasn't changed shape.
#[must_use]
pub fn unique_xpath(el: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(el);
    while let Some(node) = current {
        let tag = node.value().name().to_lowercase();
        if tag == "html" {
            segments.push("html".to_string());
            break;
        }
        let index = sibling_index_of_same_tag(node);
        segments.push(format!("{tag}[{index}]"));
        current = node.parent_element();
    }
    segments.reverse();
    format!("xpath=/{}", segments.join("/"))
}

/// 1-based position of `node` among same-tag siblings under its parent.
fn sibling_index_of_same_tag(node: ElementRef<'_>) -> usize {
    let Some(parent) = node.parent_element() else {
        return 1;
    };
    let tag = node.value().name();
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| sibling.value().name() == tag)
        .position(|sibling| sibling == node)
        .map_or(1, |pos| pos + 1)
}

/// CSS-preferred selector for finalized storage (spec §4.4). Verifies
/// tag+class uniqueness against `doc` before accepting it; falls back to
/// `unique_xpath` with the `xpath:` prefix (not `xpath=`) per spec §3's
/// distinction between the two XPath prefixes.
#[must_use]
pub fn css_preferred_selector(doc: &Html, el: ElementRef<'_>) -> String {
    let value = el.value();

    if let Some(id) = value.attr("id") {
        if !id.is_empty() {
            return format!("#{id}");
        }
    }

    for attr in ["data-test", "data-testid", "data-automation-id", "name"] {
        if let Some(v) = value.attr(attr) {
            if !v.is_empty() {
                return format!("[{attr}='{v}']");
            }
        }
    }

    if let Some(classes) = value.attr("class") {
        let unique_classes: Vec<&str> = classes.split_whitespace().filter(|c| !c.is_empty() && c.len() < 30).take(3).collect();
        if !unique_classes.is_empty() {
            let candidate = format!("{}.{}", value.name(), unique_classes.join("."));
            if let Ok(sel) = Selector::parse(&candidate) {
                if doc.select(&sel).count() == 1 {
                    return candidate;
                }
            }
        }
    }

    unique_xpath(el).replacen("xpath=", "xpath:", 1)
}
