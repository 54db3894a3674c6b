//! Explicit-stack DFS frontier and path-key state identity (spec §3
//! `CrawlState`, §4.4 "Exploration model", §9 "Cyclic navigation").

use crate::domain::Step;

/// One clicked entry along a `CrawlState`'s path. Distinct from the
/// persisted `domain::Step`: it carries the human-readable `text` the
/// path-key is built from and the dropdown-opener annotation path
/// minimization relies on (spec §4.4 step 3, §8 scenario 5).
#[derive(Debug, Clone)]
pub struct PathEntry {
    pub text: String,
    pub selector: String,
    /// Set on the step that opened a dropdown, so minimization never
    /// strips the opener separately from the item it revealed.
    pub opens_dropdown: bool,
}

impl PathEntry {
    #[must_use]
    pub fn to_step(&self) -> Step {
        let mut step = Step::click(self.selector.clone(), self.selector.clone());
        step.field_name = Some(self.text.clone());
        step
    }
}

/// One frontier entry: url-at-entry, path so far, depth (spec §3).
/// Equivalent states are identified by `path_key`, not by URL, since SPAs
/// don't always change the URL on navigation (spec §4.4).
#[derive(Debug, Clone)]
pub struct CrawlState {
    pub url: String,
    pub path: Vec<PathEntry>,
    pub depth: u32,
}

impl CrawlState {
    #[must_use]
    pub fn root(start_url: impl Into<String>) -> Self {
        Self {
            url: start_url.into(),
            path: Vec::new(),
            depth: 0,
        }
    }

    /// The deduplication key: clicked texts joined by `" > "`. Two states
    /// reaching the same sequence of labelled clicks are equivalent even
    /// if a "Back" button returns to an already-visited point (spec §9).
    #[must_use]
    pub fn path_key(&self) -> String {
        if self.path.is_empty() {
            return self.url.clone();
        }
        self.path.iter().map(|e| e.text.as_str()).collect::<Vec<_>>().join(" > ")
    }

    /// A child state for a regular click.
    #[must_use]
    pub fn child(&self, text: impl Into<String>, selector: impl Into<String>, url: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(PathEntry {
            text: text.into(),
            selector: selector.into(),
            opens_dropdown: false,
        });
        Self {
            url: url.into(),
            path,
            depth: self.depth + 1,
        }
    }

    /// Marks the last entry on `self`'s path (the step that produced this
    /// state) as a dropdown opener, then appends `item_text` as a child.
    #[must_use]
    pub fn dropdown_child(&self, item_text: impl Into<String>, item_selector: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            last.opens_dropdown = true;
        }
        let trigger = path.last().map_or_else(String::new, |e| e.text.clone());
        let item_text = item_text.into();
        let pseudo_url = format!("{}#dropdown#{trigger}#{item_text}", self.url);
        path.push(PathEntry {
            text: item_text,
            selector: item_selector.into(),
            opens_dropdown: false,
        });
        Self {
            url: pseudo_url,
            path,
            depth: self.depth + 1,
        }
    }

    /// Whether `candidate_text` would make this state's path circular
    /// (spec §9: "skips re-enqueueing circular steps").
    #[must_use]
    pub fn is_circular(&self, candidate_text: &str) -> bool {
        self.path.iter().any(|e| e.text == candidate_text)
    }
}

/// Explicit stack frontier; DFS pops from the tail so children are
/// explored before siblings (spec §4.4, §9: "implement the frontier as
/// an explicit stack of value-type `CrawlState` records; do not rely on
/// closure capture").
#[derive(Debug, Default)]
pub struct Frontier {
    stack: Vec<CrawlState>,
}

impl Frontier {
    #[must_use]
    pub fn new(initial: CrawlState) -> Self {
        Self { stack: vec![initial] }
    }

    pub fn push(&mut self, state: CrawlState) {
        self.stack.push(state);
    }

    pub fn pop(&mut self) -> Option<CrawlState> {
        self.stack.pop()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
