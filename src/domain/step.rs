use serde::{Deserialize, Serialize};

/// The driver action vocabulary (spec §3, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Click,
    Fill,
    Select,
    Check,
    Uncheck,
    Hover,
    Scroll,
    Wait,
    PressKey,
    SwitchToFrame,
    SwitchToShadowRoot,
    SwitchToDefault,
    SwitchToWindow,
    SwitchToParentWindow,
    Slider,
    DragAndDrop,
    Verify,
    Navigate,
    Refresh,
    CreateFile,
    UploadFile,
}

/// Junction metadata paired on the step that *opened* a dropdown, so
/// path minimization never strips the opener separately from its item
/// (spec §4.4 step 3, §8 scenario 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunctionInfo {
    pub trigger_selector: String,
    pub item_text: String,
}

/// One immutable driver operation in a route (spec §3 "Step").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub action: StepAction,
    /// CSS, or XPath prefixed `xpath:`/`xpath=`/starting with `/` or `//`.
    pub selector: Option<String>,
    pub value: Option<String>,
    pub field_name: Option<String>,
    /// Fallback full XPath, mandatory for every action except `verify`.
    pub full_xpath: Option<String>,
    #[serde(default)]
    pub force_regenerate: bool,
    #[serde(default)]
    pub dont_regenerate: bool,
    #[serde(default)]
    pub is_junction: bool,
    pub junction_info: Option<JunctionInfo>,
    /// Identifier assigned by the "assigning test cases" AI step once a
    /// session's final steps are known (spec §4.5); unset on every step
    /// before that point.
    #[serde(default)]
    pub test_case_id: Option<String>,
}

impl Step {
    #[must_use]
    pub fn click(selector: impl Into<String>, full_xpath: impl Into<String>) -> Self {
        Self {
            action: StepAction::Click,
            selector: Some(selector.into()),
            value: None,
            field_name: None,
            full_xpath: Some(full_xpath.into()),
            force_regenerate: false,
            dont_regenerate: false,
            is_junction: false,
            junction_info: None,
            test_case_id: None,
        }
    }

    /// Whether `selector` addresses an XPath expression at the driver
    /// boundary (spec §6.3 selector rules).
    #[must_use]
    pub fn is_xpath_selector(selector: &str) -> bool {
        selector.starts_with('/')
            || selector.starts_with("xpath:")
            || selector.starts_with("xpath=")
    }
}
