use serde::{Deserialize, Serialize};

/// Per-company mapper configuration (spec §4.5, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    pub max_retries: u32,
    pub use_full_dom: bool,
    pub use_optimized_dom: bool,
    pub use_forms_dom: bool,
    pub include_js_in_dom: bool,
    pub enable_junction_discovery: bool,
    pub max_junction_paths: u32,
    pub enable_ui_verification: bool,
    pub use_detect_fields_change: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            use_full_dom: true,
            use_optimized_dom: false,
            use_forms_dom: false,
            include_js_in_dom: true,
            enable_junction_discovery: true,
            max_junction_paths: 5,
            enable_ui_verification: true,
            use_detect_fields_change: true,
        }
    }
}
