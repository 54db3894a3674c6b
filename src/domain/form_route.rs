use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FormRouteId, NetworkId, ProjectId};
use super::step::Step;

/// Server-owned, written once by C4 via C5; only `last_verified_at` and
/// `verification_attempts` are mutated afterward (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormPageRoute {
    pub id: FormRouteId,
    pub project_id: ProjectId,
    pub network_id: NetworkId,
    pub crawl_session_id: super::CrawlSessionId,
    pub form_name: String,
    pub url: String,
    pub login_url: Option<String>,
    pub username: Option<String>,
    pub navigation_steps: Vec<Step>,
    pub id_fields: Vec<String>,
    pub parent_fields: Vec<String>,
    pub is_root: bool,
    pub parent_form_route_id: Option<FormRouteId>,
    pub verification_attempts: u32,
    pub last_verified_at: Option<DateTime<Utc>>,
}

impl FormPageRoute {
    /// `is_root` must be kept consistent with `parent_fields` emptiness.
    #[must_use]
    pub fn compute_is_root(parent_fields: &[String]) -> bool {
        parent_fields.is_empty()
    }

    /// Normalizes a URL to `path+host, sans query/fragment` for the
    /// per-project uniqueness invariant (spec §3, §8).
    #[must_use]
    pub fn normalize_url(url: &str) -> String {
        match url::Url::parse(url) {
            Ok(mut parsed) => {
                parsed.set_query(None);
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        }
    }
}

/// Forms a forest over a project's `FormPageRoute`s; rebuilt atomically
/// after each crawl completes (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFormHierarchy {
    pub project_id: ProjectId,
    pub form_id: FormRouteId,
    pub parent_form_id: Option<FormRouteId>,
}

/// Rebuilds a project's form forest from its current `FormPageRoute`s
/// (spec §3 "Rebuilt atomically after each crawl completes"). A route
/// whose `parent_form_route_id` is absent from `routes` (e.g. it belonged
/// to a prior, now-superseded crawl) is treated as a root.
#[must_use]
pub fn build_hierarchy(project_id: ProjectId, routes: &[FormPageRoute]) -> Vec<ProjectFormHierarchy> {
    let ids: std::collections::HashSet<FormRouteId> = routes.iter().map(|r| r.id).collect();
    routes
        .iter()
        .map(|r| ProjectFormHierarchy {
            project_id,
            form_id: r.id,
            parent_form_id: r.parent_form_route_id.filter(|p| ids.contains(p)),
        })
        .collect()
}
