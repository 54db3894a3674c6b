use serde::{Deserialize, Serialize};

use super::{NetworkId, ProjectId, Step};

/// Out-of-scope CRUD target (spec §1): only the shape this system reads
/// matters. Carries the authoritative `login_stages`/`logout_stages`
/// lists the Mapper Orchestrator drives through on a session's behalf
/// (spec §4.5 "Logging in", §6.4 "Persisted state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub project_id: ProjectId,
    pub base_url: String,
    pub login_stages: Vec<Step>,
    pub logout_stages: Vec<Step>,
}
