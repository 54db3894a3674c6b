//! Shared entity types for the form-mapper control plane.
//!
//! These are the semantic types the five components pass between each
//! other and persist; see each submodule for ownership notes.

mod agent;
mod company;
mod crawl_session;
mod form_route;
mod network;
mod step;
mod task;
mod usage;

pub use agent::{Agent, AgentStatus};
pub use company::{AccessModel, AccessStatus, Company, Subscription};
pub use crawl_session::{CrawlSessionRecord, CrawlSessionStatus};
pub use form_route::{build_hierarchy, FormPageRoute, ProjectFormHierarchy};
pub use network::Network;
pub use step::{Step, StepAction};
pub use task::{AgentTask, TaskStatus, TaskType};
pub use usage::{ApiUsage, OperationType};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype wrapper resolving the source's int/string `product_id`
/// inconsistency (see DESIGN.md) to a single integer representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub u32);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompanyId(pub uuid::Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub uuid::Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub uuid::Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrawlSessionId(pub uuid::Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub uuid::Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormRouteId(pub uuid::Uuid);
