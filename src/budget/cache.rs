//! TTL-cached access classification and budget snapshots.
//!
//! Modeled on the teacher's `crawl_engine::rate_limiter` DashMap-plus-
//! `Instant` pattern: readers accept up to one TTL's worth of staleness
//! in exchange for not taking a row lock on every admission check.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::{CompanyId, ProductId};

/// Access mode as classified from the Company row (spec §4.1 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Byok,
    EarlyAccess,
    Legacy,
}

#[derive(Clone)]
struct Cached<T> {
    value: T,
    at: Instant,
}

/// `BUDGET_CACHE_TTL` in the original service.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

pub struct BudgetCache {
    access: DashMap<CompanyId, Cached<AccessMode>>,
    budget: DashMap<(CompanyId, ProductId), Cached<(f64, f64)>>,
}

impl Default for BudgetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access: DashMap::new(),
            budget: DashMap::new(),
        }
    }

    #[must_use]
    pub fn get_access(&self, company_id: CompanyId) -> Option<AccessMode> {
        self.access.get(&company_id).and_then(|entry| {
            if entry.at.elapsed() < CACHE_TTL {
                Some(entry.value)
            } else {
                None
            }
        })
    }

    pub fn put_access(&self, company_id: CompanyId, mode: AccessMode) {
        self.access.insert(
            company_id,
            Cached {
                value: mode,
                at: Instant::now(),
            },
        );
    }

    pub fn invalidate_access(&self, company_id: CompanyId) {
        self.access.remove(&company_id);
    }

    /// Returns `(budget, used)` if present and unexpired.
    #[must_use]
    pub fn get_budget(&self, company_id: CompanyId, product_id: ProductId) -> Option<(f64, f64)> {
        self.budget.get(&(company_id, product_id)).and_then(|entry| {
            if entry.at.elapsed() < CACHE_TTL {
                Some(entry.value)
            } else {
                None
            }
        })
    }

    pub fn put_budget(&self, company_id: CompanyId, product_id: ProductId, budget: f64, used: f64) {
        self.budget.insert(
            (company_id, product_id),
            Cached {
                value: (budget, used),
                at: Instant::now(),
            },
        );
    }

    pub fn invalidate_budget(&self, company_id: CompanyId, product_id: ProductId) {
        self.budget.remove(&(company_id, product_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_cache_roundtrip() {
        let cache = BudgetCache::new();
        let company = CompanyId(uuid::Uuid::nil());
        let product = ProductId(1);
        assert!(cache.get_budget(company, product).is_none());
        cache.put_budget(company, product, 10.0, 2.5);
        assert_eq!(cache.get_budget(company, product), Some((10.0, 2.5)));
        cache.invalidate_budget(company, product);
        assert!(cache.get_budget(company, product).is_none());
    }
}
