//! # Load Balancing
//!
//! Least-loaded selection among eligible managers, plus the per-office
//! mutual-exclusion scope that serializes the read-select-increment
//! sequence.
//!
//! ```text
//!   lock(office) ─► read live loads ─► select_manager ─► persist(+1) ─► unlock
//! ```
//!
//! A manager belongs to exactly one office, so holding the office lock is
//! enough to keep two assignments from both observing the same minimum.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{AssignmentError, Result};
use crate::types::{ManagerId, OfficeId};

/// A manager's load as read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerLoad {
    pub manager_id: ManagerId,
    pub load: u32,
}

impl ManagerLoad {
    pub fn new(manager_id: impl Into<ManagerId>, load: u32) -> Self {
        Self {
            manager_id: manager_id.into(),
            load,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadBalancer {
    office_locks: DashMap<OfficeId, Arc<Mutex<()>>>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest load wins; ties go to the smallest manager id
    pub fn select_manager<'a>(&self, candidates: &'a [ManagerLoad]) -> Result<&'a ManagerLoad> {
        let chosen = candidates
            .iter()
            .min_by(|a, b| {
                a.load
                    .cmp(&b.load)
                    .then_with(|| a.manager_id.cmp(&b.manager_id))
            })
            .ok_or_else(|| AssignmentError::no_eligible_manager("empty candidate set"))?;

        debug!(
            "🎯 Selected manager {} (load {}) among {} candidates",
            chosen.manager_id,
            chosen.load,
            candidates.len()
        );
        Ok(chosen)
    }

    /// Acquire the office's assignment lock
    pub async fn lock_office(&self, office_id: &OfficeId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so no DashMap shard guard is held across the await
        let lock = self
            .office_locks
            .entry(office_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
