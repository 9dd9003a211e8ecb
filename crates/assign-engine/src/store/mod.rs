//! # Persistence Collaborators
//!
//! The engine talks to storage through three traits:
//!
//! - [`ReferenceSource`]: offices and managers (read-only to the engine)
//! - [`TicketSource`]: tickets and their AI analyses
//! - [`AssignmentStore`]: assignment records and the authoritative manager
//!   load counters
//!
//! [`AssignmentStore::persist`] is the only way a load counter changes once
//! tickets start flowing. It inserts the assignment and increments the
//! chosen manager's load as one atomic step, refusing the write if an
//! assignment for the ticket already exists or the load moved away from the
//! value the caller observed.
//!
//! Two adapters ship with the crate: [`MemoryStore`] for tests and embedded
//! use, and [`SqliteStore`] backed by sqlx.

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AiAnalysis, Assignment, ManagerId, Manager, Office, Ticket, TicketGuid};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn offices(&self) -> Result<Vec<Office>>;

    async fn managers(&self) -> Result<Vec<Manager>>;
}

#[async_trait]
pub trait TicketSource: Send + Sync {
    async fn ticket(&self, guid: &TicketGuid) -> Result<Option<Ticket>>;

    /// The analysis that drives assignment: the most recent by creation
    /// time, ties broken by the larger analysis id
    async fn analysis_for(&self, guid: &TicketGuid) -> Result<Option<AiAnalysis>>;

    /// Tickets with at least one analysis and no assignment, in guid order
    async fn unassigned_tickets(&self) -> Result<Vec<TicketGuid>>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn find_by_ticket(&self, guid: &TicketGuid) -> Result<Option<Assignment>>;

    /// Current loads of the given managers. Unknown ids are omitted.
    async fn manager_loads(&self, ids: &[ManagerId]) -> Result<HashMap<ManagerId, u32>>;

    /// Insert the assignment and, unless it is an escalation, increment its
    /// manager's load. With `observed_load` set the increment only happens
    /// if the load still equals that value.
    ///
    /// Errors: `DuplicateGuid` if the ticket already has an assignment,
    /// `LoadConflict` if the load moved, `NotFound` for an unknown manager,
    /// `Persistence` for storage failures. Nothing is written on error.
    async fn persist(
        &self,
        assignment: &Assignment,
        observed_load: Option<u32>,
    ) -> Result<Assignment>;

    /// Per-manager comparison of the load counter against the assignments
    /// attributed to the manager
    async fn load_audit(&self) -> Result<Vec<LoadAuditEntry>>;
}

/// Load counter check for one manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadAuditEntry {
    pub manager_id: ManagerId,
    pub current_load: u32,
    pub baseline_load: u32,
    pub assigned_count: u32,
}

impl LoadAuditEntry {
    /// Difference between the counter and what the assignments imply
    pub fn drift(&self) -> i64 {
        i64::from(self.current_load)
            - i64::from(self.baseline_load)
            - i64::from(self.assigned_count)
    }

    pub fn is_consistent(&self) -> bool {
        self.drift() == 0
    }
}

/// Gini coefficient of a load distribution: 0.0 is perfectly even, values
/// approaching 1.0 mean the work sits with few managers
pub fn gini_coefficient(loads: &[u32]) -> f64 {
    let total: f64 = loads.iter().map(|l| f64::from(*l)).sum();
    if loads.len() < 2 || total == 0.0 {
        return 0.0;
    }

    let mut sorted: Vec<f64> = loads.iter().map(|l| f64::from(*l)).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (i as f64 + 1.0) * x)
        .sum();
    (2.0 * weighted) / (n * total) - (n + 1.0) / n
}
