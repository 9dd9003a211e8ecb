//! In-process store. All state sits behind one mutex, so every `persist`
//! validates and mutates in a single critical section.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{AssignmentStore, LoadAuditEntry, ReferenceSource, TicketSource};
use crate::error::{AssignmentError, Result};
use crate::types::{
    AiAnalysis, Assignment, Manager, ManagerId, Office, OfficeId, Ticket, TicketGuid,
};

#[derive(Debug, Clone)]
struct ManagerRecord {
    manager: Manager,
    baseline_load: u32,
    load: u32,
}

#[derive(Debug, Default)]
struct Inner {
    offices: BTreeMap<OfficeId, Office>,
    managers: BTreeMap<ManagerId, ManagerRecord>,
    tickets: BTreeMap<TicketGuid, Ticket>,
    analyses: HashMap<TicketGuid, Vec<AiAnalysis>>,
    assignments: HashMap<TicketGuid, Assignment>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(
        offices: impl IntoIterator<Item = Office>,
        managers: impl IntoIterator<Item = Manager>,
    ) -> Self {
        let store = Self::new();
        for office in offices {
            store.add_office(office);
        }
        for manager in managers {
            store.add_manager(manager);
        }
        store
    }

    pub fn add_office(&self, office: Office) {
        self.inner.lock().offices.insert(office.id.clone(), office);
    }

    /// Register a manager; its `current_load` becomes the baseline
    pub fn add_manager(&self, manager: Manager) {
        let record = ManagerRecord {
            baseline_load: manager.current_load,
            load: manager.current_load,
            manager,
        };
        self.inner
            .lock()
            .managers
            .insert(record.manager.id.clone(), record);
    }

    pub fn add_ticket(&self, ticket: Ticket) {
        self.inner.lock().tickets.insert(ticket.guid.clone(), ticket);
    }

    pub fn add_analysis(&self, analysis: AiAnalysis) {
        self.inner
            .lock()
            .analyses
            .entry(analysis.ticket_guid.clone())
            .or_default()
            .push(analysis);
    }

    /// Live load of one manager
    pub fn load_of(&self, id: &ManagerId) -> Option<u32> {
        self.inner.lock().managers.get(id).map(|r| r.load)
    }

    /// Every stored assignment, ordered by ticket guid
    pub fn assignments(&self) -> Vec<Assignment> {
        let inner = self.inner.lock();
        let mut all: Vec<Assignment> = inner.assignments.values().cloned().collect();
        all.sort_by(|a, b| a.ticket_guid.cmp(&b.ticket_guid));
        all
    }
}

#[async_trait]
impl ReferenceSource for MemoryStore {
    async fn offices(&self) -> Result<Vec<Office>> {
        Ok(self.inner.lock().offices.values().cloned().collect())
    }

    async fn managers(&self) -> Result<Vec<Manager>> {
        let inner = self.inner.lock();
        Ok(inner
            .managers
            .values()
            .map(|r| Manager {
                current_load: r.load,
                ..r.manager.clone()
            })
            .collect())
    }
}

#[async_trait]
impl TicketSource for MemoryStore {
    async fn ticket(&self, guid: &TicketGuid) -> Result<Option<Ticket>> {
        Ok(self.inner.lock().tickets.get(guid).cloned())
    }

    async fn analysis_for(&self, guid: &TicketGuid) -> Result<Option<AiAnalysis>> {
        let inner = self.inner.lock();
        Ok(inner.analyses.get(guid).and_then(|list| {
            list.iter()
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
                .cloned()
        }))
    }

    async fn unassigned_tickets(&self) -> Result<Vec<TicketGuid>> {
        let inner = self.inner.lock();
        Ok(inner
            .tickets
            .keys()
            .filter(|guid| {
                inner.analyses.contains_key(*guid) && !inner.assignments.contains_key(*guid)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn find_by_ticket(&self, guid: &TicketGuid) -> Result<Option<Assignment>> {
        Ok(self.inner.lock().assignments.get(guid).cloned())
    }

    async fn manager_loads(&self, ids: &[ManagerId]) -> Result<HashMap<ManagerId, u32>> {
        let inner = self.inner.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.managers.get(id).map(|r| (id.clone(), r.load)))
            .collect())
    }

    async fn persist(
        &self,
        assignment: &Assignment,
        observed_load: Option<u32>,
    ) -> Result<Assignment> {
        let mut inner = self.inner.lock();

        if inner.assignments.contains_key(&assignment.ticket_guid) {
            return Err(AssignmentError::DuplicateGuid(assignment.ticket_guid.clone()));
        }

        if !assignment.is_escalation {
            let manager_id = assignment.manager_id.as_ref().ok_or_else(|| {
                AssignmentError::invalid_input("non-escalated assignment without a manager")
            })?;
            let record = inner
                .managers
                .get_mut(manager_id)
                .ok_or_else(|| AssignmentError::not_found(format!("manager {}", manager_id)))?;
            if let Some(expected) = observed_load {
                if record.load != expected {
                    return Err(AssignmentError::LoadConflict {
                        manager_id: manager_id.clone(),
                        expected,
                        actual: record.load,
                    });
                }
            }
            record.load += 1;
            debug!("Manager {} load is now {}", manager_id, record.load);
        }

        inner
            .assignments
            .insert(assignment.ticket_guid.clone(), assignment.clone());
        Ok(assignment.clone())
    }

    async fn load_audit(&self) -> Result<Vec<LoadAuditEntry>> {
        let inner = self.inner.lock();
        let mut counts: HashMap<&ManagerId, u32> = HashMap::new();
        for a in inner.assignments.values().filter(|a| !a.is_escalation) {
            if let Some(id) = &a.manager_id {
                *counts.entry(id).or_default() += 1;
            }
        }

        Ok(inner
            .managers
            .values()
            .map(|r| LoadAuditEntry {
                manager_id: r.manager.id.clone(),
                current_load: r.load,
                baseline_load: r.baseline_load,
                assigned_count: counts.get(&r.manager.id).copied().unwrap_or(0),
            })
            .collect())
    }
}
