//! # Assignment Engine
//!
//! Orchestrates office search, skill filtering, load balancing and
//! escalation for one ticket at a time. Many `assign` calls may run
//! concurrently; the engine itself holds only immutable reference data and
//! the per-office locks of the [`LoadBalancer`].
//!
//! ## Decision flow
//!
//! ```text
//!   assign(ticket, analysis)
//!     │
//!     ├─ existing assignment for guid? ──────────────► return it unchanged
//!     │
//!     ├─ resolve location (analysis point │ office name │ city gazetteer │ hubs)
//!     │
//!     ├─ top-K offices, nearest first
//!     │    └─ per office: skill filter ─► lock office ─► live loads
//!     │                   ─► least loaded ─► persist(+1) ──► done
//!     │
//!     ├─ EscalationPolicy::decide
//!     │    ├─ Widen ─► remaining offices, same per-office step ──► done
//!     │    └─ Escalate(cause)
//!     │
//!     └─ escalation record: no manager, nearest office for reference
//! ```
//!
//! Every path ends in exactly one persisted [`Assignment`] carrying its
//! [`Trace`], or in an error for the caller to handle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::balancer::{LoadBalancer, ManagerLoad};
use crate::config::EngineConfig;
use crate::error::{AssignmentError, Result};
use crate::escalation::{EscalationCause, EscalationDecision, EscalationPolicy, SearchScope};
use crate::geo::{Gazetteer, GeoIndex};
use crate::location::{LocationResolver, ResolvedLocation};
use crate::skills::{SkillMatcher, SkillMismatch};
use crate::store::{AssignmentStore, ReferenceSource, TicketSource};
use crate::trace::{RejectionReason, Trace, TraceBuilder, TraceSummary};
use crate::types::{
    AiAnalysis, Assignment, AssignmentId, Manager, ManagerId, Office, OfficeId, OfficeReason,
    Ticket, TicketGuid,
};

/// Immutable view of offices and managers used for the duration of an
/// `assign` call
#[derive(Debug, Default)]
pub struct ReferenceSnapshot {
    geo: GeoIndex,
    managers_by_office: HashMap<OfficeId, Vec<Manager>>,
    manager_count: usize,
    loaded_at: Option<DateTime<Utc>>,
}

impl ReferenceSnapshot {
    pub fn build(offices: Vec<Office>, managers: Vec<Manager>) -> Self {
        let geo = GeoIndex::new(offices);
        let mut managers_by_office: HashMap<OfficeId, Vec<Manager>> = HashMap::new();
        let mut manager_count = 0;

        for manager in managers {
            if geo.get(&manager.office_id).is_none() {
                warn!(
                    "⚠️ Manager {} references unknown office {}; ignoring",
                    manager.id, manager.office_id
                );
                continue;
            }
            manager_count += 1;
            managers_by_office
                .entry(manager.office_id.clone())
                .or_default()
                .push(manager);
        }
        for list in managers_by_office.values_mut() {
            list.sort_by(|a, b| a.id.cmp(&b.id));
        }

        Self {
            geo,
            managers_by_office,
            manager_count,
            loaded_at: Some(Utc::now()),
        }
    }

    pub fn geo(&self) -> &GeoIndex {
        &self.geo
    }

    pub fn managers_in(&self, office_id: &OfficeId) -> &[Manager] {
        self.managers_by_office
            .get(office_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn managers(&self) -> impl Iterator<Item = &Manager> {
        self.managers_by_office.values().flatten()
    }

    pub fn office_count(&self) -> usize {
        self.geo.len()
    }

    pub fn manager_count(&self) -> usize {
        self.manager_count
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

/// An office in search order with its distance, if the ticket location is known
#[derive(Debug, Clone)]
struct Candidate {
    office: Arc<Office>,
    distance_km: Option<f64>,
}

/// Per-call inputs threaded through the search
struct Request<'a> {
    ticket: &'a Ticket,
    analysis: &'a AiAnalysis,
    snapshot: &'a ReferenceSnapshot,
    location: &'a ResolvedLocation,
}

/// Builder for [`AssignmentEngine`]
#[derive(Default)]
pub struct AssignmentEngineBuilder {
    config: Option<EngineConfig>,
    reference: Option<Arc<dyn ReferenceSource>>,
    tickets: Option<Arc<dyn TicketSource>>,
    store: Option<Arc<dyn AssignmentStore>>,
    gazetteer: Option<Gazetteer>,
}

impl AssignmentEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_reference_source(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.reference = Some(source);
        self
    }

    pub fn with_ticket_source(mut self, source: Arc<dyn TicketSource>) -> Self {
        self.tickets = Some(source);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AssignmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use one backend for reference data, tickets and assignments
    pub fn with_backend<B>(self, backend: Arc<B>) -> Self
    where
        B: ReferenceSource + TicketSource + AssignmentStore + 'static,
    {
        self.with_reference_source(backend.clone())
            .with_ticket_source(backend.clone())
            .with_store(backend)
    }

    /// Replace the built-in Kazakhstan gazetteer
    pub fn with_gazetteer(mut self, gazetteer: Gazetteer) -> Self {
        self.gazetteer = Some(gazetteer);
        self
    }

    pub async fn build(self) -> Result<AssignmentEngine> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reference = self
            .reference
            .ok_or_else(|| AssignmentError::config("a reference source is required"))?;
        let store = self
            .store
            .ok_or_else(|| AssignmentError::config("an assignment store is required"))?;
        let gazetteer = self.gazetteer.unwrap_or_else(Gazetteer::kazakhstan);

        let engine = AssignmentEngine {
            skills: SkillMatcher::new(&config.skills),
            policy: EscalationPolicy::new(&config.escalation),
            locator: LocationResolver::new(&config.routing, gazetteer),
            balancer: LoadBalancer::new(),
            snapshot: RwLock::new(Arc::new(ReferenceSnapshot::default())),
            config,
            reference,
            tickets: self.tickets,
            store,
        };
        engine.refresh_reference().await?;
        Ok(engine)
    }
}

pub struct AssignmentEngine {
    config: EngineConfig,
    reference: Arc<dyn ReferenceSource>,
    tickets: Option<Arc<dyn TicketSource>>,
    store: Arc<dyn AssignmentStore>,
    snapshot: RwLock<Arc<ReferenceSnapshot>>,
    skills: SkillMatcher,
    policy: EscalationPolicy,
    balancer: LoadBalancer,
    locator: LocationResolver,
}

impl AssignmentEngine {
    pub fn builder() -> AssignmentEngineBuilder {
        AssignmentEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current reference snapshot
    pub fn snapshot(&self) -> Arc<ReferenceSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn ticket_source(&self) -> Option<&Arc<dyn TicketSource>> {
        self.tickets.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn AssignmentStore> {
        &self.store
    }

    /// Reload offices and managers. Calls already running keep the snapshot
    /// they started with.
    pub async fn refresh_reference(&self) -> Result<()> {
        let offices = self.reference.offices().await?;
        let managers = self.reference.managers().await?;
        let snapshot = ReferenceSnapshot::build(offices, managers);

        if snapshot.office_count() == 0 {
            warn!("⚠️ Reference data contains no offices; every assignment will fail");
        }
        info!(
            "📋 Reference data loaded: {} offices, {} managers",
            snapshot.office_count(),
            snapshot.manager_count()
        );
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    /// Route one ticket. Calling again for the same guid returns the stored
    /// assignment without touching any load.
    #[instrument(skip_all, fields(ticket = %ticket.guid))]
    pub async fn assign(&self, ticket: &Ticket, analysis: &AiAnalysis) -> Result<Assignment> {
        if analysis.ticket_guid != ticket.guid {
            return Err(AssignmentError::invalid_input(format!(
                "analysis {} belongs to ticket {}, not {}",
                analysis.id, analysis.ticket_guid, ticket.guid
            )));
        }

        if let Some(existing) = self.store.find_by_ticket(&ticket.guid).await? {
            debug!("Ticket {} already assigned ({})", ticket.guid, existing.id);
            return Ok(existing);
        }

        let snapshot = self.snapshot();
        if snapshot.geo().is_empty() {
            return Err(AssignmentError::NoOfficesConfigured);
        }

        let location = self
            .locator
            .resolve(ticket, analysis, snapshot.geo().offices());
        let ranked = self.rank_offices(ticket, &snapshot, &location)?;
        let request = Request {
            ticket,
            analysis,
            snapshot: &snapshot,
            location: &location,
        };

        let top_k = self.config.routing.top_k.min(ranked.len());
        let (nearest, remaining) = ranked.split_at(top_k);
        let mut trace = TraceBuilder::new();

        if let Some(assignment) = self
            .try_offices(&request, nearest, 0, SearchScope::TopK, &mut trace)
            .await?
        {
            return Ok(assignment);
        }

        let skilled_anywhere = snapshot
            .managers()
            .any(|m| self.skills.evaluate(m, ticket, analysis).is_ok());

        let (cause, scope) =
            match self
                .policy
                .decide(SearchScope::TopK, analysis.priority, skilled_anywhere)
            {
                EscalationDecision::Escalate(cause) => (cause, SearchScope::TopK),
                EscalationDecision::Widen => {
                    info!(
                        "🔎 No eligible manager in {} nearest offices; widening to {} more",
                        top_k,
                        remaining.len()
                    );
                    let widened = self
                        .try_offices(
                            &request,
                            remaining,
                            top_k,
                            SearchScope::AllOffices,
                            &mut trace,
                        )
                        .await?;
                    if let Some(assignment) = widened {
                        return Ok(assignment);
                    }
                    match self
                        .policy
                        .decide(SearchScope::AllOffices, analysis.priority, skilled_anywhere)
                    {
                        EscalationDecision::Escalate(cause) => (cause, SearchScope::AllOffices),
                        EscalationDecision::Widen => {
                            (EscalationCause::CandidatesExhausted, SearchScope::AllOffices)
                        }
                    }
                }
            };

        self.escalate(&request, &ranked, cause, scope, trace).await
    }

    /// Load a ticket and its authoritative analysis, then [`assign`](Self::assign)
    pub async fn assign_guid(&self, guid: &TicketGuid) -> Result<Assignment> {
        let tickets = self
            .tickets
            .as_ref()
            .ok_or_else(|| AssignmentError::config("no ticket source configured"))?;

        let ticket = tickets
            .ticket(guid)
            .await?
            .ok_or_else(|| AssignmentError::not_found(format!("ticket {}", guid)))?;
        let analysis = tickets
            .analysis_for(guid)
            .await?
            .ok_or_else(|| AssignmentError::not_found(format!("analysis for ticket {}", guid)))?;

        self.assign(&ticket, &analysis).await
    }

    /// The stored decision trace for a ticket
    pub async fn explain(&self, guid: &TicketGuid) -> Result<Trace> {
        self.store
            .find_by_ticket(guid)
            .await?
            .map(|a| a.trace)
            .ok_or_else(|| AssignmentError::not_found(format!("assignment for ticket {}", guid)))
    }

    fn rank_offices(
        &self,
        ticket: &Ticket,
        snapshot: &ReferenceSnapshot,
        location: &ResolvedLocation,
    ) -> Result<Vec<Candidate>> {
        match location.point {
            Some(point) => Ok(snapshot
                .geo()
                .ranked(point)?
                .into_iter()
                .map(|n| Candidate {
                    office: n.office,
                    distance_km: Some(n.distance_km),
                })
                .collect()),
            None => {
                debug!("Ticket {} has no usable location; using hub order", ticket.guid);
                Ok(self
                    .locator
                    .hub_order(&ticket.guid, snapshot.geo().offices())
                    .into_iter()
                    .map(|office| Candidate {
                        office,
                        distance_km: None,
                    })
                    .collect())
            }
        }
    }

    fn office_reason(&self, position: usize, location: &ResolvedLocation) -> OfficeReason {
        match (position, location.point) {
            (0, Some(_)) => OfficeReason::Nearest,
            (0, None) => OfficeReason::Hub,
            _ => OfficeReason::Fallback,
        }
    }

    /// Walk `candidates` in order; `offset` is the position of the first
    /// one in the overall ranking
    async fn try_offices(
        &self,
        request: &Request<'_>,
        candidates: &[Candidate],
        offset: usize,
        scope: SearchScope,
        trace: &mut TraceBuilder,
    ) -> Result<Option<Assignment>> {
        for (i, candidate) in candidates.iter().enumerate() {
            let office_id = &candidate.office.id;
            let mut eligible: Vec<ManagerId> = Vec::new();
            let mut mismatched: Vec<(ManagerId, SkillMismatch)> = Vec::new();

            for manager in request.snapshot.managers_in(office_id) {
                match self.skills.evaluate(manager, request.ticket, request.analysis) {
                    Ok(()) => eligible.push(manager.id.clone()),
                    Err(mismatch) => mismatched.push((manager.id.clone(), mismatch)),
                }
            }

            if !eligible.is_empty() {
                let reason = self.office_reason(offset + i, request.location);
                let assigned = self
                    .assign_within_office(
                        request,
                        candidate,
                        &eligible,
                        &mismatched,
                        reason,
                        scope,
                        trace,
                    )
                    .await?;
                if let Some(assignment) = assigned {
                    return Ok(Some(assignment));
                }
                continue;
            }

            debug!(
                "Office {} has no eligible manager for type '{}'",
                office_id, request.analysis.ticket_type
            );
            trace.office(
                office_id,
                candidate.distance_km,
                Some(RejectionReason::NoEligibleManager),
            );
            record_mismatches(trace, office_id, &mismatched);
        }
        Ok(None)
    }

    /// Select and persist under the office lock, re-selecting when the
    /// store reports that a load moved underneath us
    async fn assign_within_office(
        &self,
        request: &Request<'_>,
        candidate: &Candidate,
        eligible: &[ManagerId],
        mismatched: &[(ManagerId, SkillMismatch)],
        reason: OfficeReason,
        scope: SearchScope,
        trace: &mut TraceBuilder,
    ) -> Result<Option<Assignment>> {
        let office_id = &candidate.office.id;
        let _guard = self.balancer.lock_office(office_id).await;
        let max_attempts = self.config.routing.max_load_conflict_retries;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let loads = self.store.manager_loads(eligible).await?;
            let candidates: Vec<ManagerLoad> = eligible
                .iter()
                .filter_map(|id| loads.get(id).map(|load| ManagerLoad::new(id.clone(), *load)))
                .collect();

            if candidates.is_empty() {
                warn!(
                    "⚠️ Eligible managers of office {} are unknown to the store",
                    office_id
                );
                trace.office(
                    office_id,
                    candidate.distance_km,
                    Some(RejectionReason::NoEligibleManager),
                );
                record_mismatches(trace, office_id, mismatched);
                return Ok(None);
            }

            let chosen = self.balancer.select_manager(&candidates)?.clone();

            let mut attempt_trace = trace.clone();
            attempt_trace.office(office_id, candidate.distance_km, None);
            record_mismatches(&mut attempt_trace, office_id, mismatched);
            for c in &candidates {
                let rejection = (c.manager_id != chosen.manager_id).then(|| {
                    RejectionReason::LoadNotMinimal {
                        load: c.load,
                        chosen_load: chosen.load,
                    }
                });
                attempt_trace.manager(office_id, &c.manager_id, rejection);
            }

            let trace_record = attempt_trace.finish(TraceSummary {
                office_id: Some(office_id.clone()),
                manager_id: Some(chosen.manager_id.clone()),
                office_reason: reason,
                distance_km: candidate.distance_km,
                is_escalation: false,
                escalation_cause: None,
                search_scope: scope,
                location: request.location.source.clone(),
                offices_considered: 0,
                managers_considered: 0,
            });
            let assignment = Assignment {
                id: AssignmentId::new(),
                ticket_guid: request.ticket.guid.clone(),
                analysis_id: request.analysis.id.clone(),
                manager_id: Some(chosen.manager_id.clone()),
                office_id: Some(office_id.clone()),
                office_reason: reason,
                distance_km: candidate.distance_km,
                is_escalation: false,
                trace: trace_record,
                created_at: Utc::now(),
            };

            match self.store.persist(&assignment, Some(chosen.load)).await {
                Ok(stored) => {
                    info!(
                        "✅ Ticket {} → office {} manager {} ({}, load {} → {})",
                        stored.ticket_guid,
                        office_id,
                        chosen.manager_id,
                        reason,
                        chosen.load,
                        chosen.load + 1
                    );
                    return Ok(Some(stored));
                }
                Err(AssignmentError::LoadConflict {
                    manager_id,
                    expected,
                    actual,
                }) if attempt < max_attempts => {
                    warn!(
                        "⚠️ Load of {} moved ({} → {}); re-selecting (attempt {}/{})",
                        manager_id, expected, actual, attempt, max_attempts
                    );
                }
                Err(AssignmentError::DuplicateGuid(guid)) => {
                    return self.resolve_duplicate(&guid).await.map(Some);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn escalate(
        &self,
        request: &Request<'_>,
        ranked: &[Candidate],
        cause: EscalationCause,
        scope: SearchScope,
        trace: TraceBuilder,
    ) -> Result<Assignment> {
        let reference = ranked.first();
        let office_id = reference.map(|c| c.office.id.clone());
        let distance_km = reference.and_then(|c| c.distance_km);

        let trace = trace.finish(TraceSummary {
            office_id: office_id.clone(),
            manager_id: None,
            office_reason: OfficeReason::Escalation,
            distance_km,
            is_escalation: true,
            escalation_cause: Some(cause),
            search_scope: scope,
            location: request.location.source.clone(),
            offices_considered: 0,
            managers_considered: 0,
        });
        let assignment = Assignment {
            id: AssignmentId::new(),
            ticket_guid: request.ticket.guid.clone(),
            analysis_id: request.analysis.id.clone(),
            manager_id: None,
            office_id,
            office_reason: OfficeReason::Escalation,
            distance_km,
            is_escalation: true,
            trace,
            created_at: Utc::now(),
        };

        match self.store.persist(&assignment, None).await {
            Ok(stored) => {
                warn!(
                    "🚨 Ticket {} escalated ({}), type '{}' priority {}",
                    stored.ticket_guid,
                    cause,
                    request.analysis.ticket_type,
                    request.analysis.priority
                );
                Ok(stored)
            }
            Err(AssignmentError::DuplicateGuid(guid)) => self.resolve_duplicate(&guid).await,
            Err(e) => Err(e),
        }
    }

    /// A concurrent call won the insert; hand back its record
    async fn resolve_duplicate(&self, guid: &TicketGuid) -> Result<Assignment> {
        warn!("⚠️ Concurrent assignment detected for ticket {}; returning stored record", guid);
        self.store.find_by_ticket(guid).await?.ok_or_else(|| {
            AssignmentError::persistence(format!(
                "store reported a duplicate for ticket {} but holds no assignment",
                guid
            ))
        })
    }
}

fn record_mismatches(
    trace: &mut TraceBuilder,
    office_id: &OfficeId,
    mismatched: &[(ManagerId, SkillMismatch)],
) {
    for (manager_id, mismatch) in mismatched {
        trace.manager(
            office_id,
            manager_id,
            Some(RejectionReason::SkillMismatch {
                mismatch: mismatch.clone(),
            }),
        );
    }
}
