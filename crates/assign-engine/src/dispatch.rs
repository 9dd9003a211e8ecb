//! Batch dispatch
//!
//! Feeds an unordered batch of tickets through the engine with bounded
//! concurrency. Transient failures (`Persistence`, `LoadConflict`) are
//! retried with exponential backoff; tickets that still fail land in the
//! manual-review list of the [`BatchReport`]. A fatal error such as
//! `NoOfficesConfigured` stops the batch at once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::engine::AssignmentEngine;
use crate::error::{AssignmentError, Result};
use crate::types::{Assignment, OfficeReason, TicketGuid};

/// A ticket that needs a human to route it
#[derive(Debug, Clone, Serialize)]
pub struct FailedTicket {
    pub ticket_guid: TicketGuid,
    pub error: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub assigned: Vec<Assignment>,
    pub escalated: Vec<Assignment>,
    pub manual_review: Vec<FailedTicket>,
    pub elapsed_ms: u128,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.assigned.len() + self.escalated.len() + self.manual_review.len()
    }

    /// Assigned (non-escalated) tickets per office
    pub fn by_office(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for a in &self.assigned {
            let office = a.office_id.as_ref().map(|o| o.to_string()).unwrap_or_default();
            *counts.entry(office).or_insert(0) += 1;
        }
        counts
    }

    /// All processed tickets per office reason
    pub fn by_reason(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for a in self.assigned.iter().chain(self.escalated.iter()) {
            *counts.entry(a.office_reason.as_str()).or_insert(0) += 1;
        }
        counts
    }

    fn record(&mut self, assignment: Assignment) {
        if assignment.is_escalation || assignment.office_reason == OfficeReason::Escalation {
            self.escalated.push(assignment);
        } else {
            self.assigned.push(assignment);
        }
    }
}

pub struct BatchDispatcher {
    engine: Arc<AssignmentEngine>,
    config: DispatchConfig,
}

impl BatchDispatcher {
    pub fn new(engine: Arc<AssignmentEngine>) -> Self {
        let config = engine.config().dispatch.clone();
        Self { engine, config }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Dispatch every ticket the engine's ticket source reports as unassigned
    pub async fn dispatch_pending(&self) -> Result<BatchReport> {
        let tickets = self
            .engine
            .ticket_source()
            .ok_or_else(|| AssignmentError::config("no ticket source configured"))?;
        let pending = tickets.unassigned_tickets().await?;
        self.dispatch(pending).await
    }

    /// Assign each guid. Order of completion is unspecified.
    pub async fn dispatch(&self, guids: Vec<TicketGuid>) -> Result<BatchReport> {
        let started = Instant::now();
        let total = guids.len();
        info!(
            "🚀 Dispatching {} tickets (concurrency {})",
            total, self.config.concurrency
        );

        let mut results = stream::iter(guids)
            .map(|guid| async move {
                let (result, attempts) = self.assign_with_retry(&guid).await;
                (guid, result, attempts)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut report = BatchReport::default();
        while let Some((guid, result, attempts)) = results.next().await {
            match result {
                Ok(assignment) => report.record(assignment),
                Err(e) if e.is_fatal() => {
                    error!("❌ Aborting batch on ticket {}: {}", guid, e);
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "❌ Ticket {} needs manual review after {} attempt(s): {}",
                        guid, attempts, e
                    );
                    report.manual_review.push(FailedTicket {
                        ticket_guid: guid,
                        error: e.to_string(),
                        attempts,
                    });
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis();
        info!(
            "✅ Batch done: {} assigned, {} escalated, {} for manual review ({} ms)",
            report.assigned.len(),
            report.escalated.len(),
            report.manual_review.len(),
            report.elapsed_ms
        );
        Ok(report)
    }

    async fn assign_with_retry(&self, guid: &TicketGuid) -> (Result<Assignment>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.engine.assign_guid(guid).await {
                Ok(assignment) => return (Ok(assignment), attempt),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "⚠️ Ticket {} attempt {}/{} failed: {}; retrying in {:?}",
                        guid, attempt, self.config.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    /// Exponential backoff: base * 2^(attempt - 1), capped
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay = self.config.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.config.max_delay_ms))
    }
}
