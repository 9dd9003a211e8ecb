//! # Decision Trace
//!
//! Every assignment carries a structured record of how it was reached:
//! each office considered, each manager considered and why it was passed
//! over, and a summary of the final decision. The trace is stored with the
//! assignment and answers questions like "why was this ticket not sent to
//! office X?".

use serde::{Deserialize, Serialize};

use crate::escalation::{EscalationCause, SearchScope};
use crate::location::LocationSource;
use crate::skills::SkillMismatch;
use crate::types::{ManagerId, OfficeId, OfficeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    OfficeCandidate,
    ManagerCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Accepted,
    Rejected,
}

/// Why a candidate was not chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The office had no manager passing the skill rules
    NoEligibleManager,
    /// The manager failed a skill rule
    SkillMismatch { mismatch: SkillMismatch },
    /// Another eligible manager carried less work
    LoadNotMinimal { load: u32, chosen_load: u32 },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::NoEligibleManager => write!(f, "no eligible manager"),
            RejectionReason::SkillMismatch { mismatch } => {
                write!(f, "skill mismatch: {}", mismatch)
            }
            RejectionReason::LoadNotMinimal { load, chosen_load } => {
                write!(f, "load {} not minimal (chosen manager had {})", load, chosen_load)
            }
        }
    }
}

/// One considered candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub stage: TraceStage,
    /// Office or manager id
    pub subject: String,
    /// Office the candidate belongs to
    pub office_id: OfficeId,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

/// The final decision path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub office_id: Option<OfficeId>,
    pub manager_id: Option<ManagerId>,
    pub office_reason: OfficeReason,
    pub distance_km: Option<f64>,
    pub is_escalation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_cause: Option<EscalationCause>,
    pub search_scope: SearchScope,
    pub location: LocationSource,
    pub offices_considered: usize,
    pub managers_considered: usize,
}

/// Answer to "why was this ticket not sent to X?"
#[derive(Debug, Clone, PartialEq)]
pub enum Explanation<'a> {
    /// X is where the ticket went
    Chosen,
    /// X was considered and passed over
    Rejected(&'a RejectionReason),
    /// X was never evaluated: outside the search scope or filtered before
    /// ranking
    NotConsidered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
    pub summary: TraceSummary,
}

impl Trace {
    pub fn office_steps(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps
            .iter()
            .filter(|s| s.stage == TraceStage::OfficeCandidate)
    }

    pub fn manager_steps(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps
            .iter()
            .filter(|s| s.stage == TraceStage::ManagerCandidate)
    }

    pub fn why_not_office(&self, office_id: &OfficeId) -> Explanation<'_> {
        if self.summary.office_id.as_ref() == Some(office_id) && !self.summary.is_escalation {
            return Explanation::Chosen;
        }
        self.explain(TraceStage::OfficeCandidate, office_id.as_str())
    }

    pub fn why_not_manager(&self, manager_id: &ManagerId) -> Explanation<'_> {
        if self.summary.manager_id.as_ref() == Some(manager_id) {
            return Explanation::Chosen;
        }
        self.explain(TraceStage::ManagerCandidate, manager_id.as_str())
    }

    fn explain(&self, stage: TraceStage, subject: &str) -> Explanation<'_> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.stage == stage && s.subject == subject)
            .and_then(|s| s.reason.as_ref())
            .map(Explanation::Rejected)
            .unwrap_or(Explanation::NotConsidered)
    }
}

/// Collects steps while the engine walks candidates
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    steps: Vec<TraceStep>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn office(
        &mut self,
        office_id: &OfficeId,
        distance_km: Option<f64>,
        reason: Option<RejectionReason>,
    ) {
        self.steps.push(TraceStep {
            stage: TraceStage::OfficeCandidate,
            subject: office_id.to_string(),
            office_id: office_id.clone(),
            outcome: outcome_for(&reason),
            reason,
            distance_km,
        });
    }

    pub fn manager(
        &mut self,
        office_id: &OfficeId,
        manager_id: &ManagerId,
        reason: Option<RejectionReason>,
    ) {
        self.steps.push(TraceStep {
            stage: TraceStage::ManagerCandidate,
            subject: manager_id.to_string(),
            office_id: office_id.clone(),
            outcome: outcome_for(&reason),
            reason,
            distance_km: None,
        });
    }

    pub fn offices_considered(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.stage == TraceStage::OfficeCandidate)
            .count()
    }

    pub fn managers_considered(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.stage == TraceStage::ManagerCandidate)
            .count()
    }

    /// Close the trace. Counts in `summary` are filled in from the steps.
    pub fn finish(self, mut summary: TraceSummary) -> Trace {
        summary.offices_considered = self.offices_considered();
        summary.managers_considered = self.managers_considered();
        Trace {
            steps: self.steps,
            summary,
        }
    }
}

fn outcome_for(reason: &Option<RejectionReason>) -> StepOutcome {
    if reason.is_some() {
        StepOutcome::Rejected
    } else {
        StepOutcome::Accepted
    }
}
