//! Output formatting

use clap::ValueEnum;
use colored::Colorize;
use fire_assign_engine::prelude::*;
use fire_assign_engine::{LoadAuditEntry, RejectionReason, StepOutcome, TraceStage, TraceStep};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

pub fn render<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn km(value: Option<f64>) -> String {
    value
        .map(|d| format!("{:.1}", d))
        .unwrap_or_else(|| "-".to_string())
}

#[derive(Tabled)]
pub struct AssignmentRow {
    #[tabled(rename = "Ticket")]
    pub ticket: String,
    #[tabled(rename = "Office")]
    pub office: String,
    #[tabled(rename = "Manager")]
    pub manager: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
    #[tabled(rename = "Distance km")]
    pub distance: String,
}

impl From<&Assignment> for AssignmentRow {
    fn from(a: &Assignment) -> Self {
        Self {
            ticket: a.ticket_guid.to_string(),
            office: or_dash(a.office_id.as_ref()),
            manager: if a.is_escalation {
                "escalated".to_string()
            } else {
                or_dash(a.manager_id.as_ref())
            },
            reason: a.office_reason.to_string(),
            distance: km(a.distance_km),
        }
    }
}

#[derive(Tabled)]
pub struct StepRow {
    #[tabled(rename = "Stage")]
    pub stage: &'static str,
    #[tabled(rename = "Office")]
    pub office: String,
    #[tabled(rename = "Candidate")]
    pub subject: String,
    #[tabled(rename = "Distance km")]
    pub distance: String,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(rename = "Why")]
    pub reason: String,
}

impl From<&TraceStep> for StepRow {
    fn from(step: &TraceStep) -> Self {
        Self {
            stage: match step.stage {
                TraceStage::OfficeCandidate => "office",
                TraceStage::ManagerCandidate => "manager",
            },
            office: step.office_id.to_string(),
            subject: step.subject.clone(),
            distance: km(step.distance_km),
            outcome: match step.outcome {
                StepOutcome::Accepted => "accepted".green().to_string(),
                StepOutcome::Rejected => "rejected".yellow().to_string(),
            },
            reason: or_dash(step.reason.as_ref().map(RejectionReason::to_string)),
        }
    }
}

#[derive(Tabled)]
pub struct LoadRow {
    #[tabled(rename = "Manager")]
    pub manager: String,
    #[tabled(rename = "Baseline")]
    pub baseline: u32,
    #[tabled(rename = "Assigned")]
    pub assigned: u32,
    #[tabled(rename = "Load")]
    pub load: u32,
    #[tabled(rename = "Drift")]
    pub drift: String,
}

impl From<&LoadAuditEntry> for LoadRow {
    fn from(entry: &LoadAuditEntry) -> Self {
        let drift = entry.drift();
        Self {
            manager: entry.manager_id.to_string(),
            baseline: entry.baseline_load,
            assigned: entry.assigned_count,
            load: entry.current_load,
            drift: if drift == 0 {
                "0".to_string()
            } else {
                format!("{:+}", drift).red().bold().to_string()
            },
        }
    }
}
