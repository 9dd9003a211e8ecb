//! # FIRE Assignment Engine
//!
//! Routes classified support tickets to a physical office and a human
//! manager. Each ticket arrives with an upstream AI analysis (type,
//! language, sentiment, priority, optional geo-point); the engine picks the
//! nearest office that has a manager skilled for the ticket type, gives the
//! ticket to the least-loaded such manager and records why.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      AssignmentEngine                        │
//! │  assign(ticket, analysis) · assign_guid · explain            │
//! └───────┬──────────────┬──────────────┬──────────────┬─────────┘
//!         │              │              │              │
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌─────▼──────┐ ┌─────▼────────┐
//! │  GeoIndex    │ │SkillMatcher│ │LoadBalancer│ │ Escalation   │
//! │  + Gazetteer │ │            │ │ per-office │ │ Policy       │
//! │  nearest-K   │ │ type/synon.│ │ locks      │ │ widen/escal. │
//! └──────────────┘ └────────────┘ └─────┬──────┘ └──────────────┘
//!                                       │
//!                           ┌───────────▼────────────┐
//!                           │    AssignmentStore     │
//!                           │ MemoryStore│SqliteStore│
//!                           │ insert + load +1 (atomic)
//!                           └────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - At most one [`Assignment`] per ticket guid; re-assigning returns the
//!   stored record and leaves every load untouched.
//! - A manager's load equals its baseline plus the non-escalated
//!   assignments attributed to it.
//! - Given the same ticket, analysis, reference data and loads, the same
//!   office and manager are chosen.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fire_assign_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let store = Arc::new(SqliteStore::open("sqlite://fire.db").await?);
//! let engine = AssignmentEngine::builder()
//!     .with_config(EngineConfig::default())
//!     .with_backend(store)
//!     .build()
//!     .await?;
//!
//! let assignment = engine.assign_guid(&TicketGuid::from("2f6d9c1e")).await?;
//! println!("{:?} via {}", assignment.manager_id, assignment.office_reason);
//!
//! let trace = engine.explain(&assignment.ticket_guid).await?;
//! println!("{}", serde_json::to_string_pretty(&trace)?);
//! # Ok(())
//! # }
//! ```

pub mod balancer;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod geo;
pub mod location;
pub mod logging;
pub mod skills;
pub mod store;
pub mod trace;
pub mod types;

pub use balancer::{LoadBalancer, ManagerLoad};
pub use config::EngineConfig;
pub use dispatch::{BatchDispatcher, BatchReport, FailedTicket};
pub use engine::{AssignmentEngine, AssignmentEngineBuilder, ReferenceSnapshot};
pub use error::{AssignmentError, Result};
pub use escalation::{
    EscalationCause, EscalationDecision, EscalationPolicy, PriorityOrder, SearchScope,
};
pub use geo::{haversine_km, Gazetteer, GeoIndex, NearbyOffice};
pub use location::{LocationResolver, LocationSource};
pub use skills::{SkillMatcher, SkillMismatch};
pub use store::{
    AssignmentStore, LoadAuditEntry, MemoryStore, ReferenceSource, SqliteStore, TicketSource,
};
pub use trace::{
    Explanation, RejectionReason, StepOutcome, Trace, TraceStage, TraceStep, TraceSummary,
};
pub use types::*;

/// Common imports for engine users
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::dispatch::{BatchDispatcher, BatchReport};
    pub use crate::engine::AssignmentEngine;
    pub use crate::error::{AssignmentError, Result};
    pub use crate::store::{
        AssignmentStore, MemoryStore, ReferenceSource, SqliteStore, TicketSource,
    };
    pub use crate::trace::{Explanation, Trace};
    pub use crate::types::*;
}
