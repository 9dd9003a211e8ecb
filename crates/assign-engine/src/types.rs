//! Core domain types: offices, managers, tickets, AI analyses and the
//! assignment record produced for each ticket.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssignmentError;
use crate::trace::Trace;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Office identifier
    OfficeId
);
string_id!(
    /// Manager identifier
    ManagerId
);
string_id!(
    /// Globally unique ticket identifier
    TicketGuid
);
string_id!(
    /// AI analysis identifier
    AnalysisId
);

/// Assignment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(pub Uuid);

impl AssignmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Finite and inside the latitude/longitude ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Physical office. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub location: GeoPoint,
}

/// Human manager attached to exactly one office
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manager {
    pub id: ManagerId,
    pub name: String,
    #[serde(default)]
    pub position: String,
    pub office_id: OfficeId,
    #[serde(default)]
    pub skills: BTreeSet<String>,
    /// Work already on the manager's desk when reference data was loaded
    #[serde(default)]
    pub current_load: u32,
}

impl Manager {
    /// Parse a free-form skill list such as `"VIP, ENG; kz"` into unique,
    /// trimmed, upper-cased tags.
    pub fn parse_skills(raw: &str) -> BTreeSet<String> {
        raw.split([',', ';'])
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Address fields used to geo-locate a ticket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
    pub house: Option<String>,
}

/// Incoming support ticket. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub guid: TicketGuid,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub segment: String,
    #[serde(default)]
    pub address: Address,
}

impl Ticket {
    /// Minimal ticket with only a guid and a segment
    pub fn new(guid: impl Into<TicketGuid>, segment: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            gender: None,
            birth_date: None,
            description: String::new(),
            attachments: Vec::new(),
            segment: segment.into(),
            address: Address::default(),
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.address.city = Some(city.into());
        self
    }
}

/// Sentiment detected by the upstream classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    #[serde(alias = "NEG", alias = "neg")]
    Negative,
    #[serde(alias = "NEU", alias = "neu")]
    Neutral,
    #[serde(alias = "POS", alias = "pos")]
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
        }
    }
}

impl FromStr for Sentiment {
    type Err = AssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "negative" | "neg" => Ok(Sentiment::Negative),
            "neutral" | "neu" => Ok(Sentiment::Neutral),
            "positive" | "pos" => Ok(Sentiment::Positive),
            other => Err(AssignmentError::invalid_input(format!(
                "unknown sentiment '{}'",
                other
            ))),
        }
    }
}

/// Classification attached to a ticket by the AI stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub id: AnalysisId,
    pub ticket_guid: TicketGuid,
    pub ticket_type: String,
    #[serde(default)]
    pub language: String,
    pub sentiment: Sentiment,
    pub priority: u8,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub geo_point: Option<GeoPoint>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AiAnalysis {
    pub fn new(
        id: impl Into<AnalysisId>,
        ticket_guid: impl Into<TicketGuid>,
        ticket_type: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            ticket_guid: ticket_guid.into(),
            ticket_type: ticket_type.into(),
            language: String::new(),
            sentiment: Sentiment::Neutral,
            priority,
            summary: String::new(),
            recommendation: String::new(),
            geo_point: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_geo_point(mut self, point: GeoPoint) -> Self {
        self.geo_point = Some(point);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Why the chosen office was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeReason {
    /// First (closest) candidate had an eligible manager
    Nearest,
    /// A later candidate had to be used
    Fallback,
    /// Ticket location unknown, routed to a hub office
    Hub,
    /// No manager assigned; office kept for reference only
    Escalation,
}

impl OfficeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfficeReason::Nearest => "nearest",
            OfficeReason::Fallback => "fallback",
            OfficeReason::Hub => "hub",
            OfficeReason::Escalation => "escalation",
        }
    }
}

impl fmt::Display for OfficeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfficeReason {
    type Err = AssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(OfficeReason::Nearest),
            "fallback" => Ok(OfficeReason::Fallback),
            "hub" => Ok(OfficeReason::Hub),
            "escalation" => Ok(OfficeReason::Escalation),
            other => Err(AssignmentError::invalid_input(format!(
                "unknown office reason '{}'",
                other
            ))),
        }
    }
}

/// The single, immutable routing decision for a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub ticket_guid: TicketGuid,
    pub analysis_id: AnalysisId,
    pub manager_id: Option<ManagerId>,
    pub office_id: Option<OfficeId>,
    pub office_reason: OfficeReason,
    pub distance_km: Option<f64>,
    pub is_escalation: bool,
    pub trace: Trace,
    pub created_at: DateTime<Utc>,
}
