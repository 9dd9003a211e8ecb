//! Ticket location resolution and hub ordering for unlocatable tickets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::RoutingConfig;
use crate::geo::{normalize_place, Gazetteer};
use crate::types::{AiAnalysis, GeoPoint, Office, OfficeId, Ticket, TicketGuid};

/// Where the ticket coordinates came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LocationSource {
    /// Geo-point recommended by the AI analysis
    AnalysisPoint,
    /// Ticket city names an office; the office coordinates are used
    OfficeName { office_id: OfficeId },
    /// Ticket city resolved through the offline gazetteer
    Gazetteer { city: String },
    /// Nothing usable; hub routing applies
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub point: Option<GeoPoint>,
    pub source: LocationSource,
}

impl ResolvedLocation {
    pub fn unknown() -> Self {
        Self {
            point: None,
            source: LocationSource::Unknown,
        }
    }
}

/// Resolves a ticket to coordinates
#[derive(Debug, Clone)]
pub struct LocationResolver {
    match_city: bool,
    gazetteer: Option<Gazetteer>,
    hubs: Vec<OfficeId>,
}

impl LocationResolver {
    pub fn new(config: &RoutingConfig, gazetteer: Gazetteer) -> Self {
        Self {
            match_city: config.geocode_ticket_city,
            gazetteer: config.geocode_ticket_city.then_some(gazetteer),
            hubs: config.hub_offices.clone(),
        }
    }

    /// Analysis point first, then the ticket city matched against office
    /// names, then the gazetteer.
    pub fn resolve(
        &self,
        ticket: &Ticket,
        analysis: &AiAnalysis,
        offices: &[Arc<Office>],
    ) -> ResolvedLocation {
        if let Some(point) = analysis.geo_point.filter(GeoPoint::is_valid) {
            return ResolvedLocation {
                point: Some(point),
                source: LocationSource::AnalysisPoint,
            };
        }

        let city = ticket.address.city.as_deref().unwrap_or("").trim();
        if !self.match_city {
            return ResolvedLocation::unknown();
        }

        let key = normalize_place(city);
        if !key.is_empty() {
            let named = offices
                .iter()
                .find(|o| o.location.is_valid() && normalize_place(&o.name) == key);
            if let Some(office) = named {
                debug!("📍 City '{}' names office {}", city, office.id);
                return ResolvedLocation {
                    point: Some(office.location),
                    source: LocationSource::OfficeName {
                        office_id: office.id.clone(),
                    },
                };
            }
        }

        if let Some(gazetteer) = &self.gazetteer {
            if let Some(point) = gazetteer.geocode(city) {
                debug!("📍 Geocoded city '{}' to {}", city, point);
                return ResolvedLocation {
                    point: Some(point),
                    source: LocationSource::Gazetteer {
                        city: city.to_string(),
                    },
                };
            }
        }

        ResolvedLocation::unknown()
    }

    /// Candidate order for a ticket without coordinates: configured hubs
    /// rotated by a stable hash of the guid, then every other office by id.
    /// `offices` must be in id order.
    pub fn hub_order(&self, guid: &TicketGuid, offices: &[Arc<Office>]) -> Vec<Arc<Office>> {
        let mut hubs: Vec<Arc<Office>> = Vec::new();
        for hub in &self.hubs {
            if hubs.iter().any(|h| &h.id == hub) {
                continue;
            }
            if let Some(office) = offices.iter().find(|o| &o.id == hub) {
                hubs.push(Arc::clone(office));
            }
        }

        if !hubs.is_empty() {
            let shift = (guid_bucket(guid) % hubs.len() as u64) as usize;
            hubs.rotate_left(shift);
        }

        let rest = offices
            .iter()
            .filter(|o| !hubs.iter().any(|h| h.id == o.id))
            .cloned()
            .collect::<Vec<_>>();
        hubs.extend(rest);
        hubs
    }
}

/// Stable 64-bit bucket of a ticket guid
pub fn guid_bucket(guid: &TicketGuid) -> u64 {
    let digest = Sha256::digest(guid.as_str().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
