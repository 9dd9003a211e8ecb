//! # Geographic Office Index
//!
//! Ranks offices by great-circle distance from a ticket location.
//!
//! ```text
//!   ticket point ──► haversine(point, office) for every office
//!                         │
//!                         ▼
//!        sort by (distance_km ascending, office id ascending)
//!                         │
//!                         ▼
//!             [nearest, 2nd, 3rd, ...]  ─► take(limit)
//! ```
//!
//! The index is an immutable snapshot built from reference data; lookups
//! are lock-free and side-effect free.

pub mod gazetteer;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{AssignmentError, Result};
use crate::types::{GeoPoint, Office, OfficeId};

pub use gazetteer::{normalize_place, Gazetteer};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance between two points, in kilometers
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1.0 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// An office together with its distance from the query point
#[derive(Debug, Clone)]
pub struct NearbyOffice {
    pub office: Arc<Office>,
    pub distance_km: f64,
}

/// Immutable set of office locations
#[derive(Debug, Clone, Default)]
pub struct GeoIndex {
    offices: Vec<Arc<Office>>,
}

impl GeoIndex {
    /// Build an index; offices are kept in identity order
    pub fn new(offices: impl IntoIterator<Item = Office>) -> Self {
        let mut offices: Vec<Arc<Office>> = offices.into_iter().map(Arc::new).collect();
        offices.sort_by(|a, b| a.id.cmp(&b.id));
        offices.dedup_by(|a, b| a.id == b.id);
        Self { offices }
    }

    pub fn len(&self) -> usize {
        self.offices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offices.is_empty()
    }

    /// All offices in identity order
    pub fn offices(&self) -> &[Arc<Office>] {
        &self.offices
    }

    pub fn get(&self, id: &OfficeId) -> Option<&Arc<Office>> {
        self.offices
            .binary_search_by(|o| o.id.cmp(id))
            .ok()
            .map(|idx| &self.offices[idx])
    }

    /// Up to `limit` offices ordered by ascending distance from `point`,
    /// ties broken by office id
    pub fn nearest_offices(&self, point: GeoPoint, limit: usize) -> Result<Vec<NearbyOffice>> {
        let mut ranked = self.ranked(point)?;
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Every office ordered by ascending distance from `point`
    pub fn ranked(&self, point: GeoPoint) -> Result<Vec<NearbyOffice>> {
        if self.offices.is_empty() {
            return Err(AssignmentError::NoOfficesConfigured);
        }

        let mut ranked: Vec<NearbyOffice> = self
            .offices
            .iter()
            .map(|office| NearbyOffice {
                distance_km: haversine_km(point, office.location),
                office: Arc::clone(office),
            })
            .collect();

        ranked.sort_by(|a, b| match a.distance_km.total_cmp(&b.distance_km) {
            Ordering::Equal => a.office.id.cmp(&b.office.id),
            other => other,
        });
        Ok(ranked)
    }
}
