#![allow(dead_code)]

use std::sync::Arc;

use fire_assign_engine::prelude::*;
use fire_assign_engine::{AssignmentEngineBuilder, GeoPoint};

pub fn create_test_office(id: &str, lat: f64, lon: f64) -> Office {
    Office {
        id: OfficeId::from(id),
        name: format!("Office {}", id.to_uppercase()),
        address: String::new(),
        location: GeoPoint::new(lat, lon),
    }
}

pub fn create_test_manager(id: &str, office: &str, skills: &[&str], load: u32) -> Manager {
    Manager {
        id: ManagerId::from(id),
        name: format!("Manager {}", id),
        position: "Специалист".to_string(),
        office_id: OfficeId::from(office),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        current_load: load,
    }
}

/// Ticket plus an analysis located at `point`
pub fn create_test_ticket(
    guid: &str,
    ticket_type: &str,
    priority: u8,
    point: Option<(f64, f64)>,
) -> (Ticket, AiAnalysis) {
    let ticket = Ticket::new(guid, "Mass");
    let mut analysis = AiAnalysis::new(format!("an-{}", guid), guid, ticket_type, priority);
    if let Some((lat, lon)) = point {
        analysis = analysis.with_geo_point(GeoPoint::new(lat, lon));
    }
    (ticket, analysis)
}

/// Two offices ~1400 km apart used by most scenarios:
/// A at (0,0), B at (10,10)
pub fn two_office_store(managers: Vec<Manager>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_reference(
        vec![
            create_test_office("a", 0.0, 0.0),
            create_test_office("b", 10.0, 10.0),
        ],
        managers,
    ))
}

pub async fn create_test_engine(store: Arc<MemoryStore>, config: EngineConfig) -> AssignmentEngine {
    AssignmentEngineBuilder::new()
        .with_config(config)
        .with_backend(store)
        .build()
        .await
        .expect("engine builds")
}

/// Seed tickets and analyses into a memory store
pub fn seed_tickets(store: &MemoryStore, items: Vec<(Ticket, AiAnalysis)>) {
    for (ticket, analysis) in items {
        store.add_ticket(ticket);
        store.add_analysis(analysis);
    }
}
