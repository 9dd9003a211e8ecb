//! SQLite adapter: schema, atomic persist and end-to-end routing

mod common;

use std::sync::Arc;

use common::*;
use fire_assign_engine::config::DatabaseConfig;
use fire_assign_engine::prelude::*;
use fire_assign_engine::{AssignmentEngineBuilder, GeoPoint};
use futures::future::join_all;
use serial_test::serial;
use tempfile::TempDir;

async fn create_test_db() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}", dir.path().join("fire-test.db").display());
    let store = SqliteStore::connect(&DatabaseConfig {
        url,
        max_connections: 4,
        busy_timeout_ms: 5_000,
    })
    .await
    .expect("database opens");
    (store, dir)
}

async fn seed_reference(store: &SqliteStore) {
    store.upsert_office(&create_test_office("a", 0.0, 0.0)).await.unwrap();
    store.upsert_office(&create_test_office("b", 10.0, 10.0)).await.unwrap();
    store
        .upsert_manager(&create_test_manager("m1", "a", &["billing"], 2))
        .await
        .unwrap();
    store
        .upsert_manager(&create_test_manager("m2", "a", &["billing"], 0))
        .await
        .unwrap();
    store
        .upsert_manager(&create_test_manager("m3", "b", &["fraud", "VIP"], 1))
        .await
        .unwrap();
}

async fn seed_ticket(store: &SqliteStore, guid: &str, ticket_type: &str, point: (f64, f64)) {
    let (ticket, analysis) = create_test_ticket(guid, ticket_type, 3, Some(point));
    store.upsert_ticket(&ticket).await.unwrap();
    store.insert_analysis(&analysis).await.unwrap();
}

#[tokio::test]
async fn test_reference_round_trip() {
    let store = SqliteStore::in_memory().await.unwrap();
    seed_reference(&store).await;

    let offices = store.offices().await.unwrap();
    assert_eq!(offices.len(), 2);
    assert_eq!(offices[1].location, GeoPoint::new(10.0, 10.0));

    let managers = store.managers().await.unwrap();
    assert_eq!(managers.len(), 3);
    assert!(managers[2].skills.contains("VIP"));
    assert_eq!(managers[0].current_load, 2);

    // Re-seeding keeps live counters
    store
        .upsert_manager(&create_test_manager("m1", "a", &["billing", "fraud"], 99))
        .await
        .unwrap();
    let loads = store.manager_loads(&[ManagerId::from("m1")]).await.unwrap();
    assert_eq!(loads[&ManagerId::from("m1")], 2);
}

#[tokio::test]
async fn test_ticket_and_latest_analysis() {
    let store = SqliteStore::in_memory().await.unwrap();
    let mut ticket = Ticket::new("t-1", "VIP").with_city("Астана");
    ticket.attachments = vec!["scan.pdf".into()];
    ticket.birth_date = chrono::NaiveDate::from_ymd_opt(1990, 5, 17);
    store.upsert_ticket(&ticket).await.unwrap();

    let mut old = AiAnalysis::new("an-1", "t-1", "billing", 4);
    old.created_at = chrono::Utc::now() - chrono::Duration::hours(2);
    let mut new = AiAnalysis::new("an-2", "t-1", "fraud", 2).with_language("KZ");
    new.sentiment = Sentiment::Negative;
    store.insert_analysis(&old).await.unwrap();
    store.insert_analysis(&new).await.unwrap();

    let loaded = store.ticket(&TicketGuid::from("t-1")).await.unwrap().unwrap();
    assert_eq!(loaded, ticket);

    let latest = store.analysis_for(&TicketGuid::from("t-1")).await.unwrap().unwrap();
    assert_eq!(latest.id, AnalysisId::from("an-2"));
    assert_eq!(latest.sentiment, Sentiment::Negative);
    assert_eq!(latest.language, "KZ");
    assert_eq!(latest.geo_point, None);

    assert_eq!(
        store.unassigned_tickets().await.unwrap(),
        vec![TicketGuid::from("t-1")]
    );
}

#[tokio::test]
async fn test_engine_on_sqlite() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    seed_reference(&store).await;
    seed_ticket(&store, "t-1", "billing", (1.0, 1.0)).await;
    seed_ticket(&store, "t-2", "legal", (1.0, 1.0)).await;

    let engine = AssignmentEngineBuilder::new()
        .with_backend(store.clone())
        .build()
        .await
        .unwrap();

    let assignment = engine.assign_guid(&TicketGuid::from("t-1")).await.unwrap();
    assert_eq!(assignment.manager_id, Some(ManagerId::from("m2")));
    assert_eq!(assignment.office_reason, OfficeReason::Nearest);

    // Stored record and trace survive the round trip
    let stored = store.find_by_ticket(&TicketGuid::from("t-1")).await.unwrap().unwrap();
    assert_eq!(stored.id, assignment.id);
    assert_eq!(stored.trace.steps.len(), assignment.trace.steps.len());
    let explained = engine.explain(&TicketGuid::from("t-1")).await.unwrap();
    assert_eq!(explained.summary.manager_id, Some(ManagerId::from("m2")));
    assert_eq!(explained.summary.office_reason, OfficeReason::Nearest);
    assert!(matches!(
        explained.why_not_manager(&ManagerId::from("m1")),
        Explanation::Rejected(_)
    ));

    // Idempotent
    let again = engine.assign_guid(&TicketGuid::from("t-1")).await.unwrap();
    assert_eq!(again.id, assignment.id);

    let escalated = engine.assign_guid(&TicketGuid::from("t-2")).await.unwrap();
    assert!(escalated.is_escalation);
    assert_eq!(escalated.manager_id, None);

    let audit = store.load_audit().await.unwrap();
    assert_eq!(audit.len(), 3);
    assert!(audit.iter().all(|e| e.is_consistent()));
    let m2 = audit.iter().find(|e| e.manager_id.as_str() == "m2").unwrap();
    assert_eq!((m2.current_load, m2.assigned_count), (1, 1));

    assert!(store.unassigned_tickets().await.unwrap().is_empty());
    assert_eq!(store.list_assignments().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_persist_rejects_duplicate_and_stale_load() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    seed_reference(&store).await;
    seed_ticket(&store, "t-1", "billing", (1.0, 1.0)).await;

    let engine = AssignmentEngineBuilder::new()
        .with_backend(store.clone())
        .build()
        .await
        .unwrap();
    let assignment = engine.assign_guid(&TicketGuid::from("t-1")).await.unwrap();

    let mut copy = assignment.clone();
    copy.id = AssignmentId::new();
    let err = store.persist(&copy, None).await.unwrap_err();
    assert_eq!(err, AssignmentError::DuplicateGuid(TicketGuid::from("t-1")));

    let mut other = assignment.clone();
    other.id = AssignmentId::new();
    other.ticket_guid = TicketGuid::from("t-other");
    let err = store.persist(&other, Some(0)).await.unwrap_err();
    assert!(matches!(
        err,
        AssignmentError::LoadConflict { expected: 0, actual: 1, .. }
    ));
    // Rolled back: no row for t-other, load unchanged
    assert!(store.find_by_ticket(&TicketGuid::from("t-other")).await.unwrap().is_none());
    let loads = store.manager_loads(&[ManagerId::from("m2")]).await.unwrap();
    assert_eq!(loads[&ManagerId::from("m2")], 1);
}

#[tokio::test]
async fn test_persist_unknown_manager_is_not_found() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    seed_reference(&store).await;
    seed_ticket(&store, "t-1", "billing", (1.0, 1.0)).await;

    let engine = AssignmentEngineBuilder::new()
        .with_backend(store.clone())
        .build()
        .await
        .unwrap();
    let mut assignment = engine.assign_guid(&TicketGuid::from("t-1")).await.unwrap();
    assignment.id = AssignmentId::new();
    assignment.ticket_guid = TicketGuid::from("t-ghost-manager");
    assignment.manager_id = Some(ManagerId::from("m-retired"));

    let err = store.persist(&assignment, Some(0)).await.unwrap_err();
    assert!(matches!(err, AssignmentError::NotFound(_)), "got {:?}", err);
    assert!(!err.is_retryable());
    assert!(store
        .find_by_ticket(&TicketGuid::from("t-ghost-manager"))
        .await
        .unwrap()
        .is_none());
    let audit = store.load_audit().await.unwrap();
    assert!(audit.iter().all(|e| e.is_consistent()));
}

#[tokio::test]
#[serial]
async fn test_file_database_concurrent_assigns() {
    const N: usize = 24;
    let (store, _dir) = create_test_db().await;
    seed_reference(&store).await;
    for i in 0..N {
        seed_ticket(&store, &format!("t-{:02}", i), "billing", (0.5, 0.5)).await;
    }

    let store = Arc::new(store);
    let engine = Arc::new(
        AssignmentEngineBuilder::new()
            .with_backend(store.clone())
            .build()
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let engine = engine.clone();
            let guid = TicketGuid::from(format!("t-{:02}", i));
            tokio::spawn(async move { engine.assign_guid(&guid).await })
        })
        .collect();
    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }

    let loads = store
        .manager_loads(&[ManagerId::from("m1"), ManagerId::from("m2")])
        .await
        .unwrap();
    // Baselines 2 + 0 plus N increments, balanced to within one
    assert_eq!(loads.values().sum::<u32>(), 2 + N as u32);
    let diff = loads[&ManagerId::from("m1")].abs_diff(loads[&ManagerId::from("m2")]);
    assert!(diff <= 1, "loads {:?}", loads);

    let audit = store.load_audit().await.unwrap();
    assert!(audit.iter().all(|e| e.is_consistent()));
}

#[tokio::test]
#[serial]
async fn test_file_database_survives_reopen() {
    let (store, dir) = create_test_db().await;
    seed_reference(&store).await;
    seed_ticket(&store, "t-1", "fraud", (9.0, 9.0)).await;

    let store = Arc::new(store);
    let engine = AssignmentEngineBuilder::new()
        .with_backend(store.clone())
        .build()
        .await
        .unwrap();
    let first = engine.assign_guid(&TicketGuid::from("t-1")).await.unwrap();
    assert_eq!(first.manager_id, Some(ManagerId::from("m3")));
    store.pool().close().await;

    let url = format!("sqlite://{}", dir.path().join("fire-test.db").display());
    let reopened = Arc::new(SqliteStore::open(&url).await.unwrap());
    let engine = AssignmentEngineBuilder::new()
        .with_backend(reopened.clone())
        .build()
        .await
        .unwrap();
    let again = engine.assign_guid(&TicketGuid::from("t-1")).await.unwrap();
    assert_eq!(again.id, first.id);

    let loads = reopened.manager_loads(&[ManagerId::from("m3")]).await.unwrap();
    assert_eq!(loads[&ManagerId::from("m3")], 2);
}
