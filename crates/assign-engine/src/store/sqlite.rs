//! # SQLite Store (sqlx)
//!
//! Durable adapter for all three store traits. The schema lives in
//! `migrations/` and is applied on connect.
//!
//! ## Atomic persist
//!
//! ```text
//! BEGIN
//!   SELECT manager ─── missing ─► ROLLBACK, NotFound
//!   INSERT INTO assignments ... ON CONFLICT(ticket_guid) DO NOTHING
//!     └─ 0 rows ─► ROLLBACK, DuplicateGuid
//!   UPDATE managers SET current_load = current_load + 1
//!    WHERE manager_id = ? AND current_load = ?observed
//!     └─ 0 rows ─► ROLLBACK, LoadConflict
//! COMMIT
//! ```
//!
//! The compare-and-increment keeps counters exact even when several
//! processes share one database file.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AssignmentStore, LoadAuditEntry, ReferenceSource, TicketSource};
use crate::config::DatabaseConfig;
use crate::error::{AssignmentError, Result};
use crate::types::{
    Address, AiAnalysis, AnalysisId, Assignment, AssignmentId, GeoPoint, Manager, ManagerId,
    Office, OfficeId, OfficeReason, Sentiment, Ticket, TicketGuid,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect with production settings and run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("🗄️ Opening assignment database: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .foreign_keys(true)
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database,
        // so the pool must hold exactly one.
        let max_connections = if is_memory_url(&config.url) {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("✅ Assignment database ready (WAL mode)");
        Ok(Self { pool })
    }

    /// Connect to a database URL with default pool settings
    pub async fn open(url: &str) -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Fresh in-memory database for tests
    pub async fn in_memory() -> Result<Self> {
        Self::open("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn upsert_office(&self, office: &Office) -> Result<()> {
        sqlx::query(
            "INSERT INTO offices (office_id, name, address, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(office_id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                latitude = excluded.latitude,
                longitude = excluded.longitude",
        )
        .bind(office.id.as_str())
        .bind(&office.name)
        .bind(&office.address)
        .bind(office.location.latitude)
        .bind(office.location.longitude)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or update a manager. On insert `current_load` becomes both the
    /// baseline and the live counter; on update the counters are left alone.
    pub async fn upsert_manager(&self, manager: &Manager) -> Result<()> {
        let skills = serde_json::to_string(&manager.skills)?;
        sqlx::query(
            "INSERT INTO managers (manager_id, name, position, office_id, skills, baseline_load, current_load)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(manager_id) DO UPDATE SET
                name = excluded.name,
                position = excluded.position,
                office_id = excluded.office_id,
                skills = excluded.skills",
        )
        .bind(manager.id.as_str())
        .bind(&manager.name)
        .bind(&manager.position)
        .bind(manager.office_id.as_str())
        .bind(skills)
        .bind(i64::from(manager.current_load))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_ticket(&self, ticket: &Ticket) -> Result<()> {
        let attachments = serde_json::to_string(&ticket.attachments)?;
        sqlx::query(
            "INSERT INTO tickets (guid, gender, birth_date, description, attachments, segment,
                                  country, region, city, street, house)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(guid) DO UPDATE SET
                gender = excluded.gender,
                birth_date = excluded.birth_date,
                description = excluded.description,
                attachments = excluded.attachments,
                segment = excluded.segment,
                country = excluded.country,
                region = excluded.region,
                city = excluded.city,
                street = excluded.street,
                house = excluded.house",
        )
        .bind(ticket.guid.as_str())
        .bind(&ticket.gender)
        .bind(ticket.birth_date)
        .bind(&ticket.description)
        .bind(attachments)
        .bind(&ticket.segment)
        .bind(&ticket.address.country)
        .bind(&ticket.address.region)
        .bind(&ticket.address.city)
        .bind(&ticket.address.street)
        .bind(&ticket.address.house)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Analyses are append-only; re-inserting an id is a no-op
    pub async fn insert_analysis(&self, analysis: &AiAnalysis) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_analysis (analysis_id, ticket_guid, ticket_type, language, sentiment,
                                      priority, summary, recommendation, latitude, longitude, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(analysis_id) DO NOTHING",
        )
        .bind(analysis.id.as_str())
        .bind(analysis.ticket_guid.as_str())
        .bind(&analysis.ticket_type)
        .bind(&analysis.language)
        .bind(analysis.sentiment.as_str())
        .bind(i64::from(analysis.priority))
        .bind(&analysis.summary)
        .bind(&analysis.recommendation)
        .bind(analysis.geo_point.map(|p| p.latitude))
        .bind(analysis.geo_point.map(|p| p.longitude))
        .bind(analysis.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All assignments, newest first
    pub async fn list_assignments(&self) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT assignment_id, ticket_guid, analysis_id, manager_id, office_id, office_reason,
                    distance_km, is_escalation, trace, created_at
             FROM assignments ORDER BY created_at DESC, ticket_guid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(assignment_from_row).collect()
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn load_from_db(raw: i64) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

fn office_from_row(row: &SqliteRow) -> Result<Office> {
    Ok(Office {
        id: OfficeId(row.try_get("office_id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        location: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
    })
}

fn manager_from_row(row: &SqliteRow) -> Result<Manager> {
    let skills: String = row.try_get("skills")?;
    Ok(Manager {
        id: ManagerId(row.try_get("manager_id")?),
        name: row.try_get("name")?,
        position: row.try_get("position")?,
        office_id: OfficeId(row.try_get("office_id")?),
        skills: serde_json::from_str(&skills)?,
        current_load: load_from_db(row.try_get("current_load")?),
    })
}

fn ticket_from_row(row: &SqliteRow) -> Result<Ticket> {
    let attachments: String = row.try_get("attachments")?;
    let birth_date: Option<NaiveDate> = row.try_get("birth_date")?;
    Ok(Ticket {
        guid: TicketGuid(row.try_get("guid")?),
        gender: row.try_get("gender")?,
        birth_date,
        description: row.try_get("description")?,
        attachments: serde_json::from_str(&attachments)?,
        segment: row.try_get("segment")?,
        address: Address {
            country: row.try_get("country")?,
            region: row.try_get("region")?,
            city: row.try_get("city")?,
            street: row.try_get("street")?,
            house: row.try_get("house")?,
        },
    })
}

fn analysis_from_row(row: &SqliteRow) -> Result<AiAnalysis> {
    let sentiment: String = row.try_get("sentiment")?;
    let priority: i64 = row.try_get("priority")?;
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    Ok(AiAnalysis {
        id: AnalysisId(row.try_get("analysis_id")?),
        ticket_guid: TicketGuid(row.try_get("ticket_guid")?),
        ticket_type: row.try_get("ticket_type")?,
        language: row.try_get("language")?,
        sentiment: Sentiment::from_str(&sentiment)?,
        priority: u8::try_from(priority).map_err(|_| {
            AssignmentError::persistence(format!("priority {} out of range", priority))
        })?,
        summary: row.try_get("summary")?,
        recommendation: row.try_get("recommendation")?,
        geo_point: latitude.zip(longitude).map(|(lat, lon)| GeoPoint::new(lat, lon)),
        created_at: row.try_get("created_at")?,
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<Assignment> {
    let id: String = row.try_get("assignment_id")?;
    let reason: String = row.try_get("office_reason")?;
    let trace: String = row.try_get("trace")?;
    let manager_id: Option<String> = row.try_get("manager_id")?;
    let office_id: Option<String> = row.try_get("office_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Assignment {
        id: AssignmentId(
            Uuid::parse_str(&id)
                .map_err(|e| {
                    AssignmentError::persistence(format!("bad assignment id {}: {}", id, e))
                })?,
        ),
        ticket_guid: TicketGuid(row.try_get("ticket_guid")?),
        analysis_id: AnalysisId(row.try_get("analysis_id")?),
        manager_id: manager_id.map(ManagerId),
        office_id: office_id.map(OfficeId),
        office_reason: OfficeReason::from_str(&reason)?,
        distance_km: row.try_get("distance_km")?,
        is_escalation: row.try_get("is_escalation")?,
        trace: serde_json::from_str(&trace)?,
        created_at,
    })
}

#[async_trait]
impl ReferenceSource for SqliteStore {
    async fn offices(&self) -> Result<Vec<Office>> {
        let rows = sqlx::query(
            "SELECT office_id, name, address, latitude, longitude FROM offices ORDER BY office_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(office_from_row).collect()
    }

    async fn managers(&self) -> Result<Vec<Manager>> {
        let rows = sqlx::query(
            "SELECT manager_id, name, position, office_id, skills, current_load
             FROM managers ORDER BY manager_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(manager_from_row).collect()
    }
}

#[async_trait]
impl TicketSource for SqliteStore {
    async fn ticket(&self, guid: &TicketGuid) -> Result<Option<Ticket>> {
        let row = sqlx::query(
            "SELECT guid, gender, birth_date, description, attachments, segment,
                    country, region, city, street, house
             FROM tickets WHERE guid = ?1",
        )
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn analysis_for(&self, guid: &TicketGuid) -> Result<Option<AiAnalysis>> {
        let rows = sqlx::query(
            "SELECT analysis_id, ticket_guid, ticket_type, language, sentiment, priority,
                    summary, recommendation, latitude, longitude, created_at
             FROM ai_analysis WHERE ticket_guid = ?1",
        )
        .bind(guid.as_str())
        .fetch_all(&self.pool)
        .await?;

        let analyses = rows
            .iter()
            .map(analysis_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(analyses
            .into_iter()
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))))
    }

    async fn unassigned_tickets(&self) -> Result<Vec<TicketGuid>> {
        let guids: Vec<String> = sqlx::query_scalar(
            "SELECT t.guid FROM tickets t
             WHERE EXISTS (SELECT 1 FROM ai_analysis a WHERE a.ticket_guid = t.guid)
               AND NOT EXISTS (SELECT 1 FROM assignments s WHERE s.ticket_guid = t.guid)
             ORDER BY t.guid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(guids.into_iter().map(TicketGuid).collect())
    }
}

#[async_trait]
impl AssignmentStore for SqliteStore {
    async fn find_by_ticket(&self, guid: &TicketGuid) -> Result<Option<Assignment>> {
        let row = sqlx::query(
            "SELECT assignment_id, ticket_guid, analysis_id, manager_id, office_id, office_reason,
                    distance_km, is_escalation, trace, created_at
             FROM assignments WHERE ticket_guid = ?1",
        )
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn manager_loads(&self, ids: &[ManagerId]) -> Result<HashMap<ManagerId, u32>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT manager_id, current_load FROM managers WHERE manager_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut loads = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("manager_id")?;
            let load: i64 = row.try_get("current_load")?;
            loads.insert(ManagerId(id), load_from_db(load));
        }
        Ok(loads)
    }

    async fn persist(
        &self,
        assignment: &Assignment,
        observed_load: Option<u32>,
    ) -> Result<Assignment> {
        let trace = serde_json::to_string(&assignment.trace)?;
        let manager_id = match (&assignment.manager_id, assignment.is_escalation) {
            (_, true) => None,
            (Some(id), false) => Some(id),
            (None, false) => {
                return Err(AssignmentError::invalid_input(
                    "non-escalated assignment without a manager",
                ))
            }
        };
        let mut tx = self.pool.begin().await?;

        // The foreign key on assignments.manager_id would reject an unknown
        // manager with a generic constraint error; report it as NotFound
        if let Some(manager_id) = manager_id {
            let known: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM managers WHERE manager_id = ?1")
                    .bind(manager_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
            if known.is_none() {
                tx.rollback().await?;
                return Err(AssignmentError::not_found(format!("manager {}", manager_id)));
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO assignments (assignment_id, ticket_guid, analysis_id, manager_id, office_id,
                                      office_reason, distance_km, is_escalation, trace, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(ticket_guid) DO NOTHING",
        )
        .bind(assignment.id.0.to_string())
        .bind(assignment.ticket_guid.as_str())
        .bind(assignment.analysis_id.as_str())
        .bind(assignment.manager_id.as_ref().map(|m| m.as_str()))
        .bind(assignment.office_id.as_ref().map(|o| o.as_str()))
        .bind(assignment.office_reason.as_str())
        .bind(assignment.distance_km)
        .bind(assignment.is_escalation)
        .bind(trace)
        .bind(assignment.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            warn!("⚠️ Ticket {} already has an assignment", assignment.ticket_guid);
            return Err(AssignmentError::DuplicateGuid(assignment.ticket_guid.clone()));
        }

        if let Some(manager_id) = manager_id {
            let updated = match observed_load {
                Some(expected) => sqlx::query(
                    "UPDATE managers SET current_load = current_load + 1
                     WHERE manager_id = ?1 AND current_load = ?2",
                )
                .bind(manager_id.as_str())
                .bind(i64::from(expected)),
                None => sqlx::query(
                    "UPDATE managers SET current_load = current_load + 1 WHERE manager_id = ?1",
                )
                .bind(manager_id.as_str()),
            }
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let actual: i64 =
                    sqlx::query_scalar("SELECT current_load FROM managers WHERE manager_id = ?1")
                        .bind(manager_id.as_str())
                        .fetch_one(&mut *tx)
                        .await?;
                tx.rollback().await?;

                return Err(AssignmentError::LoadConflict {
                    manager_id: manager_id.clone(),
                    expected: observed_load.unwrap_or_default(),
                    actual: load_from_db(actual),
                });
            }
        }

        tx.commit().await?;
        debug!(
            "Persisted assignment {} for ticket {}",
            assignment.id, assignment.ticket_guid
        );
        Ok(assignment.clone())
    }

    async fn load_audit(&self) -> Result<Vec<LoadAuditEntry>> {
        let rows = sqlx::query(
            "SELECT m.manager_id, m.current_load, m.baseline_load,
                    (SELECT COUNT(*) FROM assignments a
                      WHERE a.manager_id = m.manager_id AND a.is_escalation = 0) AS assigned_count
             FROM managers m ORDER BY m.manager_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LoadAuditEntry {
                    manager_id: ManagerId(row.try_get("manager_id")?),
                    current_load: load_from_db(row.try_get("current_load")?),
                    baseline_load: load_from_db(row.try_get("baseline_load")?),
                    assigned_count: load_from_db(row.try_get("assigned_count")?),
                })
            })
            .collect()
    }
}
