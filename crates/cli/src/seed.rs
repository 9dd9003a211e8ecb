//! Seed file format

use std::path::Path;

use anyhow::{Context, Result};
use fire_assign_engine::prelude::*;
use serde::Deserialize;
use tracing::info;

/// Everything `fire seed` can load. All sections are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub offices: Vec<Office>,
    pub managers: Vec<Manager>,
    pub tickets: Vec<Ticket>,
    pub analyses: Vec<AiAnalysis>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedCounts {
    pub offices: usize,
    pub managers: usize,
    pub tickets: usize,
    pub analyses: usize,
}

impl SeedFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let seed: SeedFile = serde_json::from_str(raw)?;
        seed.check_references()?;
        Ok(seed)
    }

    /// Managers must point at a seeded office and analyses at a seeded
    /// ticket, unless the section being referenced is absent (it may
    /// already be in the database).
    fn check_references(&self) -> Result<()> {
        if !self.offices.is_empty() {
            for manager in &self.managers {
                if !self.offices.iter().any(|o| o.id == manager.office_id) {
                    anyhow::bail!(
                        "manager {} references unknown office {}",
                        manager.id,
                        manager.office_id
                    );
                }
            }
        }
        if !self.tickets.is_empty() {
            for analysis in &self.analyses {
                if !self.tickets.iter().any(|t| t.guid == analysis.ticket_guid) {
                    anyhow::bail!(
                        "analysis {} references unknown ticket {}",
                        analysis.id,
                        analysis.ticket_guid
                    );
                }
            }
        }
        Ok(())
    }

    /// Write every section, parents first
    pub async fn apply(&self, store: &SqliteStore) -> Result<SeedCounts> {
        for office in &self.offices {
            store.upsert_office(office).await?;
        }
        for manager in &self.managers {
            store.upsert_manager(manager).await?;
        }
        for ticket in &self.tickets {
            store.upsert_ticket(ticket).await?;
        }
        for analysis in &self.analyses {
            store.insert_analysis(analysis).await?;
        }

        let counts = SeedCounts {
            offices: self.offices.len(),
            managers: self.managers.len(),
            tickets: self.tickets.len(),
            analyses: self.analyses.len(),
        };
        info!("🌱 Seeded {:?}", counts);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"{
        "offices": [
            {"id": "astana", "name": "Астана", "location": {"latitude": 51.1694, "longitude": 71.4491}},
            {"id": "almaty", "name": "Алматы", "location": {"latitude": 43.2389, "longitude": 76.8897}}
        ],
        "managers": [
            {"id": "m1", "name": "Айгерим", "position": "Главный специалист",
             "office_id": "astana", "skills": ["VIP", "ENG"], "current_load": 3}
        ],
        "tickets": [
            {"guid": "t-1", "segment": "VIP", "address": {"city": "Астана"}}
        ],
        "analyses": [
            {"id": "an-1", "ticket_guid": "t-1", "ticket_type": "Жалоба",
             "sentiment": "NEG", "priority": 2}
        ]
    }"#;

    #[test]
    fn test_parse_seed() {
        let seed = SeedFile::from_json(SEED).unwrap();
        assert_eq!(seed.offices.len(), 2);
        assert_eq!(seed.managers[0].skills.len(), 2);
        assert_eq!(seed.managers[0].current_load, 3);
        assert_eq!(seed.tickets[0].address.city.as_deref(), Some("Астана"));
        assert_eq!(seed.analyses[0].sentiment, Sentiment::Negative);
        assert_eq!(seed.analyses[0].geo_point, None);
    }

    #[test]
    fn test_sections_are_optional() {
        let seed = SeedFile::from_json(r#"{"tickets": []}"#).unwrap();
        assert!(seed.offices.is_empty());
        assert!(seed.analyses.is_empty());
    }

    #[test]
    fn test_dangling_references_rejected() {
        let raw = r#"{
            "offices": [{"id": "a", "name": "A", "location": {"latitude": 0.0, "longitude": 0.0}}],
            "managers": [{"id": "m1", "name": "M", "office_id": "b"}]
        }"#;
        let err = SeedFile::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("unknown office b"));
    }

    #[tokio::test]
    async fn test_apply_to_sqlite() {
        let store = SqliteStore::in_memory().await.unwrap();
        let seed = SeedFile::from_json(SEED).unwrap();
        let counts = seed.apply(&store).await.unwrap();
        assert_eq!(
            counts,
            SeedCounts {
                offices: 2,
                managers: 1,
                tickets: 1,
                analyses: 1
            }
        );
        assert_eq!(store.offices().await.unwrap().len(), 2);
        assert_eq!(
            store.unassigned_tickets().await.unwrap(),
            vec![TicketGuid::from("t-1")]
        );
    }
}
