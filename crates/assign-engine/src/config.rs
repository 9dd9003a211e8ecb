//! Engine configuration
//!
//! Every section carries `#[serde(default)]`, so a configuration file only
//! needs to name the values it changes. Sources are layered through the
//! `config` crate: an optional TOML/JSON file first, then `FIRE__*`
//! environment variables (for example `FIRE__ROUTING__TOP_K=5`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AssignmentError, Result};
use crate::escalation::PriorityOrder;
use crate::types::OfficeId;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub routing: RoutingConfig,
    pub escalation: EscalationConfig,
    pub skills: SkillsConfig,
    pub dispatch: DispatchConfig,
    pub database: DatabaseConfig,
    pub logging: LogConfig,
}

/// Office search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Number of nearest offices tried before the escalation policy runs
    pub top_k: usize,
    /// Geocode the ticket city when the analysis carries no point
    pub geocode_ticket_city: bool,
    /// Offices receiving tickets whose location cannot be resolved
    pub hub_offices: Vec<OfficeId>,
    /// Re-selection attempts when a load increment loses a race
    pub max_load_conflict_retries: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            geocode_ticket_city: true,
            hub_offices: Vec::new(),
            max_load_conflict_retries: 3,
        }
    }
}

/// Escalation policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Priorities at least this urgent escalate instead of widening the search
    pub priority_threshold: u8,
    pub priority_order: PriorityOrder,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            priority_threshold: 1,
            priority_order: PriorityOrder::LowerIsUrgent,
        }
    }
}

/// Skill matching rules
///
/// Only `synonyms` influences the type match. The segment, language and
/// position rules are opt-in and empty by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Ticket type -> additional skill tags that can handle it
    pub synonyms: BTreeMap<String, Vec<String>>,
    /// Customer segment -> skill tag the manager must carry
    pub segment_skills: BTreeMap<String, String>,
    /// Detected language -> skill tag the manager must carry
    pub language_skills: BTreeMap<String, String>,
    /// Ticket type -> keywords that must all appear in the manager position
    pub position_rules: BTreeMap<String, Vec<String>>,
}

impl SkillsConfig {
    /// Routing rules of the Kazakhstan deployment: VIP segments need the VIP
    /// tag, KZ/ENG tickets need the language tag and data-change requests go
    /// to chief specialists.
    pub fn kazakhstan_rules() -> Self {
        let mut cfg = Self::default();
        cfg.segment_skills.insert("VIP".into(), "VIP".into());
        cfg.segment_skills.insert("PRIORITY".into(), "VIP".into());
        cfg.language_skills.insert("KZ".into(), "KZ".into());
        cfg.language_skills.insert("ENG".into(), "ENG".into());
        cfg.position_rules.insert(
            "Смена данных".into(),
            vec!["глав".into(), "спец".into()],
        );
        cfg
    }
}

/// Batch dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Tickets processed concurrently
    pub concurrency: usize,
    /// Attempts per ticket for transient failures, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_attempts: 4,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://fire.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Logging configuration as it appears in files and the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
    pub log_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional file overlaid with `FIRE__*`
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FIRE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("routing.hub_offices"),
        );

        let cfg: EngineConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.routing.top_k == 0 {
            return Err(AssignmentError::config("routing.top_k must be at least 1"));
        }
        if self.routing.max_load_conflict_retries == 0 {
            return Err(AssignmentError::config(
                "routing.max_load_conflict_retries must be at least 1",
            ));
        }
        if self.dispatch.concurrency == 0 {
            return Err(AssignmentError::config("dispatch.concurrency must be at least 1"));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(AssignmentError::config("dispatch.max_attempts must be at least 1"));
        }
        if self.dispatch.base_delay_ms > self.dispatch.max_delay_ms {
            return Err(AssignmentError::config(format!(
                "dispatch.base_delay_ms ({}) exceeds dispatch.max_delay_ms ({})",
                self.dispatch.base_delay_ms, self.dispatch.max_delay_ms
            )));
        }
        if self.database.max_connections == 0 {
            return Err(AssignmentError::config("database.max_connections must be at least 1"));
        }
        crate::logging::parse_log_level(&self.logging.level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.routing.top_k, 3);
        assert_eq!(cfg.escalation.priority_threshold, 1);
        assert!(cfg.skills.segment_skills.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut cfg = EngineConfig::default();
        cfg.routing.top_k = 0;
        assert!(matches!(cfg.validate(), Err(AssignmentError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut cfg = EngineConfig::default();
        cfg.logging.level = "chatty".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_partial_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[routing]
top_k = 2
hub_offices = ["astana", "almaty"]

[escalation]
priority_threshold = 9
priority_order = "higher_is_urgent"

[skills.synonyms]
billing = ["payments"]
"#
        )
        .unwrap();

        let cfg = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.routing.top_k, 2);
        assert_eq!(cfg.routing.hub_offices.len(), 2);
        assert!(cfg.routing.geocode_ticket_city);
        assert_eq!(cfg.escalation.priority_order, PriorityOrder::HigherIsUrgent);
        assert_eq!(cfg.skills.synonyms["billing"], vec!["payments".to_string()]);
        assert_eq!(cfg.dispatch.max_attempts, 4);
    }
}
