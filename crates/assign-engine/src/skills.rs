//! # Skill Matching
//!
//! Decides whether a manager can handle a ticket. The base rule compares the
//! AI ticket type against the manager's skill tags, case-insensitively and
//! with configurable synonyms. Segment, language and position rules layer on
//! top when configured.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::SkillsConfig;
use crate::types::{AiAnalysis, Manager, Ticket};

/// Why a manager cannot take a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SkillMismatch {
    /// No skill tag matches the ticket type or its synonyms
    TicketType { ticket_type: String },
    /// Customer segment needs a tag the manager lacks
    Segment { segment: String, required_skill: String },
    /// Ticket language needs a tag the manager lacks
    Language { language: String, required_skill: String },
    /// Manager position lacks the keywords the ticket type requires
    Position { ticket_type: String, required_keywords: Vec<String> },
}

impl std::fmt::Display for SkillMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillMismatch::TicketType { ticket_type } => {
                write!(f, "no skill for ticket type '{}'", ticket_type)
            }
            SkillMismatch::Segment { segment, required_skill } => {
                write!(f, "segment '{}' requires skill '{}'", segment, required_skill)
            }
            SkillMismatch::Language { language, required_skill } => {
                write!(f, "language '{}' requires skill '{}'", language, required_skill)
            }
            SkillMismatch::Position { ticket_type, required_keywords } => write!(
                f,
                "ticket type '{}' requires position matching {:?}",
                ticket_type, required_keywords
            ),
        }
    }
}

/// Case-folded key used for every comparison
fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Stateless skill matcher built from configuration
#[derive(Debug, Clone, Default)]
pub struct SkillMatcher {
    synonyms: BTreeMap<String, BTreeSet<String>>,
    segment_skills: BTreeMap<String, String>,
    language_skills: BTreeMap<String, String>,
    position_rules: BTreeMap<String, Vec<String>>,
}

impl SkillMatcher {
    pub fn new(config: &SkillsConfig) -> Self {
        let synonyms = config
            .synonyms
            .iter()
            .map(|(ty, tags)| (fold(ty), tags.iter().map(|t| fold(t)).collect()))
            .collect();
        let fold_map = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(k, v)| (fold(k), v.trim().to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        let position_rules = config
            .position_rules
            .iter()
            .map(|(ty, kws)| (fold(ty), kws.iter().map(|k| fold(k)).collect()))
            .collect();

        Self {
            synonyms,
            segment_skills: fold_map(&config.segment_skills),
            language_skills: fold_map(&config.language_skills),
            position_rules,
        }
    }

    fn has_skill(manager: &Manager, tag: &str) -> bool {
        let tag = fold(tag);
        manager.skills.iter().any(|s| fold(s) == tag)
    }

    /// True iff the manager carries a tag equal to the ticket type or one
    /// of its configured synonyms
    pub fn is_eligible(&self, manager: &Manager, analysis: &AiAnalysis) -> bool {
        let ticket_type = fold(&analysis.ticket_type);
        if ticket_type.is_empty() {
            return false;
        }
        let synonyms = self.synonyms.get(&ticket_type);
        manager.skills.iter().map(|s| fold(s)).any(|skill| {
            skill == ticket_type || synonyms.is_some_and(|set| set.contains(&skill))
        })
    }

    /// Full eligibility check including the segment, language and position
    /// rules. Returns the first rule the manager fails.
    pub fn evaluate(
        &self,
        manager: &Manager,
        ticket: &Ticket,
        analysis: &AiAnalysis,
    ) -> Result<(), SkillMismatch> {
        if !self.is_eligible(manager, analysis) {
            return Err(SkillMismatch::TicketType {
                ticket_type: analysis.ticket_type.clone(),
            });
        }

        if let Some(required) = self.segment_skills.get(&fold(&ticket.segment)) {
            if !Self::has_skill(manager, required) {
                return Err(SkillMismatch::Segment {
                    segment: ticket.segment.clone(),
                    required_skill: required.clone(),
                });
            }
        }

        if let Some(required) = self.language_skills.get(&fold(&analysis.language)) {
            if !Self::has_skill(manager, required) {
                return Err(SkillMismatch::Language {
                    language: analysis.language.clone(),
                    required_skill: required.clone(),
                });
            }
        }

        if let Some(keywords) = self.position_rules.get(&fold(&analysis.ticket_type)) {
            let position = fold(&manager.position);
            if !keywords.iter().all(|kw| position.contains(kw.as_str())) {
                return Err(SkillMismatch::Position {
                    ticket_type: analysis.ticket_type.clone(),
                    required_keywords: keywords.clone(),
                });
            }
        }

        Ok(())
    }
}
