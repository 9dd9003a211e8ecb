//! Escalation policy
//!
//! A pure decision function. Once the nearest offices are exhausted the
//! engine asks the policy whether to widen the search to every office or to
//! escalate the ticket without a manager.

use serde::{Deserialize, Serialize};

use crate::config::EscalationConfig;

/// Direction of the priority scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// 1 is the most urgent
    LowerIsUrgent,
    /// The largest value is the most urgent
    HigherIsUrgent,
}

/// How far the office search reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Only the configured number of nearest offices
    TopK,
    /// Every office in the reference data
    AllOffices,
}

/// Why a ticket was escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCause {
    /// Urgent tickets are not sent to distant offices
    UrgentPriority,
    /// No manager in any office can handle the ticket
    NoSkilledManagerAnywhere,
    /// The widened search found nobody either
    CandidatesExhausted,
}

impl std::fmt::Display for EscalationCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EscalationCause::UrgentPriority => "urgent priority",
            EscalationCause::NoSkilledManagerAnywhere => "no skilled manager in any office",
            EscalationCause::CandidatesExhausted => "all offices exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    Widen,
    Escalate(EscalationCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    threshold: u8,
    order: PriorityOrder,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::new(&EscalationConfig::default())
    }
}

impl EscalationPolicy {
    pub fn new(config: &EscalationConfig) -> Self {
        Self {
            threshold: config.priority_threshold,
            order: config.priority_order,
        }
    }

    /// True when `priority` is at least as urgent as the threshold
    pub fn is_urgent(&self, priority: u8) -> bool {
        match self.order {
            PriorityOrder::LowerIsUrgent => priority <= self.threshold,
            PriorityOrder::HigherIsUrgent => priority >= self.threshold,
        }
    }

    /// Decide what to do after `exhausted` produced no eligible manager
    pub fn decide(
        &self,
        exhausted: SearchScope,
        priority: u8,
        skilled_anywhere: bool,
    ) -> EscalationDecision {
        if exhausted == SearchScope::AllOffices {
            return EscalationDecision::Escalate(EscalationCause::CandidatesExhausted);
        }
        if !skilled_anywhere {
            return EscalationDecision::Escalate(EscalationCause::NoSkilledManagerAnywhere);
        }
        if self.is_urgent(priority) {
            return EscalationDecision::Escalate(EscalationCause::UrgentPriority);
        }
        EscalationDecision::Widen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_is_urgent() {
        let policy = EscalationPolicy::default();
        assert!(policy.is_urgent(1));
        assert!(!policy.is_urgent(2));
        assert_eq!(
            policy.decide(SearchScope::TopK, 1, true),
            EscalationDecision::Escalate(EscalationCause::UrgentPriority)
        );
        assert_eq!(policy.decide(SearchScope::TopK, 3, true), EscalationDecision::Widen);
    }

    #[test]
    fn test_higher_is_urgent() {
        let policy = EscalationPolicy::new(&EscalationConfig {
            priority_threshold: 8,
            priority_order: PriorityOrder::HigherIsUrgent,
        });
        assert!(policy.is_urgent(10));
        assert!(policy.is_urgent(8));
        assert!(!policy.is_urgent(7));
        assert_eq!(policy.decide(SearchScope::TopK, 5, true), EscalationDecision::Widen);
    }

    #[test]
    fn test_nobody_skilled_escalates_regardless_of_priority() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            policy.decide(SearchScope::TopK, 9, false),
            EscalationDecision::Escalate(EscalationCause::NoSkilledManagerAnywhere)
        );
    }

    #[test]
    fn test_widened_search_always_escalates() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            policy.decide(SearchScope::AllOffices, 9, true),
            EscalationDecision::Escalate(EscalationCause::CandidatesExhausted)
        );
    }
}
