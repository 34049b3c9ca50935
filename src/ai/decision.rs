use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::strategy::signals::{Signal, Verdict};
use crate::strategy::trend::TrendAssessment;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

/// Confidence cut points for [`RiskLevel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskBands {
    /// Strictly above: LOW.
    pub low_above: f64,
    /// Strictly above: MEDIUM. Everything else is HIGH.
    pub medium_above: f64,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            low_above: 80.0,
            medium_above: 60.0,
        }
    }
}

impl RiskBands {
    pub fn classify(&self, confidence: f64) -> RiskLevel {
        if confidence > self.low_above {
            RiskLevel::Low
        } else if confidence > self.medium_above {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// An agent excluded from the tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFault {
    pub agent: String,
    pub reason: String,
}

pub type VoteTally = BTreeMap<Verdict, u32>;

/// The engine's output for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    /// Floating point in `[0, 100]`; round only for display.
    pub confidence: f64,
    /// Only verdicts that received weight appear here.
    pub vote_tally: VoteTally,
    pub total_weight: u32,
    pub rationale: Vec<String>,
    pub signals: Vec<Signal>,
    pub excluded: Vec<AgentFault>,
    pub trend: Option<TrendAssessment>,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

impl Decision {
    /// Terminal decision when no agent produced a signal.
    pub fn no_signals(excluded: Vec<AgentFault>, bands: &RiskBands) -> Self {
        let tally = VoteTally::new();
        Self {
            verdict: Verdict::NoTrade,
            confidence: 0.0,
            recommendation: recommendation_text(Verdict::NoTrade, 0.0, &tally),
            vote_tally: tally,
            total_weight: 0,
            rationale: vec!["no agent signals available".to_string()],
            signals: Vec::new(),
            excluded,
            trend: None,
            risk_level: bands.classify(0.0),
        }
    }

    pub fn votes_for(&self, verdict: Verdict) -> u32 {
        self.vote_tally.get(&verdict).copied().unwrap_or(0)
    }

    pub fn is_actionable(&self) -> bool {
        self.verdict.is_directional()
    }
}

/// Presentational summary; nothing downstream parses it.
pub fn recommendation_text(verdict: Verdict, confidence: f64, tally: &VoteTally) -> String {
    let votes = Verdict::ALL
        .iter()
        .map(|v| format!("{}={}", v, tally.get(v).copied().unwrap_or(0)))
        .collect::<Vec<_>>()
        .join(", ");
    let confidence = confidence.round();

    match verdict {
        Verdict::BuyCall => format!(
            "BUY CALL options with {:.0}% confidence (votes: {})",
            confidence, votes
        ),
        Verdict::BuyPut => format!(
            "BUY PUT options with {:.0}% confidence (votes: {})",
            confidence, votes
        ),
        Verdict::NoTrade => format!(
            "Stay flat, no trade ({:.0}% confidence; votes: {})",
            confidence, votes
        ),
    }
}
