use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    BuyCall,
    BuyPut,
    NoTrade,
}

impl Verdict {
    pub const ALL: [Verdict; 3] = [Verdict::BuyCall, Verdict::BuyPut, Verdict::NoTrade];

    pub fn is_directional(self) -> bool {
        !matches!(self, Verdict::NoTrade)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::BuyCall => write!(f, "BUY_CALL"),
            Verdict::BuyPut => write!(f, "BUY_PUT"),
            Verdict::NoTrade => write!(f, "NO_TRADE"),
        }
    }
}

/// One agent's opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: String,
    pub verdict: Verdict,
    /// Always within `[0, 100]`.
    pub confidence: f64,
    pub rationale: Vec<String>,
    /// Agent-specific diagnostics. Forwarded, never interpreted.
    pub detail: serde_json::Value,
}

impl Signal {
    pub fn new(source: impl Into<String>, verdict: Verdict, confidence: f64) -> Self {
        Self {
            source: source.into(),
            verdict,
            confidence: clamp_confidence(confidence),
            rationale: Vec::new(),
            detail: serde_json::Value::Null,
        }
    }

    /// `NO_TRADE` for an agent that cannot speak on this data.
    pub fn insufficient(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(source, Verdict::NoTrade, 0.0).with_reason(reason)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.rationale.push(reason.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// NaN collapses to 0 so a broken heuristic can never push a vote out of range.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
