use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ContextError;

/// One OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// A coarser-resolution bar series, e.g. "15m" or "1h".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub label: String,
    pub bars: Vec<Bar>,
}

/// Immutable market snapshot shared by every agent in one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    bars: Vec<Bar>,
    volatility_index: Option<f64>,
    higher_timeframes: Vec<Timeframe>,
    now: DateTime<Utc>,
}

impl MarketContext {
    /// Builds a context whose "now" is the timestamp of the last bar.
    pub fn new(bars: Vec<Bar>) -> Result<Self, ContextError> {
        ensure_chronological(&bars)?;
        let now = bars.last().map(|b| b.timestamp).ok_or(ContextError::EmptyBars)?;

        Ok(Self {
            bars,
            volatility_index: None,
            higher_timeframes: Vec::new(),
            now,
        })
    }

    pub fn with_volatility_index(mut self, value: f64) -> Self {
        self.volatility_index = Some(value);
        self
    }

    pub fn with_timeframe(mut self, label: impl Into<String>, bars: Vec<Bar>) -> Result<Self, ContextError> {
        let label = label.into();
        if bars.is_empty() {
            return Err(ContextError::EmptyTimeframe(label));
        }
        ensure_chronological(&bars)?;
        self.higher_timeframes.push(Timeframe { label, bars });
        Ok(self)
    }

    /// Overrides the evaluation time. Time-of-day heuristics read this, never the system clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn volatility_index(&self) -> Option<f64> {
        self.volatility_index
    }

    pub fn higher_timeframes(&self) -> &[Timeframe] {
        &self.higher_timeframes
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Narrows the snapshot to the inputs an agent declared.
    pub fn project(&self, inputs: AgentInputs) -> AgentView<'_> {
        AgentView {
            bars: &self.bars,
            volatility_index: if inputs.volatility_index {
                self.volatility_index
            } else {
                None
            },
            higher_timeframes: if inputs.higher_timeframes {
                self.higher_timeframes.as_slice()
            } else {
                &[]
            },
            now: inputs.clock.then_some(self.now),
        }
    }
}

fn ensure_chronological(bars: &[Bar]) -> Result<(), ContextError> {
    if bars.is_empty() {
        return Err(ContextError::EmptyBars);
    }
    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(ContextError::UnorderedBars(i + 1));
        }
    }
    Ok(())
}

/// Capability descriptor: the optional context fields an agent consumes.
/// The primary bar sequence is always provided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentInputs {
    pub volatility_index: bool,
    pub higher_timeframes: bool,
    pub clock: bool,
}

impl AgentInputs {
    pub const BARS_ONLY: AgentInputs = AgentInputs {
        volatility_index: false,
        higher_timeframes: false,
        clock: false,
    };

    pub const fn with_volatility_index(mut self) -> Self {
        self.volatility_index = true;
        self
    }

    pub const fn with_higher_timeframes(mut self) -> Self {
        self.higher_timeframes = true;
        self
    }

    pub const fn with_clock(mut self) -> Self {
        self.clock = true;
        self
    }
}

/// What an agent actually sees. Undeclared inputs read as absent.
#[derive(Debug, Clone, Copy)]
pub struct AgentView<'a> {
    pub bars: &'a [Bar],
    pub volatility_index: Option<f64>,
    pub higher_timeframes: &'a [Timeframe],
    pub now: Option<DateTime<Utc>>,
}

impl<'a> AgentView<'a> {
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume as f64).collect()
    }

    pub fn last(&self) -> Option<&'a Bar> {
        self.bars.last()
    }
}
