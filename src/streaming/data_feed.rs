use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::core::error::ContextError;
use crate::strategy::context::{Bar, MarketContext, Timeframe};

/// Supplies already-materialized market snapshots to the scheduler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self) -> Result<MarketContext>;
}

/// On-disk / wire shape of one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub bars: Vec<Bar>,
    #[serde(default)]
    pub volatility_index: Option<f64>,
    #[serde(default)]
    pub timeframes: Vec<Timeframe>,
    /// Defaults to the last bar's timestamp.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

impl SnapshotDocument {
    pub fn into_context(self) -> Result<MarketContext, ContextError> {
        let mut context = MarketContext::new(self.bars)?;

        if let Some(index) = self.volatility_index {
            context = context.with_volatility_index(index);
        }
        for tf in self.timeframes {
            context = context.with_timeframe(tf.label, tf.bars)?;
        }
        if let Some(now) = self.now {
            context = context.at(now);
        }

        Ok(context)
    }
}

/// Re-reads a JSON snapshot file on every request.
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MarketDataProvider for JsonFileFeed {
    async fn snapshot(&self) -> Result<MarketContext> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading snapshot {}", self.path.display()))?;

        let document: SnapshotDocument = serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot {}", self.path.display()))?;

        debug!(
            "📥 Loaded {} bars ({} higher timeframes) from {}",
            document.bars.len(),
            document.timeframes.len(),
            self.path.display()
        );

        Ok(document.into_context()?)
    }
}

/// Serves the same snapshot forever.
pub struct StaticFeed {
    context: MarketContext,
}

impl StaticFeed {
    pub fn new(context: MarketContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl MarketDataProvider for StaticFeed {
    async fn snapshot(&self) -> Result<MarketContext> {
        Ok(self.context.clone())
    }
}
