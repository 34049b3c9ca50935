//! Independent analysis units. Each one reads a projected view of the market
//! context and returns exactly one [`Signal`].
//!
//! Agents never fail on thin data: they answer `NO_TRADE` and say why. An `Err`
//! (or a panic) is an unexpected fault and is the consensus engine's concern.

pub mod multi_timeframe;
pub mod session;
pub mod technical;
pub mod volatility;
pub mod volume;

use std::sync::Arc;

use super::context::{AgentInputs, AgentView};
use super::signals::Signal;

pub use multi_timeframe::MultiTimeframeAgent;
pub use session::{SessionHours, SessionTimingAgent};
pub use technical::TechnicalAgent;
pub use volatility::VolatilityRegimeAgent;
pub use volume::VolumeProfileAgent;

pub trait Agent: Send + Sync {
    /// Unique within a registry; also the weight-table key.
    fn id(&self) -> &str;

    /// Optional context fields this agent consumes.
    fn inputs(&self) -> AgentInputs {
        AgentInputs::BARS_ONLY
    }

    fn analyze(&self, view: &AgentView<'_>) -> anyhow::Result<Signal>;
}

/// Weights for the built-in agents.
pub const DEFAULT_WEIGHTS: &[(&str, u32)] = &[
    (technical::ID, 2),
    (multi_timeframe::ID, 2),
    (volatility::ID, 2),
    (volume::ID, 1),
    (session::ID, 1),
];

/// The built-in registry, in the order signals appear in a decision.
pub fn default_agents(session: SessionHours) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(TechnicalAgent::default()),
        Arc::new(MultiTimeframeAgent::default()),
        Arc::new(VolatilityRegimeAgent::default()),
        Arc::new(VolumeProfileAgent::default()),
        Arc::new(SessionTimingAgent::new(session)),
    ]
}

/// Turns directional vote counts into a bounded confidence.
pub(crate) fn vote_confidence(base: f64, per_vote: f64, votes: u32) -> f64 {
    super::signals::clamp_confidence(base + per_vote * votes as f64)
}
