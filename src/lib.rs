//! Weighted multi-agent consensus over short-horizon option trade signals.
//!
//! Independent agents analyse a shared [`MarketContext`](strategy::MarketContext)
//! snapshot, the [`ConsensusEngine`](ai::ConsensusEngine) tallies their weighted
//! votes, adjusts for the prevailing trend and emits a single [`Decision`](ai::Decision).

pub mod ai;
pub mod core;
pub mod strategy;
pub mod streaming;
pub mod trading;

pub use ai::{ConsensusConfig, ConsensusEngine, Decision};
pub use strategy::{Agent, MarketContext, Signal, Verdict};
