pub mod agents;
pub mod context;
pub mod indicators;
pub mod signals;
pub mod trend;

pub use agents::Agent;
pub use context::{AgentInputs, AgentView, Bar, MarketContext, Timeframe};
pub use signals::{Signal, Verdict};
pub use trend::{TrendAssessment, TrendAssessor, TrendConfig, TrendDirection};
