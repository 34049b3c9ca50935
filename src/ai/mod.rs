pub mod consensus;
pub mod decision;
pub mod weights;

pub use consensus::{ConsensusConfig, ConsensusEngine, ConsensusTier};
pub use decision::{AgentFault, Decision, RiskBands, RiskLevel, VoteTally};
pub use weights::WeightTable;
