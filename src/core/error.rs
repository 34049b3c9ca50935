use thiserror::Error;

/// Startup-time configuration failures. Never raised during an evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("agent registry is empty")]
    EmptyRegistry,

    #[error("agent `{0}` is registered more than once")]
    DuplicateAgent(String),

    #[error("weight for agent `{agent}` must be a positive integer, got `{value}`")]
    InvalidWeight { agent: String, value: String },

    #[error("weight table lists agent `{0}` more than once")]
    DuplicateWeight(String),

    #[error("combined agent weight overflows at agent `{0}`")]
    WeightOverflow(String),

    #[error("malformed weight entry `{0}` (expected `agent=weight`)")]
    MalformedWeightEntry(String),

    #[error("malformed setting {key}=`{value}`")]
    MalformedSetting { key: &'static str, value: String },

    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Rejections raised while building a market context snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("primary bar sequence is empty")]
    EmptyBars,

    #[error("bars are not in chronological order at index {0}")]
    UnorderedBars(usize),

    #[error("timeframe `{0}` has no bars")]
    EmptyTimeframe(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
