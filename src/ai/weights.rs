use std::collections::HashMap;
use std::str::FromStr;

use crate::core::error::{ConfigError, ConfigResult};

/// Agents missing from the table vote with this weight.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Agent id to vote weight. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightTable {
    weights: HashMap<String, u32>,
}

impl WeightTable {
    /// Rejects zero weights, blank ids and duplicate entries.
    pub fn new<I, S>(entries: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut weights = HashMap::new();
        for (agent, weight) in entries {
            let agent = agent.into();
            if agent.trim().is_empty() {
                return Err(ConfigError::MalformedWeightEntry(format!("={}", weight)));
            }
            if weight == 0 {
                return Err(ConfigError::InvalidWeight {
                    agent,
                    value: weight.to_string(),
                });
            }
            if weights.insert(agent.clone(), weight).is_some() {
                return Err(ConfigError::DuplicateWeight(agent));
            }
        }

        Ok(Self { weights })
    }

    pub fn weight_of(&self, agent: &str) -> u32 {
        self.weights.get(agent).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.weights.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Parses `technical=2, volume_profile=1`.
impl FromStr for WeightTable {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();

        for raw in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (agent, weight) = raw
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedWeightEntry(raw.to_string()))?;
            let agent = agent.trim();
            let weight = weight.trim();

            let parsed = weight.parse::<u32>().map_err(|_| ConfigError::InvalidWeight {
                agent: agent.to_string(),
                value: weight.to_string(),
            })?;
            entries.push((agent.to_string(), parsed));
        }

        Self::new(entries)
    }
}
