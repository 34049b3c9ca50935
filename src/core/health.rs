use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ai::decision::Decision;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub evaluations: u64,
    pub faults: u64,
    pub consecutive_faults: u64,
    pub last_fault: Option<String>,
}

impl AgentHealth {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_faults == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub decisions: u64,
    pub agents: BTreeMap<String, AgentHealth>,
}

#[derive(Debug, Default)]
struct HealthState {
    decisions: u64,
    agents: BTreeMap<String, AgentHealth>,
}

/// Tracks which agents keep faulting across evaluations. Lives outside the
/// consensus engine so the engine itself stays stateless.
#[derive(Clone)]
pub struct AgentHealthMonitor {
    start_time: std::time::Instant,
    state: Arc<RwLock<HealthState>>,
}

impl AgentHealthMonitor {
    pub fn new<'a>(agent_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let agents = agent_ids
            .into_iter()
            .map(|id| (id.to_string(), AgentHealth::default()))
            .collect();

        Self {
            start_time: std::time::Instant::now(),
            state: Arc::new(RwLock::new(HealthState {
                decisions: 0,
                agents,
            })),
        }
    }

    pub async fn record(&self, decision: &Decision) {
        let mut state = self.state.write().await;
        state.decisions += 1;

        for signal in &decision.signals {
            let health = state.agents.entry(signal.source.clone()).or_default();
            health.evaluations += 1;
            health.consecutive_faults = 0;
        }

        for fault in &decision.excluded {
            let health = state.agents.entry(fault.agent.clone()).or_default();
            health.evaluations += 1;
            health.faults += 1;
            health.consecutive_faults += 1;
            health.last_fault = Some(fault.reason.clone());

            if health.consecutive_faults >= 3 {
                tracing::warn!(
                    "🩺 Agent {} has faulted {} evaluations in a row: {}",
                    fault.agent,
                    health.consecutive_faults,
                    fault.reason
                );
            }
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let state = self.state.read().await;
        let degraded = state.agents.values().any(|h| !h.is_healthy());

        HealthStatus {
            status: if degraded {
                "degraded".to_string()
            } else {
                "healthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            decisions: state.decisions,
            agents: state.agents.clone(),
        }
    }
}
