use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ai::decision::Decision;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    DecisionMade {
        decision: Decision,
        /// Market time of the snapshot the decision was computed from.
        as_of: DateTime<Utc>,
    },
    SnapshotFailed {
        reason: String,
    },
    SchedulerStopped,
}

/// Fan-out of engine events to execution, audit and logging sinks.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: EngineEvent) {
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!("📡 Event published to {} receivers", receivers);
            }
            Err(_) => {
                tracing::debug!("📡 Event dropped, no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(EngineEvent::SnapshotFailed {
            reason: "feed down".to_string(),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::SnapshotFailed { reason } => assert_eq!(reason, "feed down"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        EventBus::new(1).publish(EngineEvent::SchedulerStopped);
    }
}
