use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::event_bus::{EngineEvent, EventBus};
use crate::ai::consensus::ConsensusEngine;
use crate::ai::decision::Decision;
use crate::core::health::AgentHealthMonitor;
use crate::streaming::data_feed::MarketDataProvider;

/// Everything one evaluation tick needs, shared with the background loop.
#[derive(Clone)]
struct Pipeline {
    engine: Arc<ConsensusEngine>,
    provider: Arc<dyn MarketDataProvider>,
    bus: Arc<EventBus>,
    health: AgentHealthMonitor,
}

impl Pipeline {
    async fn tick(&self) -> Result<Decision> {
        let context = match self.provider.snapshot().await {
            Ok(context) => Arc::new(context),
            Err(e) => {
                tracing::error!("❌ Failed to load market snapshot: {:#}", e);
                self.bus.publish(EngineEvent::SnapshotFailed {
                    reason: format!("{:#}", e),
                });
                return Err(e);
            }
        };

        let as_of = context.now();
        let decision = self.engine.evaluate(context).await;
        self.health.record(&decision).await;

        tracing::info!("📋 {}", decision.recommendation);
        self.bus.publish(EngineEvent::DecisionMade {
            decision: decision.clone(),
            as_of,
        });

        Ok(decision)
    }
}

/// Periodically pulls a snapshot, evaluates it and publishes the decision.
///
/// Lifecycle is explicit: `start`, `stop`, `is_running`. No global state, so
/// several schedulers can run side by side.
pub struct EvaluationScheduler {
    pipeline: Pipeline,
    interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl EvaluationScheduler {
    pub fn new(
        engine: Arc<ConsensusEngine>,
        provider: Arc<dyn MarketDataProvider>,
        bus: Arc<EventBus>,
        health: AgentHealthMonitor,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                engine,
                provider,
                bus,
                health,
            },
            interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            handle: None,
        }
    }

    /// Spawns the evaluation loop. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Scheduler already running");
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pipeline = self.pipeline.clone();
        let running = self.running.clone();
        let period = self.interval;

        tracing::info!("🚀 Evaluation scheduler starting (every {:?})", period);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        // Stopping mid-evaluation drops the in-flight agents' results.
                        tokio::select! {
                            _ = shutdown_rx.changed() => break,
                            _ = pipeline.tick() => {}
                        }
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
            pipeline.bus.publish(EngineEvent::SchedulerStopped);
            tracing::info!("✅ Evaluation scheduler stopped");
        });

        self.shutdown = Some(shutdown_tx);
        self.handle = Some(handle);
        true
    }

    /// Signals the loop and waits for it to exit. Safe to call when stopped.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!("⚠️  Scheduler task ended abnormally: {}", e);
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One evaluation outside the loop.
    pub async fn run_once(&self) -> Result<Decision> {
        self.pipeline.tick().await
    }

    pub fn health(&self) -> &AgentHealthMonitor {
        &self.pipeline.health
    }
}
