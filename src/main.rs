use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use signal_consensus_engine::core::{logging, AgentHealthMonitor, Config};
use signal_consensus_engine::strategy::agents::default_agents;
use signal_consensus_engine::strategy::TrendAssessor;
use signal_consensus_engine::streaming::JsonFileFeed;
use signal_consensus_engine::trading::{EngineEvent, EvaluationScheduler, EventBus};
use signal_consensus_engine::ConsensusEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    logging::init_logging(&config.monitoring.log_level);

    tracing::info!("🚀 Signal consensus engine starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Snapshot source: {}", config.scheduler.bars_file);

    let engine = Arc::new(ConsensusEngine::new(
        default_agents(config.session),
        config.weights.clone(),
        TrendAssessor::new(config.trend.clone()),
        config.consensus.clone(),
    )?);

    let health = AgentHealthMonitor::new(engine.agent_ids());
    let bus = Arc::new(EventBus::new(64));
    let provider = Arc::new(JsonFileFeed::new(config.scheduler.bars_file.clone()));

    // Decision sink
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::DecisionMade { decision, as_of }) => {
                    match serde_json::to_string(&decision) {
                        Ok(json) => tracing::debug!("Decision as of {}: {}", as_of, json),
                        Err(e) => tracing::warn!("⚠️  Could not serialize decision: {}", e),
                    }
                    for line in &decision.rationale {
                        tracing::info!("   • {}", line);
                    }
                }
                Ok(EngineEvent::SnapshotFailed { reason }) => {
                    tracing::warn!("⚠️  Skipped evaluation: {}", reason);
                }
                Ok(EngineEvent::SchedulerStopped) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("⚠️  Decision sink lagged, {} events dropped", missed);
                }
            }
        }
    });

    let mut scheduler = EvaluationScheduler::new(
        engine,
        provider,
        bus,
        health.clone(),
        config.scheduler.interval,
    );
    scheduler.start();

    // Periodic health report until ctrl-c
    let mut report = tokio::time::interval(config.monitoring.health_report_interval);
    report.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown requested");
                break;
            }
            _ = report.tick() => {
                let status = health.get_status().await;
                tracing::info!(
                    "Engine status: {} (uptime: {}s, decisions: {})",
                    status.status,
                    status.uptime_seconds,
                    status.decisions
                );
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}
