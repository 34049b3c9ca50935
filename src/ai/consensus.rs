//! Weighted-vote consensus over independent agent signals.
//!
//! One evaluation is a single pass: run every agent, tally weighted votes,
//! resolve a verdict by fixed priority, adjust confidence for trend alignment,
//! classify risk. Agent faults are logged and excluded; the caller always gets
//! a [`Decision`].

use futures::future::join_all;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::decision::{recommendation_text, AgentFault, Decision, RiskBands, VoteTally};
use super::weights::WeightTable;
use crate::core::error::{ConfigError, ConfigResult};
use crate::strategy::agents::Agent;
use crate::strategy::context::MarketContext;
use crate::strategy::signals::{clamp_confidence, Signal, Verdict};
use crate::strategy::trend::{TrendAssessment, TrendAssessor};

/// Tunable constants of the vote resolution and trend adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    /// Fraction of total weight for a strong-tier verdict.
    pub strong_threshold: f64,
    /// Fraction of total weight for a moderate-tier verdict.
    pub moderate_threshold: f64,
    pub moderate_discount: f64,
    /// Confidence of the inconclusive NO_TRADE fallback.
    pub fallback_confidence: f64,

    pub strong_trend_strength: f64,
    pub moderate_trend_strength: f64,
    pub strong_aligned_boost: f64,
    pub strong_aligned_cap: f64,
    pub strong_opposed_penalty: f64,
    /// Below this (after the strong counter-trend penalty) the verdict flips to NO_TRADE.
    pub counter_trend_floor: f64,
    pub counter_trend_confidence: f64,
    pub moderate_aligned_boost: f64,
    pub moderate_aligned_cap: f64,
    pub moderate_opposed_penalty: f64,

    pub risk: RiskBands,
    /// Per-agent deadline; an agent that misses it counts as a fault.
    pub agent_timeout: Option<Duration>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            strong_threshold: 0.5,
            moderate_threshold: 0.4,
            moderate_discount: 0.85,
            fallback_confidence: 75.0,
            strong_trend_strength: 70.0,
            moderate_trend_strength: 55.0,
            strong_aligned_boost: 1.15,
            strong_aligned_cap: 95.0,
            strong_opposed_penalty: 0.65,
            counter_trend_floor: 55.0,
            counter_trend_confidence: 75.0,
            moderate_aligned_boost: 1.05,
            moderate_aligned_cap: 90.0,
            moderate_opposed_penalty: 0.85,
            risk: RiskBands::default(),
            agent_timeout: None,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        fn fraction(name: &'static str, value: f64) -> ConfigResult<()> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter { name, value })
            }
        }
        fn positive(name: &'static str, value: f64) -> ConfigResult<()> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter { name, value })
            }
        }
        fn percent(name: &'static str, value: f64) -> ConfigResult<()> {
            if (0.0..=100.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter { name, value })
            }
        }

        fraction("strong_threshold", self.strong_threshold)?;
        fraction("moderate_threshold", self.moderate_threshold)?;
        if self.moderate_threshold > self.strong_threshold {
            return Err(ConfigError::InvalidParameter {
                name: "moderate_threshold",
                value: self.moderate_threshold,
            });
        }
        positive("moderate_discount", self.moderate_discount)?;
        positive("strong_aligned_boost", self.strong_aligned_boost)?;
        positive("strong_opposed_penalty", self.strong_opposed_penalty)?;
        positive("moderate_aligned_boost", self.moderate_aligned_boost)?;
        positive("moderate_opposed_penalty", self.moderate_opposed_penalty)?;

        percent("fallback_confidence", self.fallback_confidence)?;
        percent("strong_trend_strength", self.strong_trend_strength)?;
        percent("moderate_trend_strength", self.moderate_trend_strength)?;
        if self.moderate_trend_strength > self.strong_trend_strength {
            return Err(ConfigError::InvalidParameter {
                name: "moderate_trend_strength",
                value: self.moderate_trend_strength,
            });
        }
        percent("strong_aligned_cap", self.strong_aligned_cap)?;
        percent("moderate_aligned_cap", self.moderate_aligned_cap)?;
        percent("counter_trend_floor", self.counter_trend_floor)?;
        percent("counter_trend_confidence", self.counter_trend_confidence)?;
        percent("risk.low_above", self.risk.low_above)?;
        percent("risk.medium_above", self.risk.medium_above)?;
        if self.risk.medium_above > self.risk.low_above {
            return Err(ConfigError::InvalidParameter {
                name: "risk.medium_above",
                value: self.risk.medium_above,
            });
        }

        Ok(())
    }
}

/// Which rule of the priority ladder produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusTier {
    StrongNoTrade,
    StrongCall,
    StrongPut,
    ModerateCall,
    ModeratePut,
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tier: ConsensusTier,
    pub verdict: Verdict,
    pub confidence: f64,
    pub note: String,
}

/// Steps through the tiers in fixed order; the first match wins.
///
/// At exact ties NO_TRADE beats either direction and BUY_CALL beats BUY_PUT.
pub fn resolve_verdict(tally: &VoteTally, total_weight: u32, avg_confidence: f64, config: &ConsensusConfig) -> Resolution {
    let votes = |v: Verdict| tally.get(&v).copied().unwrap_or(0) as f64;
    let total = total_weight as f64;
    let strong = total * config.strong_threshold;
    let moderate = total * config.moderate_threshold;

    let calls = votes(Verdict::BuyCall);
    let puts = votes(Verdict::BuyPut);
    let no_trade = votes(Verdict::NoTrade);

    let resolution = |tier, verdict, confidence, note: String| Resolution {
        tier,
        verdict,
        confidence,
        note,
    };

    if no_trade >= strong {
        resolution(
            ConsensusTier::StrongNoTrade,
            Verdict::NoTrade,
            avg_confidence,
            format!("strong consensus to avoid trading ({}/{} weight)", no_trade, total),
        )
    } else if calls >= strong {
        resolution(
            ConsensusTier::StrongCall,
            Verdict::BuyCall,
            avg_confidence,
            format!("strong consensus for BUY_CALL ({}/{} weight)", calls, total),
        )
    } else if puts >= strong {
        resolution(
            ConsensusTier::StrongPut,
            Verdict::BuyPut,
            avg_confidence,
            format!("strong consensus for BUY_PUT ({}/{} weight)", puts, total),
        )
    } else if calls >= moderate && puts < moderate {
        resolution(
            ConsensusTier::ModerateCall,
            Verdict::BuyCall,
            avg_confidence * config.moderate_discount,
            format!("moderate consensus for BUY_CALL ({}/{} weight)", calls, total),
        )
    } else if puts >= moderate && calls < moderate {
        resolution(
            ConsensusTier::ModeratePut,
            Verdict::BuyPut,
            avg_confidence * config.moderate_discount,
            format!("moderate consensus for BUY_PUT ({}/{} weight)", puts, total),
        )
    } else {
        resolution(
            ConsensusTier::Inconclusive,
            Verdict::NoTrade,
            config.fallback_confidence,
            "insufficient or conflicting consensus".to_string(),
        )
    }
}

/// Scales a directional verdict's confidence by trend alignment.
/// Returns the possibly overridden verdict, the new confidence and a narrative line.
pub fn adjust_for_trend(
    verdict: Verdict,
    confidence: f64,
    trend: &TrendAssessment,
    config: &ConsensusConfig,
) -> (Verdict, f64, Option<String>) {
    if !verdict.is_directional() {
        return (verdict, confidence, None);
    }

    let bullish_signal = verdict == Verdict::BuyCall;
    let aligned = if bullish_signal {
        trend.direction.is_bullish()
    } else {
        trend.direction.is_bearish()
    };
    let opposed = if bullish_signal {
        trend.direction.is_bearish()
    } else {
        trend.direction.is_bullish()
    };

    if trend.strength >= config.strong_trend_strength {
        if aligned {
            let boosted = (confidence * config.strong_aligned_boost).min(config.strong_aligned_cap);
            return (
                verdict,
                boosted,
                Some(format!(
                    "aligned with strong {} trend, confidence {:.1} -> {:.1}",
                    trend.direction, confidence, boosted
                )),
            );
        }
        if opposed {
            let reduced = (confidence * config.strong_opposed_penalty).round();
            if reduced < config.counter_trend_floor {
                return (
                    Verdict::NoTrade,
                    config.counter_trend_confidence,
                    Some(format!(
                        "counter-trend confidence insufficient ({:.0} < {:.0}) against strong {} trend",
                        reduced, config.counter_trend_floor, trend.direction
                    )),
                );
            }
            return (
                verdict,
                reduced,
                Some(format!(
                    "counter-trend, reduced confidence allowed for mean reversion ({:.1} -> {:.0})",
                    confidence, reduced
                )),
            );
        }
    } else if trend.strength >= config.moderate_trend_strength {
        if aligned {
            let boosted = (confidence * config.moderate_aligned_boost).min(config.moderate_aligned_cap);
            return (
                verdict,
                boosted,
                Some(format!(
                    "aligned with moderate {} trend, confidence {:.1} -> {:.1}",
                    trend.direction, confidence, boosted
                )),
            );
        }
        if opposed {
            let reduced = (confidence * config.moderate_opposed_penalty).round();
            return (
                verdict,
                reduced,
                Some(format!(
                    "against moderate {} trend, confidence {:.1} -> {:.0}",
                    trend.direction, confidence, reduced
                )),
            );
        }
    }

    (verdict, confidence, None)
}

/// Stateless apart from its immutable registry, weights and constants.
pub struct ConsensusEngine {
    agents: Vec<Arc<dyn Agent>>,
    weights: WeightTable,
    assessor: TrendAssessor,
    config: ConsensusConfig,
}

impl ConsensusEngine {
    /// Fails fast on an empty registry, duplicate agent ids or invalid constants.
    pub fn new(
        agents: Vec<Arc<dyn Agent>>,
        weights: WeightTable,
        assessor: TrendAssessor,
        config: ConsensusConfig,
    ) -> ConfigResult<Self> {
        config.validate()?;
        assessor.config().validate()?;

        if agents.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut seen = HashSet::new();
        let mut registered_weight = 0u32;
        for agent in &agents {
            if !seen.insert(agent.id().to_string()) {
                return Err(ConfigError::DuplicateAgent(agent.id().to_string()));
            }
            registered_weight = registered_weight
                .checked_add(weights.weight_of(agent.id()))
                .ok_or_else(|| ConfigError::WeightOverflow(agent.id().to_string()))?;
            if !weights.contains(agent.id()) {
                warn!(
                    "⚠️  Agent {} has no weight entry, voting with default weight {}",
                    agent.id(),
                    weights.weight_of(agent.id())
                );
            }
        }

        info!(
            "🧠 Consensus engine ready: {} agents, registered weight {}",
            agents.len(),
            registered_weight
        );

        Ok(Self {
            agents,
            weights,
            assessor,
            config,
        })
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.id()).collect()
    }

    /// Runs every agent on its own blocking task and waits for all of them.
    ///
    /// Dropping the returned future abandons in-flight agents; their results are discarded.
    pub async fn evaluate(&self, context: Arc<MarketContext>) -> Decision {
        let timeout = self.config.agent_timeout;

        let tasks = self.agents.iter().map(|agent| {
            let agent = Arc::clone(agent);
            let context = Arc::clone(&context);
            let id = agent.id().to_string();

            async move {
                let handle = tokio::task::spawn_blocking(move || {
                    let view = context.project(agent.inputs());
                    agent.analyze(&view)
                });

                let joined = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, handle).await {
                        Ok(joined) => joined,
                        Err(_) => return (id, Err(format!("timed out after {:?}", limit))),
                    },
                    None => handle.await,
                };

                let outcome = match joined {
                    Ok(Ok(signal)) => Ok(signal),
                    Ok(Err(e)) => Err(format!("{:#}", e)),
                    Err(e) if e.is_panic() => Err(format!("panicked: {}", panic_message(e.into_panic().as_ref()))),
                    Err(e) => Err(format!("task failed: {}", e)),
                };
                (id, outcome)
            }
        });

        let outcomes = join_all(tasks).await;
        let trend = self.assessor.assess(context.bars());
        self.collect(outcomes, trend)
    }

    /// Sequential equivalent of [`evaluate`](Self::evaluate) for callers without a runtime.
    pub fn evaluate_blocking(&self, context: &MarketContext) -> Decision {
        let outcomes = self
            .agents
            .iter()
            .map(|agent| {
                let id = agent.id().to_string();
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let view = context.project(agent.inputs());
                    agent.analyze(&view)
                }));
                let outcome = match result {
                    Ok(Ok(signal)) => Ok(signal),
                    Ok(Err(e)) => Err(format!("{:#}", e)),
                    Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
                };
                (id, outcome)
            })
            .collect();

        let trend = self.assessor.assess(context.bars());
        self.collect(outcomes, trend)
    }

    /// Steps 2-6 over signals and a trend that are already known. Deterministic.
    pub fn aggregate(&self, signals: Vec<Signal>, trend: TrendAssessment) -> Decision {
        self.decide(signals, Vec::new(), trend)
    }

    fn collect(&self, outcomes: Vec<(String, Result<Signal, String>)>, trend: TrendAssessment) -> Decision {
        let mut signals = Vec::with_capacity(outcomes.len());
        let mut excluded = Vec::new();

        for (agent, outcome) in outcomes {
            match outcome {
                Ok(mut signal) => {
                    if signal.source != agent {
                        debug!("Agent {} labelled its signal {}, relabelling", agent, signal.source);
                        signal.source = agent;
                    }
                    signals.push(signal);
                }
                Err(reason) => {
                    error!("❌ Agent {} excluded from consensus: {}", agent, reason);
                    excluded.push(AgentFault { agent, reason });
                }
            }
        }

        if !excluded.is_empty() {
            warn!(
                "⚠️  {} of {} agents excluded, tallying the remaining {}",
                excluded.len(),
                self.agents.len(),
                signals.len()
            );
        }

        self.decide(signals, excluded, trend)
    }

    fn decide(&self, signals: Vec<Signal>, excluded: Vec<AgentFault>, trend: TrendAssessment) -> Decision {
        if signals.is_empty() {
            warn!("⚠️  No agent signals available, standing aside");
            return Decision::no_signals(excluded, &self.config.risk);
        }

        let mut tally = VoteTally::new();
        let mut total_weight = 0u32;
        let mut weight_sum = 0.0;
        let mut weighted_confidence = 0.0;

        for signal in &signals {
            // Registered weights are checked at construction; saturate for ad-hoc signal sets.
            let weight = self.weights.weight_of(&signal.source);
            let entry = tally.entry(signal.verdict).or_insert(0);
            *entry = entry.saturating_add(weight);
            total_weight = total_weight.saturating_add(weight);
            weight_sum += weight as f64;
            weighted_confidence += signal.confidence * weight as f64;
        }

        let avg_confidence = if weight_sum > 0.0 {
            weighted_confidence / weight_sum
        } else {
            0.0
        };

        let mut rationale = vec![trend.summary()];
        rationale.push(format!(
            "Votes (total weight {}): {}; weighted confidence {:.1}",
            total_weight,
            Verdict::ALL
                .iter()
                .map(|v| format!("{}={}", v, tally.get(v).copied().unwrap_or(0)))
                .collect::<Vec<_>>()
                .join(", "),
            avg_confidence
        ));

        let resolution = resolve_verdict(&tally, total_weight, avg_confidence, &self.config);
        debug!("Consensus tier {:?}: {}", resolution.tier, resolution.note);
        rationale.push(resolution.note);

        let (verdict, confidence, alignment) =
            adjust_for_trend(resolution.verdict, resolution.confidence, &trend, &self.config);
        if let Some(note) = alignment {
            debug!("Trend adjustment: {}", note);
            rationale.push(note);
        }

        let confidence = clamp_confidence(confidence);
        let risk_level = self.config.risk.classify(confidence);
        let recommendation = recommendation_text(verdict, confidence, &tally);

        info!(
            "🎯 Decision: {} @ {:.0}% (risk {}, {} signals, {} excluded)",
            verdict,
            confidence,
            risk_level,
            signals.len(),
            excluded.len()
        );

        Decision {
            verdict,
            confidence,
            vote_tally: tally,
            total_weight,
            rationale,
            signals,
            excluded,
            trend: Some(trend),
            risk_level,
            recommendation,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
