use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use signal_consensus_engine::ai::{ConsensusConfig, ConsensusEngine, RiskLevel, WeightTable};
use signal_consensus_engine::strategy::{
    Agent, AgentView, Bar, MarketContext, Signal, TrendAssessment, TrendAssessor, TrendDirection, Verdict,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Voter {
    id: String,
    verdict: Verdict,
    confidence: f64,
}

impl Agent for Voter {
    fn id(&self) -> &str {
        &self.id
    }

    fn analyze(&self, _view: &AgentView<'_>) -> anyhow::Result<Signal> {
        Ok(Signal::new(self.id.clone(), self.verdict, self.confidence))
    }
}

struct Broken {
    id: String,
}

impl Agent for Broken {
    fn id(&self) -> &str {
        &self.id
    }

    fn analyze(&self, _view: &AgentView<'_>) -> anyhow::Result<Signal> {
        anyhow::bail!("upstream indicator service unavailable")
    }
}

fn voter(id: &str, verdict: Verdict, confidence: f64) -> Arc<dyn Agent> {
    Arc::new(Voter {
        id: id.to_string(),
        verdict,
        confidence,
    })
}

fn broken(id: &str) -> Arc<dyn Agent> {
    Arc::new(Broken { id: id.to_string() })
}

fn flat_context(len: usize) -> Arc<MarketContext> {
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
    let bars = (0..len)
        .map(|i| {
            Bar::new(
                start + ChronoDuration::minutes(i as i64),
                100.0,
                100.5,
                99.5,
                100.0,
                1_000,
            )
        })
        .collect();
    Arc::new(MarketContext::new(bars).unwrap())
}

/// Nine agents weighted `{2,2,2,1,1,1,1,1,1}`; the first four vote CALL at 80
/// (combined weight 7), the other five NO_TRADE at 50 (combined weight 5).
fn nine_agent_engine() -> (ConsensusEngine, Vec<Signal>) {
    let ids = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
    let weights = WeightTable::new(ids.iter().enumerate().map(|(n, id)| (*id, if n < 3 { 2 } else { 1 }))).unwrap();

    let signals: Vec<Signal> = ids
        .iter()
        .enumerate()
        .map(|(n, id)| {
            if n < 4 {
                Signal::new(*id, Verdict::BuyCall, 80.0)
            } else {
                Signal::new(*id, Verdict::NoTrade, 50.0)
            }
        })
        .collect();

    let agents = signals
        .iter()
        .map(|s| voter(&s.source, s.verdict, s.confidence))
        .collect();

    let engine = ConsensusEngine::new(agents, weights, TrendAssessor::default(), ConsensusConfig::default()).unwrap();
    (engine, signals)
}

// (7 * 80 + 5 * 50) / 12
const SCENARIO_AVG: f64 = 67.5;

#[test]
fn strong_call_majority_keeps_average_confidence_in_neutral_trend() {
    let (engine, signals) = nine_agent_engine();
    let decision = engine.aggregate(signals, TrendAssessment::neutral());

    assert_eq!(decision.verdict, Verdict::BuyCall);
    assert_eq!(decision.total_weight, 12);
    assert_eq!(decision.votes_for(Verdict::BuyCall), 7);
    assert_eq!(decision.votes_for(Verdict::NoTrade), 5);
    assert_eq!(decision.votes_for(Verdict::BuyPut), 0);
    assert!((decision.confidence - SCENARIO_AVG).abs() < 1e-9);
    assert_eq!(decision.risk_level, RiskLevel::Medium);
}

#[test]
fn strong_aligned_trend_boosts_confidence() {
    let (engine, signals) = nine_agent_engine();
    let decision = engine.aggregate(signals, TrendAssessment::new(TrendDirection::StrongBullish, 80.0));

    assert_eq!(decision.verdict, Verdict::BuyCall);
    let expected = (SCENARIO_AVG * 1.15).min(95.0);
    assert!((decision.confidence - expected).abs() < 1e-9);
    assert_eq!(decision.risk_level, RiskLevel::Medium);
}

#[test]
fn put_against_strong_bull_trend_is_vetoed() {
    let weights = WeightTable::new([("p1", 1), ("p2", 1), ("p3", 1)]).unwrap();
    let agents = vec![
        voter("p1", Verdict::BuyPut, 70.0),
        voter("p2", Verdict::BuyPut, 70.0),
        voter("p3", Verdict::BuyPut, 70.0),
    ];
    let engine = ConsensusEngine::new(agents, weights, TrendAssessor::default(), ConsensusConfig::default()).unwrap();

    let signals = ["p1", "p2", "p3"]
        .iter()
        .map(|id| Signal::new(*id, Verdict::BuyPut, 70.0))
        .collect();
    let decision = engine.aggregate(signals, TrendAssessment::new(TrendDirection::StrongBullish, 80.0));

    assert_eq!(decision.verdict, Verdict::NoTrade);
    assert_eq!(decision.confidence, 75.0);
    assert!(decision
        .rationale
        .iter()
        .any(|line| line.contains("counter-trend confidence insufficient")));
}

#[tokio::test]
async fn faulting_agents_are_excluded_from_the_tally() {
    let ids = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
    let weights = WeightTable::new(ids.iter().enumerate().map(|(n, id)| (*id, if n < 3 { 2 } else { 1 }))).unwrap();

    // a, d and g fault; survivors b(2) c(2) e f h i(1 each)
    let agents = ids
        .iter()
        .map(|id| match *id {
            "a" | "d" | "g" => broken(id),
            _ => voter(id, Verdict::NoTrade, 60.0),
        })
        .collect();
    let engine = ConsensusEngine::new(agents, weights, TrendAssessor::default(), ConsensusConfig::default()).unwrap();

    let decision = engine.evaluate(flat_context(30)).await;

    assert_eq!(decision.signals.len(), 6);
    assert_eq!(decision.excluded.len(), 3);
    assert_eq!(decision.total_weight, 8);
    assert_eq!(decision.vote_tally.values().sum::<u32>(), decision.total_weight);
    assert!(decision
        .excluded
        .iter()
        .all(|fault| fault.reason.contains("upstream indicator service unavailable")));
}

#[tokio::test]
async fn all_agents_faulting_yields_empty_no_trade() {
    let weights = WeightTable::new([("x", 2), ("y", 1)]).unwrap();
    let engine = ConsensusEngine::new(
        vec![broken("x"), broken("y")],
        weights,
        TrendAssessor::default(),
        ConsensusConfig::default(),
    )
    .unwrap();

    let decision = engine.evaluate(flat_context(30)).await;

    assert_eq!(decision.verdict, Verdict::NoTrade);
    assert_eq!(decision.confidence, 0.0);
    assert!(decision.vote_tally.is_empty());
    assert!(decision.signals.is_empty());
    assert_eq!(decision.excluded.len(), 2);
    assert!(!decision.is_actionable());
}

#[test]
fn exact_ties_prefer_no_trade_then_call() {
    let weights = WeightTable::new([("n", 1), ("c", 1), ("p", 1), ("q", 1)]).unwrap();
    let engine = ConsensusEngine::new(
        vec![
            voter("n", Verdict::NoTrade, 60.0),
            voter("c", Verdict::BuyCall, 60.0),
            voter("p", Verdict::BuyPut, 60.0),
            voter("q", Verdict::BuyPut, 60.0),
        ],
        weights,
        TrendAssessor::default(),
        ConsensusConfig::default(),
    )
    .unwrap();

    // NO_TRADE 2/4 against CALL 2/4
    let decision = engine.aggregate(
        vec![
            Signal::new("n", Verdict::NoTrade, 60.0),
            Signal::new("c", Verdict::NoTrade, 60.0),
            Signal::new("p", Verdict::BuyCall, 60.0),
            Signal::new("q", Verdict::BuyCall, 60.0),
        ],
        TrendAssessment::neutral(),
    );
    assert_eq!(decision.verdict, Verdict::NoTrade);

    // CALL 2/4 against PUT 2/4
    let decision = engine.aggregate(
        vec![
            Signal::new("n", Verdict::BuyCall, 60.0),
            Signal::new("c", Verdict::BuyCall, 60.0),
            Signal::new("p", Verdict::BuyPut, 60.0),
            Signal::new("q", Verdict::BuyPut, 60.0),
        ],
        TrendAssessment::neutral(),
    );
    assert_eq!(decision.verdict, Verdict::BuyCall);
}

#[test]
fn aggregation_is_deterministic() {
    let (engine, signals) = nine_agent_engine();
    let trend = TrendAssessment::new(TrendDirection::Bullish, 62.0);

    let first = engine.aggregate(signals.clone(), trend.clone());
    let second = engine.aggregate(signals, trend);
    assert_eq!(first, second);
}

#[test]
fn confidence_stays_in_range_across_trends() {
    let (engine, signals) = nine_agent_engine();
    let directions = [
        TrendDirection::StrongBearish,
        TrendDirection::Bearish,
        TrendDirection::Neutral,
        TrendDirection::Bullish,
        TrendDirection::StrongBullish,
    ];

    for direction in directions {
        for strength in [0.0, 54.9, 55.0, 69.9, 70.0, 100.0] {
            let decision = engine.aggregate(signals.clone(), TrendAssessment::new(direction, strength));
            assert!(
                (0.0..=100.0).contains(&decision.confidence),
                "{} @ {} gave {}",
                direction,
                strength,
                decision.confidence
            );
            assert_eq!(decision.vote_tally.values().sum::<u32>(), decision.total_weight);
        }
    }
}

#[tokio::test]
async fn concurrent_and_sequential_evaluation_agree() {
    let (engine, _) = nine_agent_engine();
    let context = flat_context(120);

    let concurrent = engine.evaluate(context.clone()).await;
    let sequential = engine.evaluate_blocking(&context);
    assert_eq!(concurrent, sequential);
}

#[tokio::test]
#[ignore] // Run with: cargo test --release -- --ignored --nocapture
async fn stress_test_parallel_evaluations() {
    let (engine, _) = nine_agent_engine();
    let engine = Arc::new(engine);
    let context = flat_context(240);
    let rounds = 500;

    let start = Instant::now();
    let handles: Vec<_> = (0..rounds)
        .map(|_| {
            let engine = engine.clone();
            let context = context.clone();
            tokio::spawn(async move { engine.evaluate(context).await })
        })
        .collect();

    for handle in handles {
        let decision = handle.await.unwrap();
        assert_eq!(decision.signals.len(), 9);
    }

    let elapsed = start.elapsed();
    println!(
        "✅ {} evaluations in {:?} ({:.0} decisions/s)",
        rounds,
        elapsed,
        rounds as f64 / elapsed.as_secs_f64()
    );
    assert!(elapsed < Duration::from_secs(30));
}
