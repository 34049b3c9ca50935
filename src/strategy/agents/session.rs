use chrono::{Duration, NaiveTime};
use serde_json::json;

use super::Agent;
use crate::strategy::context::{AgentInputs, AgentView};
use crate::strategy::indicators;
use crate::strategy::signals::{Signal, Verdict};

pub const ID: &str = "session_timing";

/// Regular trading hours in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl SessionHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }
}

impl Default for SessionHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(14, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Stays out around the open and close, otherwise follows short-horizon momentum.
///
/// The evaluation time comes from the context, never the system clock, so replays
/// of the same snapshot give the same answer.
#[derive(Debug, Clone)]
pub struct SessionTimingAgent {
    pub hours: SessionHours,
    pub opening_window: Duration,
    pub closing_window: Duration,
    pub momentum_lookback: usize,
    pub momentum_threshold_pct: f64,
}

impl SessionTimingAgent {
    pub fn new(hours: SessionHours) -> Self {
        Self {
            hours,
            opening_window: Duration::minutes(30),
            closing_window: Duration::minutes(60),
            momentum_lookback: 5,
            momentum_threshold_pct: 0.3,
        }
    }
}

impl Default for SessionTimingAgent {
    fn default() -> Self {
        Self::new(SessionHours::default())
    }
}

impl Agent for SessionTimingAgent {
    fn id(&self) -> &str {
        ID
    }

    fn inputs(&self) -> AgentInputs {
        AgentInputs::BARS_ONLY.with_clock()
    }

    fn analyze(&self, view: &AgentView<'_>) -> anyhow::Result<Signal> {
        let Some(now) = view.now else {
            return Ok(Signal::insufficient(ID, "Evaluation time not supplied"));
        };
        let time = now.time();
        let detail = json!({ "time_utc": time.format("%H:%M").to_string() });

        if time < self.hours.open || time >= self.hours.close {
            return Ok(Signal::new(ID, Verdict::NoTrade, 100.0)
                .with_reason(format!("Outside regular session at {}", time.format("%H:%M")))
                .with_detail(detail));
        }

        if self.hours.close - time <= self.closing_window {
            return Ok(Signal::new(ID, Verdict::NoTrade, 100.0)
                .with_reason("Last hour of trading, theta decay too steep")
                .with_detail(detail));
        }

        if time - self.hours.open < self.opening_window {
            return Ok(Signal::new(ID, Verdict::NoTrade, 80.0)
                .with_reason("Opening range still forming")
                .with_detail(detail));
        }

        let closes = view.closes();
        let Some(change) = indicators::rate_of_change(&closes, self.momentum_lookback) else {
            return Ok(Signal::insufficient(
                ID,
                format!("Need {} bars for momentum, have {}", self.momentum_lookback + 1, closes.len()),
            ));
        };

        let signal = if change >= self.momentum_threshold_pct {
            Signal::new(ID, Verdict::BuyCall, 55.0)
                .with_reason(format!("Mid-session momentum {:+.2}%", change))
        } else if change <= -self.momentum_threshold_pct {
            Signal::new(ID, Verdict::BuyPut, 55.0)
                .with_reason(format!("Mid-session momentum {:+.2}%", change))
        } else {
            Signal::new(ID, Verdict::NoTrade, 50.0)
                .with_reason(format!("Mid-session drift only {:+.2}%", change))
        };

        Ok(signal.with_detail(detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::context::tests::bars_from_closes;
    use crate::strategy::context::MarketContext;
    use chrono::{TimeZone, Utc};

    fn run_at(hour: u32, minute: u32, closes: &[f64]) -> Signal {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap();
        let ctx = MarketContext::new(bars_from_closes(closes, 100)).unwrap().at(now);
        let agent = SessionTimingAgent::default();
        agent.analyze(&ctx.project(agent.inputs())).unwrap()
    }

    #[test]
    fn test_last_hour_is_no_trade() {
        let signal = run_at(20, 15, &[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        assert_eq!(signal.verdict, Verdict::NoTrade);
        assert_eq!(signal.confidence, 100.0);
    }

    #[test]
    fn test_opening_range() {
        let signal = run_at(14, 45, &[100.0; 6]);
        assert_eq!(signal.verdict, Verdict::NoTrade);
        assert_eq!(signal.confidence, 80.0);
    }

    #[test]
    fn test_outside_session() {
        let signal = run_at(3, 0, &[100.0; 6]);
        assert_eq!(signal.confidence, 100.0);
    }

    #[test]
    fn test_mid_session_momentum() {
        let signal = run_at(17, 0, &[100.0, 100.2, 100.4, 100.6, 100.8, 101.0]);
        assert_eq!(signal.verdict, Verdict::BuyCall);
        assert_eq!(signal.confidence, 55.0);

        let signal = run_at(17, 0, &[101.0, 100.8, 100.6, 100.4, 100.2, 100.0]);
        assert_eq!(signal.verdict, Verdict::BuyPut);
    }

    #[test]
    fn test_same_snapshot_same_answer() {
        let closes = [100.0, 100.2, 100.4, 100.6, 100.8, 101.0];
        assert_eq!(run_at(17, 0, &closes), run_at(17, 0, &closes));
    }

    #[test]
    fn test_without_clock_cannot_speak() {
        let ctx = MarketContext::new(bars_from_closes(&[100.0; 6], 100)).unwrap();
        let signal = SessionTimingAgent::default()
            .analyze(&ctx.project(AgentInputs::BARS_ONLY))
            .unwrap();
        assert_eq!(signal.confidence, 0.0);
    }
}
