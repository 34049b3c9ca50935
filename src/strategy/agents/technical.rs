use serde_json::json;

use super::{vote_confidence, Agent};
use crate::strategy::context::AgentView;
use crate::strategy::indicators;
use crate::strategy::signals::{Signal, Verdict};

pub const ID: &str = "technical";

/// Moving-average stack, RSI and MACD histogram, one vote each.
#[derive(Debug, Clone)]
pub struct TechnicalAgent {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub rsi_period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for TechnicalAgent {
    fn default() -> Self {
        Self {
            sma_fast: 20,
            sma_slow: 50,
            rsi_period: 14,
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

impl Agent for TechnicalAgent {
    fn id(&self) -> &str {
        ID
    }

    fn analyze(&self, view: &AgentView<'_>) -> anyhow::Result<Signal> {
        let closes = view.closes();
        let required = self.sma_slow.max(35);
        if closes.len() < required {
            return Ok(Signal::insufficient(
                ID,
                format!("Need {} bars, have {}", required, closes.len()),
            ));
        }

        let (Some(fast), Some(slow), Some(rsi), Some(macd), Some(&price)) = (
            indicators::sma(&closes, self.sma_fast),
            indicators::sma(&closes, self.sma_slow),
            indicators::rsi(&closes, self.rsi_period),
            indicators::macd(&closes, 12, 26, 9),
            closes.last(),
        ) else {
            return Ok(Signal::insufficient(ID, "Indicators undefined on this history"));
        };

        let mut calls = 0;
        let mut puts = 0;
        let mut reasons = Vec::new();

        if price > fast && fast > slow {
            calls += 1;
            reasons.push(format!("Price {:.2} above rising MA stack ({:.2} > {:.2})", price, fast, slow));
        } else if price < fast && fast < slow {
            puts += 1;
            reasons.push(format!("Price {:.2} below falling MA stack ({:.2} < {:.2})", price, fast, slow));
        } else {
            reasons.push("Moving averages tangled".to_string());
        }

        if rsi >= self.overbought {
            puts += 1;
            reasons.push(format!("RSI {:.1} overbought", rsi));
        } else if rsi <= self.oversold {
            calls += 1;
            reasons.push(format!("RSI {:.1} oversold", rsi));
        } else if rsi > 50.0 {
            calls += 1;
            reasons.push(format!("RSI {:.1} bullish zone", rsi));
        } else if rsi < 50.0 {
            puts += 1;
            reasons.push(format!("RSI {:.1} bearish zone", rsi));
        }

        if macd.histogram > 0.0 {
            calls += 1;
            reasons.push(format!("MACD histogram positive ({:.4})", macd.histogram));
        } else if macd.histogram < 0.0 {
            puts += 1;
            reasons.push(format!("MACD histogram negative ({:.4})", macd.histogram));
        }

        let (verdict, confidence) = if calls >= 2 && calls > puts {
            (Verdict::BuyCall, vote_confidence(40.0, 20.0, calls))
        } else if puts >= 2 && puts > calls {
            (Verdict::BuyPut, vote_confidence(40.0, 20.0, puts))
        } else {
            reasons.push("Indicators disagree".to_string());
            (Verdict::NoTrade, 60.0)
        };

        let signal = reasons
            .into_iter()
            .fold(Signal::new(ID, verdict, confidence), |s, r| s.with_reason(r))
            .with_detail(json!({
                "price": price,
                "sma_fast": fast,
                "sma_slow": slow,
                "rsi": rsi,
                "macd_histogram": macd.histogram,
                "call_votes": calls,
                "put_votes": puts,
            }));

        Ok(signal)
    }
}
