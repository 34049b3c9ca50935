use serde_json::json;

use super::Agent;
use crate::strategy::context::{AgentInputs, AgentView};
use crate::strategy::indicators;
use crate::strategy::signals::{Signal, Verdict};

pub const ID: &str = "volatility_regime";

/// Reads the implied-volatility index and where price sits in its Bollinger bands.
#[derive(Debug, Clone)]
pub struct VolatilityRegimeAgent {
    /// At or above this index level option premiums are too rich to buy.
    pub extreme_index: f64,
    /// At or below this level premiums are cheap and breakouts get extra credit.
    pub cheap_index: f64,
    pub band_period: usize,
    pub band_width: f64,
}

impl Default for VolatilityRegimeAgent {
    fn default() -> Self {
        Self {
            extreme_index: 35.0,
            cheap_index: 15.0,
            band_period: 20,
            band_width: 2.0,
        }
    }
}

impl Agent for VolatilityRegimeAgent {
    fn id(&self) -> &str {
        ID
    }

    fn inputs(&self) -> AgentInputs {
        AgentInputs::BARS_ONLY.with_volatility_index()
    }

    fn analyze(&self, view: &AgentView<'_>) -> anyhow::Result<Signal> {
        let Some(index) = view.volatility_index else {
            return Ok(Signal::insufficient(ID, "Volatility index unavailable"));
        };

        if index >= self.extreme_index {
            return Ok(Signal::new(ID, Verdict::NoTrade, 100.0)
                .with_reason(format!("Volatility index {:.1} too high, premiums too rich", index))
                .with_detail(json!({ "volatility_index": index })));
        }

        let closes = view.closes();
        let (Some((upper, middle, lower)), Some(&price)) = (
            indicators::bollinger_bands(&closes, self.band_period, self.band_width),
            closes.last(),
        ) else {
            return Ok(Signal::insufficient(
                ID,
                format!("Need {} bars for bands, have {}", self.band_period, closes.len()),
            ));
        };

        let width = upper - lower;
        if width <= 0.0 {
            return Ok(Signal::new(ID, Verdict::NoTrade, 30.0)
                .with_reason("Bands collapsed, no range to read")
                .with_detail(json!({ "volatility_index": index })));
        }

        let percent_b = (price - lower) / width;
        let cheap_bonus = if index <= self.cheap_index { 15.0 } else { 0.0 };
        let detail = json!({
            "volatility_index": index,
            "upper": upper,
            "middle": middle,
            "lower": lower,
            "percent_b": percent_b,
        });

        let signal = if percent_b > 0.8 {
            Signal::new(ID, Verdict::BuyCall, 55.0 + cheap_bonus)
                .with_reason(format!("Price pressing upper band (%B {:.2})", percent_b))
        } else if percent_b < 0.2 {
            Signal::new(ID, Verdict::BuyPut, 55.0 + cheap_bonus)
                .with_reason(format!("Price pressing lower band (%B {:.2})", percent_b))
        } else {
            Signal::new(ID, Verdict::NoTrade, 50.0)
                .with_reason(format!("Price inside the bands (%B {:.2})", percent_b))
        };

        let signal = if cheap_bonus > 0.0 {
            signal.with_reason(format!("Volatility index {:.1} keeps premiums cheap", index))
        } else {
            signal
        };

        Ok(signal.with_detail(detail))
    }
}
