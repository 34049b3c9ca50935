use serde_json::json;

use super::Agent;
use crate::strategy::context::{AgentInputs, AgentView, Bar};
use crate::strategy::indicators;
use crate::strategy::signals::{Signal, Verdict};

pub const ID: &str = "multi_timeframe";

/// Close-versus-average agreement across the primary and coarser resolutions.
#[derive(Debug, Clone)]
pub struct MultiTimeframeAgent {
    pub sma_period: usize,
}

impl Default for MultiTimeframeAgent {
    fn default() -> Self {
        Self { sma_period: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bias {
    Up,
    Down,
    Flat,
}

impl MultiTimeframeAgent {
    fn bias(&self, bars: &[Bar]) -> Option<Bias> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mean = indicators::sma(&closes, self.sma_period)?;
        let last = *closes.last()?;

        Some(if last > mean {
            Bias::Up
        } else if last < mean {
            Bias::Down
        } else {
            Bias::Flat
        })
    }
}

impl Agent for MultiTimeframeAgent {
    fn id(&self) -> &str {
        ID
    }

    fn inputs(&self) -> AgentInputs {
        AgentInputs::BARS_ONLY.with_higher_timeframes()
    }

    fn analyze(&self, view: &AgentView<'_>) -> anyhow::Result<Signal> {
        if view.higher_timeframes.is_empty() {
            return Ok(Signal::insufficient(ID, "No higher timeframes supplied"));
        }

        let frames = std::iter::once(("primary", view.bars))
            .chain(view.higher_timeframes.iter().map(|tf| (tf.label.as_str(), tf.bars.as_slice())));

        let mut up = 0u32;
        let mut down = 0u32;
        let mut read = 0u32;
        let mut reasons = Vec::new();

        for (label, bars) in frames {
            match self.bias(bars) {
                Some(bias) => {
                    read += 1;
                    match bias {
                        Bias::Up => up += 1,
                        Bias::Down => down += 1,
                        Bias::Flat => {}
                    }
                    reasons.push(format!("{}: {:?}", label, bias));
                }
                None => reasons.push(format!("{}: not enough bars", label)),
            }
        }

        if read == 0 {
            return Ok(reasons
                .into_iter()
                .fold(Signal::insufficient(ID, "No timeframe has enough history"), |s, r| {
                    s.with_reason(r)
                }));
        }

        let (verdict, confidence) = if up == read {
            (Verdict::BuyCall, (60.0 + 10.0 * read as f64).min(90.0))
        } else if down == read {
            (Verdict::BuyPut, (60.0 + 10.0 * read as f64).min(90.0))
        } else if up * 2 > read {
            (Verdict::BuyCall, 50.0)
        } else if down * 2 > read {
            (Verdict::BuyPut, 50.0)
        } else {
            reasons.push("Timeframes disagree".to_string());
            (Verdict::NoTrade, 60.0)
        };

        Ok(reasons
            .into_iter()
            .fold(Signal::new(ID, verdict, confidence), |s, r| s.with_reason(r))
            .with_detail(json!({ "frames_read": read, "up": up, "down": down })))
    }
}
