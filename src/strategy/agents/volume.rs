use serde_json::json;

use super::Agent;
use crate::strategy::context::AgentView;
use crate::strategy::indicators;
use crate::strategy::signals::{Signal, Verdict};

pub const ID: &str = "volume_profile";

/// Trades only moves that arrive on unusual volume.
#[derive(Debug, Clone)]
pub struct VolumeProfileAgent {
    pub lookback: usize,
    pub surge_ratio: f64,
    pub thin_ratio: f64,
    /// Minimum absolute last-bar move, in percent, to count as directional.
    pub min_move_pct: f64,
}

impl Default for VolumeProfileAgent {
    fn default() -> Self {
        Self {
            lookback: 20,
            surge_ratio: 1.5,
            thin_ratio: 0.5,
            min_move_pct: 0.05,
        }
    }
}

impl Agent for VolumeProfileAgent {
    fn id(&self) -> &str {
        ID
    }

    fn analyze(&self, view: &AgentView<'_>) -> anyhow::Result<Signal> {
        let bars = view.bars;
        if self.lookback == 0 || bars.len() < self.lookback + 1 {
            return Ok(Signal::insufficient(
                ID,
                format!("Need {} bars for volume baseline, have {}", self.lookback + 1, bars.len()),
            ));
        }

        let Some((current, history)) = bars.split_last() else {
            return Ok(Signal::insufficient(ID, "No bars"));
        };
        let previous = &history[history.len() - 1];

        let ratio = match indicators::volume_ratio(&view.volumes(), self.lookback) {
            Some(ratio) if previous.close != 0.0 => ratio,
            _ => return Ok(Signal::insufficient(ID, "Volume baseline is zero")),
        };
        let move_pct = (current.close - previous.close) / previous.close * 100.0;
        let detail = json!({
            "volume_ratio": ratio,
            "move_pct": move_pct,
        });

        let signal = if ratio >= self.surge_ratio {
            let confidence = 50.0 + (ratio - 1.0) * 25.0;
            if move_pct >= self.min_move_pct {
                Signal::new(ID, Verdict::BuyCall, confidence)
                    .with_reason(format!("Volume {:.1}x baseline on a {:+.2}% up move", ratio, move_pct))
            } else if move_pct <= -self.min_move_pct {
                Signal::new(ID, Verdict::BuyPut, confidence)
                    .with_reason(format!("Volume {:.1}x baseline on a {:+.2}% down move", ratio, move_pct))
            } else {
                Signal::new(ID, Verdict::NoTrade, 50.0)
                    .with_reason(format!("Volume {:.1}x baseline but price flat", ratio))
            }
        } else if ratio < self.thin_ratio {
            Signal::new(ID, Verdict::NoTrade, 70.0)
                .with_reason(format!("Thin volume ({:.1}x baseline)", ratio))
        } else {
            Signal::new(ID, Verdict::NoTrade, 40.0)
                .with_reason(format!("No volume confirmation ({:.1}x baseline)", ratio))
        };

        Ok(signal.with_detail(detail))
    }
}
