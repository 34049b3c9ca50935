use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::context::Bar;
use super::indicators;
use crate::core::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    StrongBearish,
    Bearish,
    Neutral,
    Bullish,
    StrongBullish,
}

impl TrendDirection {
    pub fn is_bullish(self) -> bool {
        matches!(self, TrendDirection::Bullish | TrendDirection::StrongBullish)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, TrendDirection::Bearish | TrendDirection::StrongBearish)
    }

    /// Cut points: `>=75`, `>=60`, `<=25`, `<=40`, else neutral.
    pub fn from_bullish_percentage(pct: f64) -> Self {
        if pct >= 75.0 {
            TrendDirection::StrongBullish
        } else if pct >= 60.0 {
            TrendDirection::Bullish
        } else if pct <= 25.0 {
            TrendDirection::StrongBearish
        } else if pct <= 40.0 {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendDirection::StrongBearish => "STRONG_BEARISH",
            TrendDirection::Bearish => "BEARISH",
            TrendDirection::Neutral => "NEUTRAL",
            TrendDirection::Bullish => "BULLISH",
            TrendDirection::StrongBullish => "STRONG_BULLISH",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub direction: TrendDirection,
    /// `[0, 100]`; 50 for a neutral trend.
    pub strength: f64,
    pub bullish_score: f64,
    pub bearish_score: f64,
    pub bullish_percentage: f64,
    pub rationale: Vec<String>,
}

impl TrendAssessment {
    /// An externally supplied assessment, e.g. from a replay or a test.
    pub fn new(direction: TrendDirection, strength: f64) -> Self {
        let strength = strength.clamp(0.0, 100.0);
        let bullish_percentage = if direction.is_bullish() {
            strength
        } else if direction.is_bearish() {
            100.0 - strength
        } else {
            50.0
        };

        Self {
            direction,
            strength,
            bullish_score: 0.0,
            bearish_score: 0.0,
            bullish_percentage,
            rationale: Vec::new(),
        }
    }

    pub fn neutral() -> Self {
        Self::new(TrendDirection::Neutral, 50.0)
    }

    /// Scores to direction and strength. Zero scores on both sides read as 50%.
    pub fn from_scores(bullish_score: f64, bearish_score: f64) -> Self {
        let total = bullish_score + bearish_score;
        let bullish_percentage = if total > 0.0 {
            bullish_score / total * 100.0
        } else {
            50.0
        };

        let direction = TrendDirection::from_bullish_percentage(bullish_percentage);
        let strength = if direction.is_bullish() {
            bullish_percentage
        } else if direction.is_bearish() {
            100.0 - bullish_percentage
        } else {
            50.0
        };

        Self {
            direction,
            strength,
            bullish_score,
            bearish_score,
            bullish_percentage,
            rationale: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Trend {} (strength {:.1}, {:.1}% bullish)",
            self.direction, self.strength, self.bullish_percentage
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendWindow {
    pub length: usize,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendConfig {
    /// Short, medium, long; weights grow with length.
    pub windows: Vec<TrendWindow>,
    pub rsi_period: usize,
    pub rsi_bullish: f64,
    pub rsi_bearish: f64,
    pub volume_lookback: usize,
    pub volume_multiple: f64,
    pub volume_amplification: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            windows: vec![
                TrendWindow { length: 20, weight: 1 },
                TrendWindow { length: 50, weight: 2 },
                TrendWindow { length: 100, weight: 3 },
            ],
            rsi_period: 14,
            rsi_bullish: 55.0,
            rsi_bearish: 45.0,
            volume_lookback: 20,
            volume_multiple: 1.5,
            volume_amplification: 1.2,
        }
    }
}

impl TrendConfig {
    /// Rejects settings that would silently flatten or invert the assessment.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |name: &'static str, value: f64| -> ConfigResult<()> {
            Err(ConfigError::InvalidParameter { name, value })
        };

        if self.windows.is_empty() {
            return invalid("windows", 0.0);
        }
        let mut windows = self.windows.clone();
        windows.sort_by_key(|w| w.length);
        for w in &windows {
            if w.length < 2 {
                return invalid("windows.length", w.length as f64);
            }
            if w.weight == 0 {
                return invalid("windows.weight", 0.0);
            }
        }
        for pair in windows.windows(2) {
            if pair[1].weight < pair[0].weight {
                return invalid("windows.weight", pair[1].weight as f64);
            }
        }

        if self.rsi_period == 0 {
            return invalid("rsi_period", 0.0);
        }
        for (name, level) in [("rsi_bullish", self.rsi_bullish), ("rsi_bearish", self.rsi_bearish)] {
            if !(0.0..=100.0).contains(&level) {
                return invalid(name, level);
            }
        }
        if self.rsi_bearish > self.rsi_bullish {
            return invalid("rsi_bearish", self.rsi_bearish);
        }

        if !(self.volume_multiple > 0.0 && self.volume_multiple.is_finite()) {
            return invalid("volume_multiple", self.volume_multiple);
        }
        if !(self.volume_amplification > 0.0 && self.volume_amplification.is_finite()) {
            return invalid("volume_amplification", self.volume_amplification);
        }

        Ok(())
    }
}

/// Longer-horizon bias used to adjust the vote-derived confidence.
#[derive(Debug, Clone, Default)]
pub struct TrendAssessor {
    config: TrendConfig,
}

impl TrendAssessor {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    pub fn assess(&self, bars: &[Bar]) -> TrendAssessment {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut bullish = 0.0;
        let mut bearish = 0.0;
        let mut notes = Vec::new();

        for window in &self.config.windows {
            if window.length < 2 || closes.len() < window.length {
                debug!(
                    "Trend window {} skipped: {} bars available",
                    window.length,
                    closes.len()
                );
                continue;
            }

            let slice = &closes[closes.len() - window.length..];
            let w = window.weight as f64;
            let (bull, bear) = self.score_window(slice);
            bullish += bull as f64 * w;
            bearish += bear as f64 * w;
            notes.push(format!(
                "{}-bar window: {} bullish / {} bearish indicators (x{})",
                window.length, bull, bear, window.weight
            ));
        }

        if let Some(ratio) = self.volume_surge(bars) {
            if bullish > bearish {
                bullish *= self.config.volume_amplification;
                notes.push(format!("Volume {:.1}x average confirms bullish bias", ratio));
            } else if bearish > bullish {
                bearish *= self.config.volume_amplification;
                notes.push(format!("Volume {:.1}x average confirms bearish bias", ratio));
            }
        }

        let mut assessment = TrendAssessment::from_scores(bullish, bearish);
        assessment.rationale = notes;
        assessment
    }

    /// Counts bullish and bearish indicators inside one window.
    fn score_window(&self, closes: &[f64]) -> (u32, u32) {
        let mut bull = 0;
        let mut bear = 0;

        if let (Some(mean), Some(&last)) = (indicators::sma(closes, closes.len()), closes.last()) {
            if last > mean {
                bull += 1;
            } else if last < mean {
                bear += 1;
            }
        }

        // MACD periods scale with the window so every window gets a crossover reading.
        let len = closes.len();
        let fast = (len / 4).max(2);
        let slow = (len / 2).max(fast + 1);
        let signal = (len / 6).max(2);
        if let Some(m) = indicators::macd(closes, fast, slow, signal) {
            if m.line > m.signal {
                bull += 1;
            } else if m.line < m.signal {
                bear += 1;
            }
        }

        if let Some(rsi) = indicators::rsi(closes, self.config.rsi_period) {
            if rsi > self.config.rsi_bullish {
                bull += 1;
            } else if rsi < self.config.rsi_bearish {
                bear += 1;
            }
        }

        (bull, bear)
    }

    fn volume_surge(&self, bars: &[Bar]) -> Option<f64> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        let ratio = indicators::volume_ratio(&volumes, self.config.volume_lookback)?;
        (ratio > self.config.volume_multiple).then_some(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::context::tests::bars_from_closes;

    #[test]
    fn test_direction_cut_points() {
        assert_eq!(TrendDirection::from_bullish_percentage(75.0), TrendDirection::StrongBullish);
        assert_eq!(TrendDirection::from_bullish_percentage(60.0), TrendDirection::Bullish);
        assert_eq!(TrendDirection::from_bullish_percentage(59.9), TrendDirection::Neutral);
        assert_eq!(TrendDirection::from_bullish_percentage(40.0), TrendDirection::Bearish);
        assert_eq!(TrendDirection::from_bullish_percentage(25.0), TrendDirection::StrongBearish);
    }

    #[test]
    fn test_config_validation() {
        assert!(TrendConfig::default().validate().is_ok());

        let reject = |config: TrendConfig, field: &str| match config.validate() {
            Err(ConfigError::InvalidParameter { name, .. }) => assert_eq!(name, field),
            other => panic!("expected {} to be rejected, got {:?}", field, other),
        };

        reject(
            TrendConfig {
                volume_amplification: 0.0,
                ..Default::default()
            },
            "volume_amplification",
        );
        reject(
            TrendConfig {
                volume_amplification: -1.2,
                ..Default::default()
            },
            "volume_amplification",
        );
        reject(
            TrendConfig {
                volume_multiple: 0.0,
                ..Default::default()
            },
            "volume_multiple",
        );
        reject(
            TrendConfig {
                rsi_bullish: 40.0,
                rsi_bearish: 60.0,
                ..Default::default()
            },
            "rsi_bearish",
        );
        reject(
            TrendConfig {
                rsi_bullish: 120.0,
                ..Default::default()
            },
            "rsi_bullish",
        );
        reject(
            TrendConfig {
                rsi_period: 0,
                ..Default::default()
            },
            "rsi_period",
        );
        reject(
            TrendConfig {
                windows: vec![
                    TrendWindow { length: 100, weight: 1 },
                    TrendWindow { length: 20, weight: 3 },
                ],
                ..Default::default()
            },
            "windows.weight",
        );
    }

    #[test]
    fn test_zero_scores_are_neutral() {
        let a = TrendAssessment::from_scores(0.0, 0.0);
        assert_eq!(a.bullish_percentage, 50.0);
        assert_eq!(a.direction, TrendDirection::Neutral);
        assert_eq!(a.strength, 50.0);
    }

    #[test]
    fn test_strength_mirrors_bearish_side() {
        let a = TrendAssessment::from_scores(1.0, 4.0);
        assert_eq!(a.direction, TrendDirection::StrongBearish);
        assert!((a.strength - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_rising_series_is_bullish() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + i as f64 * 0.5 + (i as f64 * 0.01).powi(2)).collect();
        let assessment = TrendAssessor::default().assess(&bars_from_closes(&closes, 1_000));
        assert_eq!(assessment.direction, TrendDirection::StrongBullish);
        assert!(assessment.strength >= 75.0);
        assert_eq!(assessment.rationale.len(), 3);
    }

    #[test]
    fn test_falling_series_is_bearish() {
        let closes: Vec<f64> = (0..120).map(|i| 200.0 - i as f64 * 0.5 - (i as f64 * 0.01).powi(2)).collect();
        let assessment = TrendAssessor::default().assess(&bars_from_closes(&closes, 1_000));
        assert_eq!(assessment.direction, TrendDirection::StrongBearish);
        assert!(assessment.strength >= 75.0);
    }

    #[test]
    fn test_short_history_is_neutral_not_a_panic() {
        let assessment = TrendAssessor::default().assess(&bars_from_closes(&[100.0, 101.0], 10));
        assert_eq!(assessment.direction, TrendDirection::Neutral);
        assert!(assessment.rationale.is_empty());
    }

    #[test]
    fn test_volume_surge_amplifies_leading_side() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let mut bars = bars_from_closes(&closes, 1_000);
        let quiet = TrendAssessor::default().assess(&bars);

        bars.last_mut().unwrap().volume = 5_000;
        let loud = TrendAssessor::default().assess(&bars);

        assert!((loud.bullish_score - quiet.bullish_score * 1.2).abs() < 1e-9);
        assert_eq!(loud.bearish_score, quiet.bearish_score);
    }
}
