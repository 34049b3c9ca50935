use anyhow::Result;
use chrono::NaiveTime;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use super::error::ConfigError;
use crate::ai::consensus::ConsensusConfig;
use crate::ai::decision::RiskBands;
use crate::ai::weights::WeightTable;
use crate::strategy::agents::{SessionHours, DEFAULT_WEIGHTS};
use crate::strategy::trend::{TrendConfig, TrendWindow};

#[derive(Debug, Clone)]
pub struct Config {
    pub consensus: ConsensusConfig,
    pub trend: TrendConfig,
    pub weights: WeightTable,
    pub session: SessionHours,
    pub scheduler: SchedulerConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub bars_file: String,
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub health_report_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Ok(Self::from_lookup(|key| env::var(key).ok())?)
    }

    /// Builds the config from any key lookup. Tunables fall back to defaults when
    /// unparseable; the weight table, trend windows and session hours must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |key: &str, default: f64| parse_or(&lookup, key, default);

        let defaults = ConsensusConfig::default();
        let risk_defaults = RiskBands::default();
        let timeout_ms: u64 = parse_or(&lookup, "AGENT_TIMEOUT_MS", 0);

        let consensus = ConsensusConfig {
            strong_threshold: num("CONSENSUS_STRONG_THRESHOLD", defaults.strong_threshold),
            moderate_threshold: num("CONSENSUS_MODERATE_THRESHOLD", defaults.moderate_threshold),
            moderate_discount: num("CONSENSUS_MODERATE_DISCOUNT", defaults.moderate_discount),
            fallback_confidence: num("CONSENSUS_FALLBACK_CONFIDENCE", defaults.fallback_confidence),
            strong_trend_strength: num("TREND_STRONG_STRENGTH", defaults.strong_trend_strength),
            moderate_trend_strength: num("TREND_MODERATE_STRENGTH", defaults.moderate_trend_strength),
            strong_aligned_boost: num("TREND_STRONG_ALIGNED_BOOST", defaults.strong_aligned_boost),
            strong_aligned_cap: num("TREND_STRONG_ALIGNED_CAP", defaults.strong_aligned_cap),
            strong_opposed_penalty: num("TREND_STRONG_OPPOSED_PENALTY", defaults.strong_opposed_penalty),
            counter_trend_floor: num("COUNTER_TREND_FLOOR", defaults.counter_trend_floor),
            counter_trend_confidence: num("COUNTER_TREND_CONFIDENCE", defaults.counter_trend_confidence),
            moderate_aligned_boost: num("TREND_MODERATE_ALIGNED_BOOST", defaults.moderate_aligned_boost),
            moderate_aligned_cap: num("TREND_MODERATE_ALIGNED_CAP", defaults.moderate_aligned_cap),
            moderate_opposed_penalty: num("TREND_MODERATE_OPPOSED_PENALTY", defaults.moderate_opposed_penalty),
            risk: RiskBands {
                low_above: num("RISK_LOW_ABOVE", risk_defaults.low_above),
                medium_above: num("RISK_MEDIUM_ABOVE", risk_defaults.medium_above),
            },
            agent_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        };
        consensus.validate()?;

        let trend_defaults = TrendConfig::default();
        let trend = TrendConfig {
            windows: match lookup("TREND_WINDOWS") {
                Some(raw) => parse_windows(&raw)?,
                None => trend_defaults.windows,
            },
            rsi_period: parse_or(&lookup, "TREND_RSI_PERIOD", trend_defaults.rsi_period),
            rsi_bullish: num("TREND_RSI_BULLISH", trend_defaults.rsi_bullish),
            rsi_bearish: num("TREND_RSI_BEARISH", trend_defaults.rsi_bearish),
            volume_lookback: parse_or(&lookup, "TREND_VOLUME_LOOKBACK", trend_defaults.volume_lookback),
            volume_multiple: num("TREND_VOLUME_MULTIPLE", trend_defaults.volume_multiple),
            volume_amplification: num("TREND_VOLUME_AMPLIFICATION", trend_defaults.volume_amplification),
        };
        trend.validate()?;

        let weights = match lookup("AGENT_WEIGHTS") {
            Some(raw) => raw.parse::<WeightTable>()?,
            None => WeightTable::new(DEFAULT_WEIGHTS.iter().copied())?,
        };

        let session_defaults = SessionHours::default();
        let session = SessionHours::new(
            parse_time(&lookup, "SESSION_OPEN_UTC", session_defaults.open)?,
            parse_time(&lookup, "SESSION_CLOSE_UTC", session_defaults.close)?,
        );
        if session.open >= session.close {
            return Err(ConfigError::MalformedSetting {
                key: "SESSION_OPEN_UTC",
                value: session.open.to_string(),
            });
        }

        Ok(Config {
            consensus,
            trend,
            weights,
            session,
            scheduler: SchedulerConfig {
                interval: Duration::from_secs(parse_or(&lookup, "EVALUATION_INTERVAL_SECS", 60u64).max(1)),
                bars_file: lookup("BARS_FILE").unwrap_or_else(|| "data/snapshot.json".to_string()),
            },
            monitoring: MonitoringConfig {
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                health_report_interval: Duration::from_secs(
                    parse_or(&lookup, "HEALTH_REPORT_SECS", 300u64).max(1),
                ),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("⚠️  Ignoring unparseable {}=`{}`, using default", key, raw);
        default
    })
}

fn parse_time<F>(lookup: &F, key: &'static str, default: NaiveTime) -> Result<NaiveTime, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| ConfigError::MalformedSetting {
            key,
            value: raw,
        }),
        None => Ok(default),
    }
}

/// `length:weight` pairs, e.g. `20:1,50:2,100:3`.
fn parse_windows(raw: &str) -> Result<Vec<TrendWindow>, ConfigError> {
    let malformed = || ConfigError::MalformedSetting {
        key: "TREND_WINDOWS",
        value: raw.to_string(),
    };

    let windows = raw
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| -> Result<TrendWindow, ConfigError> {
            let (length, weight) = w.split_once(':').ok_or_else(malformed)?;
            let length: usize = length.trim().parse().map_err(|_| malformed())?;
            let weight: u32 = weight.trim().parse().map_err(|_| malformed())?;
            if length < 2 || weight == 0 {
                return Err(malformed());
            }
            Ok(TrendWindow { length, weight })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if windows.is_empty() {
        return Err(malformed());
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.consensus, ConsensusConfig::default());
        assert_eq!(config.trend, TrendConfig::default());
        assert_eq!(config.weights.weight_of("technical"), 2);
        assert_eq!(config.weights.weight_of("session_timing"), 1);
        assert_eq!(config.scheduler.interval, Duration::from_secs(60));
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("CONSENSUS_STRONG_THRESHOLD", "0.6"),
            ("AGENT_WEIGHTS", "technical=5"),
            ("AGENT_TIMEOUT_MS", "250"),
            ("TREND_WINDOWS", "10:1, 30:4"),
            ("SESSION_CLOSE_UTC", "20:00"),
        ]))
        .unwrap();

        assert_eq!(config.consensus.strong_threshold, 0.6);
        assert_eq!(config.consensus.agent_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.weights.weight_of("technical"), 5);
        assert_eq!(config.trend.windows.len(), 2);
        assert_eq!(config.trend.windows[1], TrendWindow { length: 30, weight: 4 });
        assert_eq!(config.session.close, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unparseable_tunable_falls_back_with_warning() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = tracing::subscriber::with_default(subscriber, || {
            Config::from_lookup(lookup(&[
                ("CONSENSUS_MODERATE_DISCOUNT", "lots"),
                ("CONSENSUS_STRONG_THRESHOLD", "0,6"),
            ]))
            .unwrap()
        });
        assert_eq!(config.consensus.moderate_discount, 0.85);
        assert_eq!(config.consensus.strong_threshold, 0.5);

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("CONSENSUS_STRONG_THRESHOLD=`0,6`"));
        assert!(output.contains("CONSENSUS_MODERATE_DISCOUNT=`lots`"));
    }

    #[test]
    fn test_malformed_weights_are_fatal() {
        let err = Config::from_lookup(lookup(&[("AGENT_WEIGHTS", "technical:2")])).unwrap_err();
        assert_eq!(err, ConfigError::MalformedWeightEntry("technical:2".to_string()));
    }

    #[test]
    fn test_inverted_thresholds_are_fatal() {
        let err = Config::from_lookup(lookup(&[("CONSENSUS_MODERATE_THRESHOLD", "0.7")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "moderate_threshold", .. }));
    }

    #[test]
    fn test_degenerate_trend_settings_are_fatal() {
        let err = Config::from_lookup(lookup(&[("TREND_VOLUME_AMPLIFICATION", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "volume_amplification", .. }));

        let err = Config::from_lookup(lookup(&[("TREND_RSI_BULLISH", "40"), ("TREND_RSI_BEARISH", "60")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "rsi_bearish", .. }));

        assert!(Config::from_lookup(lookup(&[("TREND_WINDOWS", "20:3,100:1")])).is_err());
    }

    #[test]
    fn test_malformed_windows_and_session_are_fatal() {
        assert!(Config::from_lookup(lookup(&[("TREND_WINDOWS", "20")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SESSION_OPEN_UTC", "9am")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SESSION_OPEN_UTC", "22:00")])).is_err());
    }
}
