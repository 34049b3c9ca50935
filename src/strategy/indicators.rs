//! Indicator math over plain slices, oldest value first.
//!
//! Every function returns `None` instead of panicking when the input is too short
//! or a denominator is zero.

pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Full EMA series seeded with the first value.
pub fn ema_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut ema = values[0];
    let mut series = Vec::with_capacity(values.len());
    series.push(ema);

    for value in values.iter().skip(1) {
        ema = (value - ema) * multiplier + ema;
        series.push(ema);
    }

    Some(series)
}

pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period)?.last().copied()
}

pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;

    for i in (values.len() - period)..values.len() {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses += -change;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Standard 12/26/9 MACD when called with those periods.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if fast >= slow || values.len() < slow + signal {
        return None;
    }

    let fast_series = ema_series(values, fast)?;
    let slow_series = ema_series(values, slow)?;

    let macd_line: Vec<f64> = fast_series
        .iter()
        .zip(slow_series.iter())
        .skip(slow - 1)
        .map(|(f, s)| f - s)
        .collect();

    let line = *macd_line.last()?;
    let signal = ema(&macd_line, signal)?;

    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}

/// Returns `(upper, middle, lower)`.
pub fn bollinger_bands(values: &[f64], period: usize, std_dev: f64) -> Option<(f64, f64, f64)> {
    let mean = sma(values, period)?;

    let variance: f64 = values
        .iter()
        .rev()
        .take(period)
        .map(|p| (p - mean).powi(2))
        .sum::<f64>()
        / period as f64;

    let std = variance.sqrt();
    Some((mean + std_dev * std, mean, mean - std_dev * std))
}

/// Latest value over the average of the `period` values before it.
pub fn volume_ratio(volumes: &[f64], period: usize) -> Option<f64> {
    let (latest, history) = volumes.split_last()?;
    let baseline = sma(history, period)?;
    if baseline <= 0.0 {
        return None;
    }

    Some(latest / baseline)
}

/// Percent change between the value `lookback` steps ago and the latest.
pub fn rate_of_change(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || values.len() <= lookback {
        return None;
    }
    let latest = *values.last()?;
    let base = values[values.len() - 1 - lookback];
    if base == 0.0 {
        return None;
    }
    Some((latest - base) / base * 100.0)
}
