// src/services/indicators.rs
use log::debug;
use crate::models::{IndicatorPoint, PriceBar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub rsi_length: usize,
    pub trix_length: usize,
    pub trix_signal: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            rsi_length: 14,
            trix_length: 15,
            trix_signal: 9,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Computes RSI, TRIX and MACD for every bar. The output is date-aligned with
/// `bars`; values stay `None` until each indicator has enough history.
///
/// # Panics
/// Panics if bar dates are not strictly increasing.
pub fn compute_indicators(bars: &[PriceBar], params: &IndicatorParams) -> Vec<IndicatorPoint> {
    assert!(
        bars.windows(2).all(|w| w[0].date < w[1].date),
        "price bars must be strictly ascending by date"
    );

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let rsi = rsi(&closes, params.rsi_length);
    let (trix, trix_signal) = trix(&closes, params.trix_length, params.trix_signal);
    let macd = macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal);

    debug!(
        "Computed indicators over {} bars (first RSI at {:?}, first MACD signal at {:?})",
        bars.len(),
        rsi.iter().position(Option::is_some),
        macd.signal.iter().position(Option::is_some)
    );

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorPoint {
            date: bar.date,
            rsi: rsi[i],
            trix: trix[i],
            trix_signal: trix_signal[i],
            macd: macd.line[i],
            macd_signal: macd.signal[i],
            macd_histogram: macd.histogram[i],
        })
        .collect()
}

/// Wilder-smoothed RSI. The first `length` points are `None`; the seed is the
/// simple average of the first `length` gains and losses.
pub fn rsi(closes: &[f64], length: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if length == 0 || closes.len() <= length {
        return out;
    }

    let n = length as f64;
    let (mut avg_gain, mut avg_loss) = (1..=length).fold((0.0, 0.0), |(g, l), i| {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });
    avg_gain /= n;
    avg_loss /= n;
    out[length] = Some(rsi_value(avg_gain, avg_loss));

    for i in (length + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// EMA seeded with the simple average of the first `period` values,
/// smoothing factor `2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    for (i, value) in values.iter().enumerate().skip(period) {
        prev = (value - prev) * k + prev;
        out[i] = Some(prev);
    }
    out
}

/// EMA over a series with a leading run of `None`s. Only the contiguous run
/// of values after the first `Some` is smoothed.
fn ema_after_warmup(series: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    let Some(start) = series.iter().position(Option::is_some) else {
        return out;
    };

    let dense: Vec<f64> = series[start..].iter().map_while(|v| *v).collect();
    for (offset, value) in ema(&dense, period).into_iter().enumerate() {
        out[start + offset] = value;
    }
    out
}

/// TRIX: one-period rate of change of a triple EMA, scaled by 10,000, plus
/// an EMA signal line. Reported from bar index `3 * length - 1` onward.
pub fn trix(closes: &[f64], length: usize, signal: usize) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = closes.len();
    let mut line = vec![None; n];
    if length == 0 || n < 3 * length {
        return (line, vec![None; n]);
    }

    let first = ema(closes, length);
    let second = ema_after_warmup(&first, length);
    let third = ema_after_warmup(&second, length);

    for t in (3 * length - 1)..n {
        if let (Some(cur), Some(prev)) = (third[t], third[t - 1]) {
            // abs() keeps the sign of the change when the input is negated
            if prev != 0.0 {
                line[t] = Some((cur - prev) / prev.abs() * 10_000.0);
            }
        }
    }

    let signal_line = ema_after_warmup(&line, signal);
    (line, signal_line)
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let signal_line = ema_after_warmup(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Population standard deviation of the `window` values ending at `end`
/// (inclusive). `None` while fewer than `window` values exist.
pub fn trailing_std(values: &[f64], end: usize, window: usize) -> Option<f64> {
    if window == 0 || end >= values.len() || end + 1 < window {
        return None;
    }
    let slice = &values[end + 1 - window..=end];
    let mean = slice.iter().sum::<f64>() / window as f64;
    let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window as f64;
    Some(var.max(0.0).sqrt())
}
