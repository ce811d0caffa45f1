// src/services/signals.rs
use chrono::NaiveDate;

use crate::models::{IndicatorKind, IndicatorPoint, PriceBar, Signal, SignalAction};
use super::indicators::trailing_std;

/// Thresholds and strength scaling. Crossover gaps are measured against the
/// standard deviation of close over the indicator's own window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalParams {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// RSI points past the threshold per strength step.
    pub rsi_points_per_step: f64,
    pub macd_window: usize,
    /// `|macd - signal| / stddev(close)` per strength step.
    pub macd_gap_per_step: f64,
    pub trix_window: usize,
    /// TRIX gap in price units over `stddev(close)` per strength step.
    pub trix_gap_per_step: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        SignalParams {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_points_per_step: 6.0,
            macd_window: 26,
            macd_gap_per_step: 0.05,
            trix_window: 15,
            trix_gap_per_step: 0.005,
        }
    }
}

/// Derives sparse signals from date-aligned bars and indicator points.
/// Signals are grouped by indicator (RSI, TRIX, MACD), each group in date order.
///
/// # Panics
/// Panics if `bars` and `points` are not the same length.
pub fn generate_signals(bars: &[PriceBar], points: &[IndicatorPoint], params: &SignalParams) -> Vec<Signal> {
    assert_eq!(bars.len(), points.len(), "indicator points must align with price bars");

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mut signals = rsi_signals(points, params);
    signals.extend(crossover_signals(IndicatorKind::Trix, &closes, points, params));
    signals.extend(crossover_signals(IndicatorKind::Macd, &closes, points, params));
    signals
}

fn rsi_signals(points: &[IndicatorPoint], params: &SignalParams) -> Vec<Signal> {
    points
        .iter()
        .filter_map(|p| {
            let rsi = p.rsi?;
            let (action, distance, zone) = if rsi < params.rsi_oversold {
                (SignalAction::Buy, params.rsi_oversold - rsi, "oversold")
            } else if rsi > params.rsi_overbought {
                (SignalAction::Sell, rsi - params.rsi_overbought, "overbought")
            } else {
                return None;
            };
            Some(Signal {
                date: p.date,
                indicator: IndicatorKind::Rsi,
                action,
                reason: format!("RSI {:.1} in {} territory", rsi, zone),
                strength: strength_from_score(distance / params.rsi_points_per_step),
            })
        })
        .collect()
}

fn line_pair(kind: IndicatorKind, p: &IndicatorPoint) -> Option<(f64, f64)> {
    match kind {
        IndicatorKind::Trix => Some((p.trix?, p.trix_signal?)),
        IndicatorKind::Macd => Some((p.macd?, p.macd_signal?)),
        IndicatorKind::Rsi => None,
    }
}

/// Upward cross: line at or below its signal, then strictly above.
pub fn crossover(prev: (f64, f64), cur: (f64, f64)) -> Option<SignalAction> {
    if prev.0 <= prev.1 && cur.0 > cur.1 {
        Some(SignalAction::Buy)
    } else if prev.0 >= prev.1 && cur.0 < cur.1 {
        Some(SignalAction::Sell)
    } else {
        None
    }
}

fn crossover_signals(
    kind: IndicatorKind,
    closes: &[f64],
    points: &[IndicatorPoint],
    params: &SignalParams,
) -> Vec<Signal> {
    let mut out = Vec::new();
    for t in 1..points.len() {
        let (Some(prev), Some(cur)) = (line_pair(kind, &points[t - 1]), line_pair(kind, &points[t])) else {
            continue;
        };
        let Some(action) = crossover(prev, cur) else {
            continue;
        };

        let gap = (cur.0 - cur.1).abs();
        let (gap_in_price, window, per_step) = match kind {
            IndicatorKind::Trix => (gap * closes[t].abs() / 10_000.0, params.trix_window, params.trix_gap_per_step),
            _ => (gap, params.macd_window, params.macd_gap_per_step),
        };
        let score = match trailing_std(closes, t, window) {
            Some(sigma) if sigma > f64::EPSILON => gap_in_price / sigma / per_step,
            _ => 0.0,
        };

        let direction = match action {
            SignalAction::Buy => "above",
            _ => "below",
        };
        out.push(Signal {
            date: points[t].date,
            indicator: kind,
            action,
            reason: format!("{} crossed {} its signal line (gap {:.4})", kind, direction, gap),
            strength: strength_from_score(score),
        });
    }
    out
}

/// Monotonic in `score`, clamped to 1..=5.
pub fn strength_from_score(score: f64) -> u8 {
    (1.0 + score.max(0.0).floor()).min(5.0) as u8
}

/// The action each indicator implies on `date`: its signal there, or HOLD.
pub fn stance_on(signals: &[Signal], date: NaiveDate) -> Vec<(IndicatorKind, SignalAction, u8)> {
    [IndicatorKind::Rsi, IndicatorKind::Trix, IndicatorKind::Macd]
        .into_iter()
        .map(|kind| {
            signals
                .iter()
                .find(|s| s.indicator == kind && s.date == date)
                .map(|s| (kind, s.action, s.strength))
                .unwrap_or((kind, SignalAction::Hold, 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::indicators::{compute_indicators, IndicatorParams};

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(i)
    }

    fn bars(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: day(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 10,
                trading_value: close * 10.0,
                change_rate: 0.0,
            })
            .collect()
    }

    fn point(i: i64, macd: Option<(f64, f64)>) -> IndicatorPoint {
        let mut p = IndicatorPoint::empty(day(i));
        if let Some((line, signal)) = macd {
            p.macd = Some(line);
            p.macd_signal = Some(signal);
        }
        p
    }

    #[test]
    fn strength_is_clamped_and_monotonic() {
        assert_eq!(strength_from_score(-3.0), 1);
        assert_eq!(strength_from_score(0.2), 1);
        assert_eq!(strength_from_score(1.0), 2);
        assert_eq!(strength_from_score(3.9), 4);
        assert_eq!(strength_from_score(40.0), 5);
        assert_eq!(strength_from_score(f64::NAN), 1);
        let mut last = 0;
        for i in 0..100 {
            let s = strength_from_score(i as f64 * 0.1);
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn crossover_detects_both_directions() {
        assert_eq!(crossover((-1.0, 0.0), (1.0, 0.0)), Some(SignalAction::Buy));
        assert_eq!(crossover((0.0, 0.0), (1.0, 0.0)), Some(SignalAction::Buy));
        assert_eq!(crossover((1.0, 0.0), (-1.0, 0.0)), Some(SignalAction::Sell));
        assert_eq!(crossover((1.0, 0.0), (2.0, 0.0)), None);
    }

    #[test]
    fn macd_cross_emits_once_at_the_crossing_date() {
        let closes: Vec<f64> = (0..4).map(|i| 100.0 + i as f64).collect();
        let points = vec![
            point(0, None),
            point(1, Some((-0.5, 0.0))),
            point(2, Some((0.5, 0.0))),
            point(3, Some((0.7, 0.1))),
        ];
        let signals = generate_signals(&bars(&closes), &points, &SignalParams::default());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].indicator, IndicatorKind::Macd);
        assert_eq!(signals[0].action, SignalAction::Buy);
        assert_eq!(signals[0].date, day(2));
    }

    #[test]
    fn no_signal_without_indicator_values() {
        let closes = vec![50.0; 10];
        let points: Vec<IndicatorPoint> = (0..10).map(|i| IndicatorPoint::empty(day(i))).collect();
        assert!(generate_signals(&bars(&closes), &points, &SignalParams::default()).is_empty());
    }

    #[test]
    fn steady_decline_is_oversold() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * (30.0 / 29.0)).collect();
        let b = bars(&closes);
        let points = compute_indicators(&b, &IndicatorParams::default());
        let signals = generate_signals(&b, &points, &SignalParams::default());

        let last_rsi = signals
            .iter()
            .filter(|s| s.indicator == IndicatorKind::Rsi)
            .last()
            .expect("rsi signal");
        assert_eq!(last_rsi.date, day(29));
        assert_eq!(last_rsi.action, SignalAction::Buy);
        assert!(last_rsi.strength > 1);
    }

    #[test]
    fn stance_defaults_to_hold() {
        let signals = vec![Signal {
            date: day(5),
            indicator: IndicatorKind::Macd,
            action: SignalAction::Sell,
            reason: String::new(),
            strength: 3,
        }];
        let stance = stance_on(&signals, day(5));
        assert_eq!(stance[0], (IndicatorKind::Rsi, SignalAction::Hold, 1));
        assert_eq!(stance[2], (IndicatorKind::Macd, SignalAction::Sell, 3));
    }
}
