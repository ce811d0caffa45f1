// tests/properties.rs
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use stock_report::models::{IndicatorKind, NewsArticle, PriceBar, Signal, SignalAction};
use stock_report::services::indicators::{compute_indicators, rsi, IndicatorParams};
use stock_report::services::news_dedup::{dedup_news, title_similarity, DedupOptions};
use stock_report::services::signals::{crossover, generate_signals, strength_from_score, SignalParams};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

fn bars(closes: &[f64]) -> Vec<PriceBar> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
            trading_value: close * 100.0,
            change_rate: 0.0,
        })
        .collect()
}

fn crossovers(closes: &[f64]) -> Vec<Signal> {
    let bars = bars(closes);
    let points = compute_indicators(&bars, &IndicatorParams::default());
    generate_signals(&bars, &points, &SignalParams::default())
        .into_iter()
        .filter(|s| s.indicator != IndicatorKind::Rsi)
        .collect()
}

fn wave_strategy() -> impl Strategy<Value = Vec<f64>> {
    (1_000.0f64..100_000.0, 0.01f64..0.45, 5.0f64..40.0, 60usize..200).prop_map(|(base, swing, period, n)| {
        (0..n)
            .map(|i| base * (1.0 + swing * (i as f64 * std::f64::consts::TAU / period).sin()))
            .collect()
    })
}

const WORDS: [&str; 8] = ["samsung", "chip", "record", "profit", "strike", "dividend", "kospi", "hbm"];

fn article_strategy() -> impl Strategy<Value = NewsArticle> {
    (
        prop::collection::vec(0..WORDS.len(), 1..5),
        0i64..6_000,
        0u32..40,
    )
        .prop_map(|(words, hours_ago, link_id)| NewsArticle {
            title: words.iter().map(|&w| WORDS[w]).collect::<Vec<_>>().join(" "),
            link: format!("https://news.example.com/{}", link_id),
            source: "wire".to_string(),
            published_at: now() - Duration::hours(hours_ago),
            summary: None,
        })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn rsi_stays_within_bounds(closes in prop::collection::vec(1.0f64..200_000.0, 1..120)) {
        for value in rsi(&closes, 14).into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn signal_strength_is_always_one_to_five(closes in prop::collection::vec(1_000.0f64..100_000.0, 2..150)) {
        let bars = bars(&closes);
        let points = compute_indicators(&bars, &IndicatorParams::default());
        for signal in generate_signals(&bars, &points, &SignalParams::default()) {
            prop_assert!((1..=5).contains(&signal.strength));
            prop_assert!(signal.action != SignalAction::Hold);
        }
    }

    #[test]
    fn strength_is_monotonic(a in -10.0f64..50.0, b in -10.0f64..50.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(strength_from_score(lo) <= strength_from_score(hi));
    }

    #[test]
    fn crossover_is_antisymmetric(a in -5.0f64..5.0, b in -5.0f64..5.0, c in -5.0f64..5.0, d in -5.0f64..5.0) {
        let up = crossover((a, b), (c, d));
        let down = crossover((-a, -b), (-c, -d));
        match up {
            Some(SignalAction::Buy) => prop_assert_eq!(down, Some(SignalAction::Sell)),
            Some(SignalAction::Sell) => prop_assert_eq!(down, Some(SignalAction::Buy)),
            _ => prop_assert_eq!(down, None),
        }
    }

    #[test]
    fn negated_closes_mirror_every_crossover(closes in wave_strategy()) {
        let negated: Vec<f64> = closes.iter().map(|c| -c).collect();
        let up = crossovers(&closes);
        let down = crossovers(&negated);
        prop_assert_eq!(up.len(), down.len());
        for (a, b) in up.iter().zip(&down) {
            prop_assert_eq!(a.date, b.date);
            prop_assert_eq!(a.indicator, b.indicator);
            prop_assert_eq!(a.strength, b.strength);
            let mirrored = match a.action {
                SignalAction::Buy => SignalAction::Sell,
                SignalAction::Sell => SignalAction::Buy,
                SignalAction::Hold => SignalAction::Hold,
            };
            prop_assert_eq!(b.action, mirrored);
        }
    }

    #[test]
    fn similarity_is_symmetric_and_bounded(a in "[a-z ,.!]{0,30}", b in "[a-z ,.!]{0,30}") {
        let ab = title_similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((ab - title_similarity(&b, &a)).abs() < 1e-12);
        prop_assert_eq!(title_similarity(&a, &a), 1.0);
    }

    #[test]
    fn dedup_is_idempotent(articles in prop::collection::vec(article_strategy(), 0..30)) {
        let options = DedupOptions::default();
        let once = dedup_news(articles, now(), &options);
        let twice = dedup_news(once.clone(), now(), &options);
        prop_assert!(once.len() <= options.cap);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn dedup_ignores_input_order(
        (articles, shuffled) in prop::collection::vec(article_strategy(), 0..30)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let options = DedupOptions::default();
        prop_assert_eq!(
            dedup_news(articles, now(), &options),
            dedup_news(shuffled, now(), &options)
        );
    }
}
