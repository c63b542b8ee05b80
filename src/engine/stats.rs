//! Stats Deriver (component G): per-pair quality/freshness statistics
//! computed from historical data.

use crate::domain::identifier::Granularity;
use crate::domain::model::{Histo, PairExchangeStats};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// `min(env["MINIMAL_DAYS_TO_CONSIDER_EXCHANGE"] ?? 20, 30)`.
pub fn min_days(env_override: Option<u32>) -> u32 {
    env_override.unwrap_or(20).min(30)
}

pub const MAX_RATIO: f64 = 1000.0;

/// Inputs `(id, histoDaily, baseStats?)` -- `id` is unused by the
/// computation itself (kept for call-site symmetry / logging) and
/// `base_stats` carries fields the caller already computed (e.g.
/// `yesterdayVolume`, `historyLoadedAt_*`, `latestDate`) which are
/// merged in verbatim.
pub fn derive_stats(
    histo_daily: &Histo,
    base_stats: PairExchangeStats,
    min_days: u32,
    now: DateTime<Utc>,
) -> PairExchangeStats {
    let days = histo_daily.dated_entries(Granularity::Daily);
    if days.is_empty() {
        return base_stats;
    }

    let today = now.date_naive();
    let oldest = days.iter().map(|(t, _)| t).min().unwrap();
    let oldest_day_ago = (today - oldest.date_naive()).num_days();

    // Walk the 30 most recent closed daily buckets [now-30d, now-1d).
    let window_start = today - ChronoDuration::days(30);
    let window_end = today - ChronoDuration::days(1);

    let mut history_count = 0usize;
    let mut min_rate: Option<f64> = None;
    let mut max_rate: Option<f64> = None;

    if let Some(latest) = histo_daily.latest() {
        history_count += 1;
        min_rate = Some(latest);
        max_rate = Some(latest);
    }

    for (t, rate) in &days {
        let d = t.date_naive();
        if d >= window_start && d <= window_end && *rate > 0.0 {
            history_count += 1;
            min_rate = Some(min_rate.map_or(*rate, |m| m.min(*rate)));
            max_rate = Some(max_rate.map_or(*rate, |m| m.max(*rate)));
        }
    }

    let ratio = match (min_rate, max_rate) {
        (Some(min), Some(max)) => max / min,
        _ => f64::NAN,
    };
    let invalid_ratio = ratio <= 0.0 || !ratio.is_finite();
    if !invalid_ratio && ratio >= MAX_RATIO {
        tracing::warn!(ratio, "ExtremeRatioFound");
    }

    let has_history_for_30_last_days =
        history_count as u32 >= min_days && !invalid_ratio && ratio < MAX_RATIO;
    let has_history_for_1_year = oldest_day_ago > 365;

    PairExchangeStats {
        has_history_for_30_last_days: Some(has_history_for_30_last_days),
        has_history_for_1_year: Some(has_history_for_1_year),
        oldest_day_ago: Some(oldest_day_ago),
        ..base_stats
    }
}

/// Side computation run inside histo refresh: `history[1]` is the
/// second-most-recent point sorted descending by time.
pub fn yesterday_volume(points_sorted_desc: &[crate::domain::model::OhlcvrPoint], now: DateTime<Utc>) -> f64 {
    let Some(second) = points_sorted_desc.get(1) else {
        return 0.0;
    };
    let two_days_ago = now - ChronoDuration::days(2);
    if second.time > two_days_ago && second.time <= now {
        second.volume
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::OhlcvrPoint;

    #[test]
    fn empty_days_is_a_no_op() {
        let histo = Histo::new();
        let base = PairExchangeStats {
            yesterday_volume: Some(5.0),
            ..Default::default()
        };
        let out = derive_stats(&histo, base.clone(), 20, Utc::now());
        assert_eq!(out.has_history_for_30_last_days, None);
        assert_eq!(out.yesterday_volume, Some(5.0));
    }

    #[test]
    fn monotonic_history_yields_non_decreasing_oldest_day_ago() {
        let now = Utc::now();
        let mut histo = Histo::new();
        histo
            .0
            .insert(Granularity::Daily.format_time(now - ChronoDuration::days(5)), 1.0);
        let out1 = derive_stats(&histo, PairExchangeStats::default(), 20, now);

        histo
            .0
            .insert(Granularity::Daily.format_time(now - ChronoDuration::days(10)), 1.0);
        let out2 = derive_stats(&histo, PairExchangeStats::default(), 20, now);

        assert!(out2.oldest_day_ago.unwrap() >= out1.oldest_day_ago.unwrap());
    }

    #[test]
    fn yesterday_volume_within_window() {
        let now = Utc::now();
        let points = vec![
            OhlcvrPoint {
                time: now,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 99.0,
            },
            OhlcvrPoint {
                time: now - ChronoDuration::hours(20),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 5.0,
            },
        ];
        assert_eq!(yesterday_volume(&points, now), 5.0);
    }

    #[test]
    fn yesterday_volume_zero_when_out_of_window() {
        let now = Utc::now();
        let points = vec![
            OhlcvrPoint {
                time: now,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 99.0,
            },
            OhlcvrPoint {
                time: now - ChronoDuration::days(3),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 5.0,
            },
        ];
        assert_eq!(yesterday_volume(&points, now), 0.0);
    }
}
