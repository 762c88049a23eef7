//! Deterministic selection of backtest evaluation dates: a monthly anchor
//! point per month in range, unioned with "significant points" (volatility
//! spikes, moving-average crosses, RSI threshold crossings) weighted by
//! event-score and recency, with no external calls.

use chrono::{Datelike, NaiveDate};
use rust_ti::standard_indicators::bulk as sti;

use crate::data::OhlcvSeries;

#[derive(Debug, Clone, Copy)]
pub struct SelectorConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub day_of_month: u32,
    pub max_special_points: usize,
    pub volatility_quantile: f64,
    pub recency_weight: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            day_of_month: 1,
            max_special_points: 10,
            volatility_quantile: 0.7,
            recency_weight: 0.3,
        }
    }
}

struct Candidate {
    index: usize,
    event_score: f64,
}

fn bar_date(ts: i64) -> NaiveDate {
    chrono::DateTime::from_timestamp(ts, 0)
        .expect("timestamp in range")
        .date_naive()
}

fn monthly_points(series: &OhlcvSeries, config: &SelectorConfig) -> Vec<usize> {
    let mut points = Vec::new();
    let mut cursor = NaiveDate::from_ymd_opt(config.start.year(), config.start.month(), 1).unwrap();
    while cursor <= config.end {
        let target = cursor
            .with_day(config.day_of_month.min(28))
            .unwrap_or(cursor);
        let best = series
            .bars
            .iter()
            .enumerate()
            .filter(|(_, bar)| {
                let d = bar_date(bar.timestamp);
                d >= config.start && d <= config.end && d.year() == target.year() && d.month() == target.month() && d <= target
            })
            .max_by_key(|(_, bar)| bar.timestamp);
        if let Some((idx, _)) = best {
            points.push(idx);
        }
        cursor = if cursor.month() == 12 {
            NaiveDate::from_ymd_opt(cursor.year() + 1, 1, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(cursor.year(), cursor.month() + 1, 1).unwrap()
        };
    }
    points
}

fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let pos = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[pos.min(sorted.len() - 1)]
}

fn significant_candidates(series: &OhlcvSeries, config: &SelectorConfig) -> Vec<Candidate> {
    let close: Vec<f64> = series.bars.iter().map(|b| b.close).collect();
    let n = close.len();
    let mut candidates = Vec::new();

    if n >= 2 {
        let changes: Vec<f64> = close.windows(2).map(|w| ((w[1] - w[0]) / w[0]).abs()).collect();
        let threshold = quantile(&changes, config.volatility_quantile);
        for (i, change) in changes.iter().enumerate() {
            if *change >= threshold && threshold > 0.0 {
                candidates.push(Candidate { index: i + 1, event_score: 0.7 });
            }
        }
    }

    if n >= 200 {
        let sma50_full = sti::simple_moving_average(&close, 50);
        let sma200_full = sti::simple_moving_average(&close, 200);
        // Both series end at the same bar (the last close); align on the tail
        // so `diffs[k]` compares the two averages as of the same day.
        let len = sma200_full.len();
        let sma50 = &sma50_full[sma50_full.len() - len..];
        let sma200 = &sma200_full[..];
        let offset = n - len;
        for i in 1..len {
            let prev_diff = sma50[i - 1] - sma200[i - 1];
            let curr_diff = sma50[i] - sma200[i];
            if prev_diff.signum() != curr_diff.signum() && prev_diff != 0.0 {
                candidates.push(Candidate { index: offset + i, event_score: 1.0 });
            }
        }
    }

    if n >= 14 {
        let rsi = sti::rsi(&close);
        let offset = n - rsi.len();
        for i in 1..rsi.len() {
            let crossed_up = rsi[i - 1] < 30.0 && rsi[i] >= 30.0;
            let crossed_down = rsi[i - 1] > 70.0 && rsi[i] <= 70.0;
            if crossed_up || crossed_down {
                candidates.push(Candidate { index: offset + i, event_score: 0.8 });
            }
        }
    }

    candidates
}

/// Selects the epoch-second timestamps to backtest `series` against,
/// unioning monthly anchors with the top-scoring significant points.
#[must_use]
pub fn select_points(series: &OhlcvSeries, config: &SelectorConfig) -> Vec<i64> {
    if series.bars.is_empty() {
        return Vec::new();
    }

    let monthly = monthly_points(series, config);
    let mut by_index: std::collections::HashMap<usize, f64> = std::collections::HashMap::new();
    for candidate in significant_candidates(series, config) {
        let entry = by_index.entry(candidate.index).or_insert(candidate.event_score);
        if candidate.event_score > *entry {
            *entry = candidate.event_score;
        }
    }

    let n = series.bars.len().max(2);
    let mut scored: Vec<(usize, f64)> = by_index
        .into_iter()
        .map(|(idx, event_score)| {
            let normalized_date = idx as f64 / (n - 1) as f64;
            let final_score = event_score * (1.0 + config.recency_weight * normalized_date);
            (idx, final_score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.truncate(config.max_special_points);

    let mut indices: std::collections::BTreeSet<usize> = monthly.into_iter().collect();
    indices.extend(scored.into_iter().map(|(idx, _)| idx));

    let mut timestamps: Vec<i64> = indices
        .into_iter()
        .filter_map(|idx| series.bars.get(idx))
        .map(|bar| bar.timestamp)
        .filter(|ts| {
            let d = bar_date(*ts);
            d >= config.start && d <= config.end
        })
        .collect();
    timestamps.sort_unstable();
    timestamps.dedup();
    timestamps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technical::Bar;

    fn series_with_bars(n: usize, start_ts: i64) -> OhlcvSeries {
        let mut bars = Vec::with_capacity(n);
        let mut price = 100.0;
        for i in 0..n {
            price += if i % 7 == 0 { 3.0 } else { -0.2 };
            bars.push(Bar {
                timestamp: start_ts + i as i64 * 86_400,
                open: price,
                high: price + 1.0,
                low: price - 1.0,
                close: price,
                volume: 1_000_000.0,
            });
        }
        OhlcvSeries { bars }
    }

    #[test]
    fn empty_series_yields_no_points() {
        let config = SelectorConfig::default();
        let series = OhlcvSeries::default();
        assert!(select_points(&series, &config).is_empty());
    }

    #[test]
    fn selected_points_are_sorted_distinct_and_in_range() {
        let config = SelectorConfig {
            start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
            ..SelectorConfig::default()
        };
        let start_ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        let series = series_with_bars(300, start_ts);
        let points = select_points(&series, &config);
        assert!(!points.is_empty());
        let mut sorted = points.clone();
        sorted.sort_unstable();
        assert_eq!(points, sorted);
        let mut deduped = points.clone();
        deduped.dedup();
        assert_eq!(points.len(), deduped.len());
    }
}
