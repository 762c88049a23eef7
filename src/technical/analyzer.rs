//! Pure numeric technical analysis over an OHLCV price series: indicator
//! snapshot, multi-horizon trend view, support/resistance levels, and a
//! short list of pattern matches. Offloaded to a blocking thread by the
//! caller since every computation here is CPU-bound and synchronous.

use rust_ti::{ConstantModelType, DeviationModel};
use serde_json::{json, Map, Value};

use crate::model::report::{
    Direction, PatternReport, PatternSentiment, PatternType, SrLevel, SrLevels, Strength,
    TechnicalSubReport, Trend, TrendView,
};

/// One bar of OHLCV history, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Computes a `TechnicalSubReport` for one timeframe (daily or intraday) from
/// its bar history, oldest first.
pub struct TechAnalyzer;

impl TechAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// `bars` must be sorted oldest-first. Fewer than 2 bars yields a report
    /// with every section at its "undefined"/empty default rather than an
    /// error -- the caller decides whether that's acceptable.
    #[must_use]
    pub fn analyze(&self, bars: &[Bar]) -> TechnicalSubReport {
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let low: Vec<f64> = bars.iter().map(|b| b.low).collect();

        TechnicalSubReport {
            key_indicators: key_indicators(&close, &high, &low),
            trend: trend_view(&close),
            sr_levels: sr_levels(bars),
            patterns: patterns(bars),
        }
    }
}

impl Default for TechAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn last_finite(values: &[f64]) -> Option<f64> {
    values.iter().rev().find(|v| v.is_finite()).copied()
}

fn key_indicators(close: &[f64], high: &[f64], low: &[f64]) -> Map<String, Value> {
    use rust_ti::standard_indicators::bulk as sti;

    let mut out = Map::new();
    let n = close.len();

    insert_opt(&mut out, "rsi_14", (n >= 14).then(|| last_finite(&sti::rsi(close))).flatten());

    if n >= 34 {
        let macd = sti::macd(close);
        insert_opt(&mut out, "macd", macd.last().map(|t| t.0));
        insert_opt(&mut out, "macd_signal", macd.last().map(|t| t.1));
        insert_opt(&mut out, "macd_histogram", macd.last().map(|t| t.2));
    }

    for period in [20_usize, 50, 200] {
        if n >= period {
            let sma = sti::simple_moving_average(close, period);
            insert_opt(&mut out, &format!("sma_{period}"), last_finite(&sma));
            let ema = sti::exponential_moving_average(close, period);
            insert_opt(&mut out, &format!("ema_{period}"), last_finite(&ema));
        }
    }

    if n >= 20 {
        let bands = rust_ti::candle_indicators::bulk::moving_constant_bands(
            close,
            ConstantModelType::SimpleMovingAverage,
            DeviationModel::StandardDeviation,
            2.0,
            20,
        );
        insert_opt(&mut out, "bollinger_lower", bands.last().map(|t| t.0));
        insert_opt(&mut out, "bollinger_mid", bands.last().map(|t| t.1));
        insert_opt(&mut out, "bollinger_upper", bands.last().map(|t| t.2));
    }

    if n >= 14 {
        let atr = (0..=n - 14)
            .map(|i| {
                let end = i + 14;
                rust_ti::other_indicators::single::average_true_range(
                    &close[i..end],
                    &high[i..end],
                    &low[i..end],
                    ConstantModelType::SimpleMovingAverage,
                )
            })
            .last();
        insert_opt(&mut out, "atr_14", atr);
    }

    if n >= 15 {
        let aroon = rust_ti::trend_indicators::single::aroon_indicator(
            &high[n - 15..],
            &low[n - 15..],
        );
        insert_opt(&mut out, "aroon_oscillator", Some(aroon.2));
    }

    if n >= 14 {
        let stoch = rust_ti::momentum_indicators::single::stochastic_oscillator(&close[n - 14..]);
        insert_opt(&mut out, "stochastic_k", Some(stoch));
    }

    out
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    let json_value = match value {
        Some(v) if v.is_finite() => json!(v),
        _ => Value::Null,
    };
    map.insert(key.to_string(), json_value);
}

/// Direction/strength from how far the last close sits from a moving
/// average, expressed as a percentage of that average.
fn view_from_ma(close: &[f64], period: usize) -> TrendView {
    if close.len() < period {
        return TrendView {
            direction: Direction::Undefined,
            strength: Strength::Undefined,
            evidence: Map::new(),
        };
    }
    let ma = rust_ti::standard_indicators::bulk::simple_moving_average(close, period);
    let Some(ma_value) = last_finite(&ma) else {
        return TrendView {
            direction: Direction::Undefined,
            strength: Strength::Undefined,
            evidence: Map::new(),
        };
    };
    let last_close = *close.last().expect("non-empty");
    let pct_distance = (last_close - ma_value) / ma_value * 100.0;

    let direction = if pct_distance > 0.0 {
        Direction::Uptrend
    } else if pct_distance < 0.0 {
        Direction::Downtrend
    } else {
        Direction::Undefined
    };
    let strength = match pct_distance.abs() {
        d if d >= 5.0 => Strength::Strong,
        d if d >= 1.5 => Strength::Moderate,
        d if d > 0.0 => Strength::Weak,
        _ => Strength::Undefined,
    };

    let mut evidence = Map::new();
    evidence.insert(format!("sma_{period}"), json!(ma_value));
    evidence.insert("last_close".to_string(), json!(last_close));
    evidence.insert("pct_distance".to_string(), json!(pct_distance));

    TrendView {
        direction,
        strength,
        evidence,
    }
}

fn trend_view(close: &[f64]) -> Trend {
    Trend {
        short: view_from_ma(close, 20),
        mid: view_from_ma(close, 50),
        long: view_from_ma(close, 200),
    }
}

/// Local extrema over a centered window as a cheap, deterministic stand-in
/// for a proper pivot/fractal detector: a bar is a support candidate if its
/// low is the minimum within `WINDOW` bars either side, a resistance
/// candidate under the symmetric rule for highs.
fn sr_levels(bars: &[Bar]) -> SrLevels {
    const WINDOW: usize = 5;
    const MAX_LEVELS: usize = 5;

    let n = bars.len();
    let mut supports = Vec::new();
    let mut resistances = Vec::new();

    if n > WINDOW * 2 {
        for i in WINDOW..n - WINDOW {
            let window = &bars[i - WINDOW..=i + WINDOW];
            if window.iter().all(|b| b.low >= bars[i].low) {
                supports.push(SrLevel {
                    level: bars[i].low,
                    source: "pivot_low".to_string(),
                });
            }
            if window.iter().all(|b| b.high <= bars[i].high) {
                resistances.push(SrLevel {
                    level: bars[i].high,
                    source: "pivot_high".to_string(),
                });
            }
        }
    }

    supports.sort_by(|a, b| b.level.total_cmp(&a.level));
    supports.dedup_by(|a, b| (a.level - b.level).abs() < f64::EPSILON);
    supports.truncate(MAX_LEVELS);

    resistances.sort_by(|a, b| a.level.total_cmp(&b.level));
    resistances.dedup_by(|a, b| (a.level - b.level).abs() < f64::EPSILON);
    resistances.truncate(MAX_LEVELS);

    SrLevels {
        supports,
        resistances,
    }
}

/// A small, deterministic pattern scan: one candlestick pattern (bullish/
/// bearish engulfing on the last two bars) and one chart pattern (golden/
/// death cross on SMA50 vs SMA200).
fn patterns(bars: &[Bar]) -> Vec<PatternReport> {
    let mut found = Vec::new();

    if bars.len() >= 2 {
        let prev = &bars[bars.len() - 2];
        let last = &bars[bars.len() - 1];
        let prev_bearish = prev.close < prev.open;
        let last_bullish = last.close > last.open;
        let engulfs = last.open <= prev.close && last.close >= prev.open;
        if prev_bearish && last_bullish && engulfs {
            found.push(PatternReport {
                name: "bullish_engulfing".to_string(),
                pattern_type: PatternType::Candlestick,
                sentiment: PatternSentiment::Bullish,
                score: 70.0,
                evidence: candle_evidence(prev, last),
                evidence_date: chrono::DateTime::from_timestamp(last.timestamp, 0)
                    .unwrap_or_else(chrono::Utc::now),
            });
        }
        let prev_bullish = prev.close > prev.open;
        let last_bearish = last.close < last.open;
        let engulfs_down = last.open >= prev.close && last.close <= prev.open;
        if prev_bullish && last_bearish && engulfs_down {
            found.push(PatternReport {
                name: "bearish_engulfing".to_string(),
                pattern_type: PatternType::Candlestick,
                sentiment: PatternSentiment::Bearish,
                score: 70.0,
                evidence: candle_evidence(prev, last),
                evidence_date: chrono::DateTime::from_timestamp(last.timestamp, 0)
                    .unwrap_or_else(chrono::Utc::now),
            });
        }
    }

    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if close.len() >= 200 {
        let sma50 = rust_ti::standard_indicators::bulk::simple_moving_average(&close, 50);
        let sma200 = rust_ti::standard_indicators::bulk::simple_moving_average(&close, 200);
        if let (Some(&fast_last), Some(&fast_prev), Some(&slow_last), Some(&slow_prev)) = (
            sma50.last(),
            sma50.get(sma50.len().wrapping_sub(2)),
            sma200.last(),
            sma200.get(sma200.len().wrapping_sub(2)),
        ) {
            let mut evidence = Map::new();
            evidence.insert("sma_50".to_string(), json!(fast_last));
            evidence.insert("sma_200".to_string(), json!(slow_last));
            let last_bar_date = bars
                .last()
                .map(|b| chrono::DateTime::from_timestamp(b.timestamp, 0).unwrap_or_else(chrono::Utc::now))
                .unwrap_or_else(chrono::Utc::now);
            if fast_last > slow_last && fast_prev <= slow_prev {
                found.push(PatternReport {
                    name: "golden_cross".to_string(),
                    pattern_type: PatternType::Chart,
                    sentiment: PatternSentiment::Bullish,
                    score: 85.0,
                    evidence,
                    evidence_date: last_bar_date,
                });
            } else if fast_last < slow_last && fast_prev >= slow_prev {
                found.push(PatternReport {
                    name: "death_cross".to_string(),
                    pattern_type: PatternType::Chart,
                    sentiment: PatternSentiment::Bearish,
                    score: 85.0,
                    evidence,
                    evidence_date: last_bar_date,
                });
            }
        }
    }

    found.sort_by(|a, b| b.score.total_cmp(&a.score));
    found
}

fn candle_evidence(prev: &Bar, last: &Bar) -> Map<String, Value> {
    let mut evidence = Map::new();
    evidence.insert("prev_open".to_string(), json!(prev.open));
    evidence.insert("prev_close".to_string(), json!(prev.close));
    evidence.insert("last_open".to_string(), json!(last.open));
    evidence.insert("last_close".to_string(), json!(last.close));
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: ts,
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
        (0..n as i64)
            .map(|i| bar(i * 86_400, price, price + 1.0, price - 1.0, price))
            .collect()
    }

    #[test]
    fn short_history_yields_undefined_trend_and_empty_key_indicators() {
        let bars = flat_bars(3, 100.0);
        let report = TechAnalyzer::new().analyze(&bars);
        assert_eq!(report.trend.short.direction, Direction::Undefined);
        assert!(report.key_indicators.is_empty());
    }

    #[test]
    fn rising_series_reports_uptrend_short_view() {
        let bars: Vec<Bar> = (0..40_i64)
            .map(|i| {
                let price = 100.0 + i as f64;
                bar(i * 86_400, price, price + 1.0, price - 1.0, price)
            })
            .collect();
        let report = TechAnalyzer::new().analyze(&bars);
        assert_eq!(report.trend.short.direction, Direction::Uptrend);
        assert!(report.key_indicators.contains_key("sma_20"));
    }

    #[test]
    fn bullish_engulfing_is_detected_on_last_two_bars() {
        let mut bars = flat_bars(10, 100.0);
        let len = bars.len();
        bars[len - 2] = bar(0, 101.0, 101.5, 98.0, 99.0);
        bars[len - 1] = bar(1, 98.5, 102.0, 98.0, 101.5);
        let report = TechAnalyzer::new().analyze(&bars);
        assert!(report.patterns.iter().any(|p| p.name == "bullish_engulfing"));
    }

    #[test]
    fn pivot_low_becomes_a_support_level() {
        let mut bars = flat_bars(15, 100.0);
        bars[7].low = 80.0;
        let report = TechAnalyzer::new().analyze(&bars);
        assert!(report.sr_levels.supports.iter().any(|s| s.level == 80.0));
    }
}
