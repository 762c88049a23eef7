//! Market data & ticker metadata: the external collaborators `full_analysis`
//! fetches from before fanning out to the analysis modules. Per the core's
//! scope boundary, the data-ingestion scrapers and the persistence schema
//! behind these stores are external; this module defines only the read
//! interface the orchestrator consumes, plus an in-memory implementation that
//! backs local/dev use and the test suite with a deterministic synthetic
//! price walk (seeded from the ticker symbol, so repeated calls for the same
//! ticker are reproducible).

use std::collections::HashMap;

use anyhow::Result;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::technical::Bar;

/// An OHLCV bar history, oldest first.
#[derive(Debug, Clone, Default)]
pub struct OhlcvSeries {
    pub bars: Vec<Bar>,
}

impl OhlcvSeries {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[must_use]
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

/// Price history for a ticker. Daily history is required by `full_analysis`;
/// intraday is only fetched when the request scope calls for it.
pub trait OhlcvStore: Send + Sync {
    fn daily(&self, ticker: &str) -> Result<OhlcvSeries>;
    fn intraday(&self, ticker: &str) -> Result<OhlcvSeries>;
}

/// Ticker existence and sector lookup, built once at construction and
/// immutable thereafter (§5's "Metadata cache ... built once ...
/// immutable thereafter").
pub trait TickerMetadataStore: Send + Sync {
    fn exists(&self, ticker: &str) -> bool;
    fn sector(&self, ticker: &str) -> Option<String>;
    fn all_sectors(&self) -> Vec<String>;
    fn tickers_in_sector(&self, sector: &str) -> Vec<String>;
}

/// Raw article text for a ticker, the input the News NLP Coordinator fans
/// out over. The scraper that produces these is out of scope.
pub trait NewsStore: Send + Sync {
    fn recent_articles(&self, ticker: &str) -> Result<Vec<String>>;
}

/// Deterministic synthetic OHLCV generator: a seeded random walk keyed by the
/// ticker symbol, long enough (300 daily bars, 300 intraday bars) for every
/// indicator window the technical analyzer computes to have enough history.
#[derive(Default)]
pub struct InMemoryOhlcvStore {
    overrides: DashMap<String, (OhlcvSeries, OhlcvSeries)>,
}

impl InMemoryOhlcvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an explicit series for a ticker, bypassing synthetic
    /// generation entirely. Used by tests that need specific bar shapes.
    pub fn set(&self, ticker: &str, daily: OhlcvSeries, intraday: OhlcvSeries) {
        self.overrides
            .insert(ticker.to_uppercase(), (daily, intraday));
    }

    fn synthesize(ticker: &str, count: usize, bar_seconds: i64) -> OhlcvSeries {
        let seed = ticker.bytes().fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(u64::from(b)));
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5bd1_e995);
        let mut price = 50.0 + (seed % 200) as f64;
        let mut bars = Vec::with_capacity(count);
        let start_ts = 1_600_000_000_i64;
        for i in 0..count {
            let drift: f64 = rng.random_range(-0.015..0.015);
            let open = price;
            price = (price * (1.0 + drift)).max(1.0);
            let close = price;
            let spread = (open - close).abs().max(open * 0.002);
            let high = open.max(close) + spread * rng.random_range(0.1..0.6);
            let low = (open.min(close) - spread * rng.random_range(0.1..0.6)).max(0.5);
            let volume = rng.random_range(100_000.0..5_000_000.0);
            bars.push(Bar {
                timestamp: start_ts + i as i64 * bar_seconds,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        OhlcvSeries { bars }
    }
}

impl OhlcvStore for InMemoryOhlcvStore {
    fn daily(&self, ticker: &str) -> Result<OhlcvSeries> {
        let key = ticker.to_uppercase();
        if let Some(entry) = self.overrides.get(&key) {
            return Ok(entry.value().0.clone());
        }
        Ok(Self::synthesize(&key, 400, 86_400))
    }

    fn intraday(&self, ticker: &str) -> Result<OhlcvSeries> {
        let key = ticker.to_uppercase();
        if let Some(entry) = self.overrides.get(&key) {
            return Ok(entry.value().1.clone());
        }
        Ok(Self::synthesize(&key, 300, 300))
    }
}

/// In-memory ticker→sector map, immutable after `new`.
pub struct InMemoryTickerMetadataStore {
    sector_by_ticker: HashMap<String, String>,
    tickers_by_sector: HashMap<String, Vec<String>>,
}

impl InMemoryTickerMetadataStore {
    #[must_use]
    pub fn new(entries: Vec<(&str, &str)>) -> Self {
        let mut sector_by_ticker = HashMap::new();
        let mut tickers_by_sector: HashMap<String, Vec<String>> = HashMap::new();
        for (ticker, sector) in entries {
            let ticker = ticker.to_uppercase();
            sector_by_ticker.insert(ticker.clone(), sector.to_string());
            tickers_by_sector
                .entry(sector.to_string())
                .or_default()
                .push(ticker);
        }
        Self {
            sector_by_ticker,
            tickers_by_sector,
        }
    }

    /// A small built-in universe covering a handful of sectors, enough for
    /// local/dev use and for `preload_all` to have something to warm.
    #[must_use]
    pub fn default_universe() -> Self {
        Self::new(vec![
            ("AAPL", "TECH"),
            ("MSFT", "TECH"),
            ("NVDA", "TECH"),
            ("JPM", "FINANCIALS"),
            ("GS", "FINANCIALS"),
            ("XOM", "ENERGY"),
            ("CVX", "ENERGY"),
            ("JNJ", "HEALTHCARE"),
            ("PFE", "HEALTHCARE"),
            ("WMT", "CONSUMER"),
        ])
    }
}

impl TickerMetadataStore for InMemoryTickerMetadataStore {
    fn exists(&self, ticker: &str) -> bool {
        self.sector_by_ticker.contains_key(&ticker.to_uppercase())
    }

    fn sector(&self, ticker: &str) -> Option<String> {
        self.sector_by_ticker.get(&ticker.to_uppercase()).cloned()
    }

    fn all_sectors(&self) -> Vec<String> {
        let mut sectors: Vec<String> = self.tickers_by_sector.keys().cloned().collect();
        sectors.sort();
        sectors
    }

    fn tickers_in_sector(&self, sector: &str) -> Vec<String> {
        self.tickers_by_sector
            .get(sector)
            .cloned()
            .unwrap_or_default()
    }
}

/// Deterministic stub article feed: two synthetic headlines per ticker,
/// enough for the News NLP Coordinator to have something to analyze without
/// a real scraper wired in.
#[derive(Default)]
pub struct InMemoryNewsStore {
    overrides: DashMap<String, Vec<String>>,
}

impl InMemoryNewsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticker: &str, articles: Vec<String>) {
        self.overrides.insert(ticker.to_uppercase(), articles);
    }
}

impl NewsStore for InMemoryNewsStore {
    fn recent_articles(&self, ticker: &str) -> Result<Vec<String>> {
        let key = ticker.to_uppercase();
        if let Some(entry) = self.overrides.get(&key) {
            return Ok(entry.value().clone());
        }
        Ok(vec![
            format!("{key} beats quarterly earnings expectations, shares rally on strong guidance."),
            format!("Analysts downgrade {key} citing margin pressure and softening demand."),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_series_is_deterministic_for_the_same_ticker() {
        let store = InMemoryOhlcvStore::new();
        let a = store.daily("AAPL").unwrap();
        let b = store.daily("AAPL").unwrap();
        assert_eq!(a.bars.len(), b.bars.len());
        for (x, y) in a.bars.iter().zip(b.bars.iter()) {
            assert_eq!(x.close, y.close);
        }
    }

    #[test]
    fn different_tickers_diverge() {
        let store = InMemoryOhlcvStore::new();
        let a = store.daily("AAPL").unwrap();
        let b = store.daily("MSFT").unwrap();
        assert_ne!(a.bars[0].close, b.bars[0].close);
    }

    #[test]
    fn metadata_store_reports_sector_membership() {
        let store = InMemoryTickerMetadataStore::default_universe();
        assert!(store.exists("aapl"));
        assert_eq!(store.sector("AAPL").as_deref(), Some("TECH"));
        assert!(!store.exists("NOPE"));
        assert!(store.tickers_in_sector("TECH").contains(&"AAPL".to_string()));
    }
}
