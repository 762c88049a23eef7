//! Technical analysis: turns an OHLCV bar history into the `technical`
//! section of an `AnalysisReport`.

pub mod analyzer;

pub use analyzer::{Bar, TechAnalyzer};
