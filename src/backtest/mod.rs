//! The Backtest Context Manager: deterministic point selection, the external
//! job-service client, and the per-ticker preparation state machine.

pub mod client;
pub mod context;
pub mod point_selector;

pub use client::{BacktestClient, CheckResponse, GenerateResponse, JobStatus};
pub use context::{BacktestContext, BacktestContextManager, BacktestReportStore, ContextState, SharedBacktestContextManager, StubBacktestReportStore};
pub use point_selector::{select_points, SelectorConfig};
