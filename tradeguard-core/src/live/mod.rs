//! Shadow (paper) execution against a live or replayed tick stream.
//!
//! Shares the backtest's cost model, watchdog, ledger and kill-switch types,
//! so the same interlocks gate both paths.

mod shadow;

pub use shadow::{ParentOrder, ParentOutcome, ShadowConfig, ShadowReport, ShadowSession};
