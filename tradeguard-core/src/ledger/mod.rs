//! PortfolioLedger: single-writer store of cash, positions, equity curve
//! and the append-only trade log.

mod book;
mod summary;

pub use book::{LedgerError, PortfolioLedger};
pub use summary::{EquityPoint, PortfolioSummary};
