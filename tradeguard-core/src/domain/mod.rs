//! Domain types for the simulation core.

pub mod bar;
pub mod decision;
pub mod fill;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::{Bar, NewsItem, Tick};
pub use decision::{Action, Decision, DecisionError};
pub use fill::Fill;
pub use order::{Order, OrderId, OrderSide};
pub use position::Position;
pub use trade::ClosedTrade;

/// Ticker symbol type alias
pub type Ticker = String;
