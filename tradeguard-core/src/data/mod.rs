//! Market data access: the feed abstraction and the point-in-time gate.
//!
//! Everything the engine hands to a strategy passes through
//! [`PointInTimeGate`] first. Feeds are trusted to filter by the requested
//! range but are not trusted to be right about it.

pub mod feed;
pub mod gate;

pub use feed::{DataError, InMemoryFeed, MarketDataFeed, TickStream};
pub use gate::{check_ordered, Gated, GatingPolicy, PointInTimeGate, Timestamped};
