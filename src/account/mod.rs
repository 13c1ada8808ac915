//! Authenticated account streams and balance refresh
//!
//! Order changes, the session's own fills, and balance changes are gated on
//! session authentication; order and trade activity feeds the coalescing
//! balance refresh scheduler.

mod gate;
mod refresh;

pub use gate::{AuthGate, BalanceStream, OrderStream, UserTradeStream};
pub use refresh::{RefreshHandle, RefreshOutcome, RefreshScheduler};
