//! Normalized streaming layer over a raw venue WebSocket feed
//!
//! The raw feed interleaves messages for many logical channels over one
//! connection. This crate demultiplexes them into typed per-topic streams,
//! reconstructs incremental order books, normalizes trades and tickers into
//! canonical shapes, and gates account-scoped streams on authentication.
//!
//! [`StreamingClient`] is the entry point; everything below it is exposed for
//! composition and for plugging in venue-specific pieces (a custom
//! [`envelope::EnvelopeDecoder`] or [`transport::Transport`]).

pub mod account;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod model;
pub mod mux;
pub mod normalize;
pub mod orderbook;
pub mod transport;

pub use client::StreamingClient;
pub use config::{Capabilities, Config, StalePolicy};
pub use error::{Result, StreamError};
pub use model::{
    AuthState, Balance, Currency, Instrument, Level, NormalizedTrade, OrderBook, OrderStatus,
    OrderUpdate, Side, Ticker, TradeTime, TradeType, UserTrade,
};
