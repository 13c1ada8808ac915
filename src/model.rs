//! Canonical market-data shapes shared across the crate
//!
//! Everything a consumer receives is expressed in these types, regardless of
//! how the venue encodes them on the wire.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency code, normalized to uppercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tradable base/counter currency pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub base: Currency,
    pub counter: Currency,
}

impl Instrument {
    pub fn new(base: &str, counter: &str) -> Self {
        Self {
            base: Currency::new(base),
            counter: Currency::new(counter),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.counter)
    }
}

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

/// A single materialized level in the order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
    /// Number of resting orders at this price, when the venue provides it
    pub count: Option<u32>,
}

/// Materialized order book emitted after each applied update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub instrument: Instrument,
    /// Monotonic per-instrument version; increments on every applied message
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    /// Sorted best-first: highest bid first
    pub bids: Vec<Level>,
    /// Sorted best-first: lowest ask first
    pub asks: Vec<Level>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }
}

/// Trade timestamp, keeping the degraded local-clock fallback distinguishable
///
/// Some venues stamp trades with exchange time; others deliver trades without
/// one and the layer falls back to local receipt time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeTime {
    Exchange(DateTime<Utc>),
    LocalReceipt(DateTime<Utc>),
}

impl TradeTime {
    pub fn value(&self) -> DateTime<Utc> {
        match self {
            TradeTime::Exchange(t) | TradeTime::LocalReceipt(t) => *t,
        }
    }

    pub fn is_exchange(&self) -> bool {
        matches!(self, TradeTime::Exchange(_))
    }
}

/// Which public trade events a subscription observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeType {
    /// A trade that executed
    Executed,
    /// A correction/update to a previously reported trade
    Updated,
}

/// Canonical public trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrade {
    pub instrument: Instrument,
    pub id: String,
    pub price: Decimal,
    pub amount: Decimal,
    /// Aggressor side
    pub side: Side,
    pub timestamp: TradeTime,
}

/// Canonical ticker record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub instrument: Instrument,
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle state of an order reported on the account feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    PartiallyFilled,
    Executed,
    Canceled,
}

/// An order change on the authenticated feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: u64,
    pub instrument: Instrument,
    pub side: Side,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub status: OrderStatus,
}

/// A fill on the authenticated feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTrade {
    pub id: u64,
    pub order_id: u64,
    pub instrument: Instrument,
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A wallet balance for one currency
///
/// `available` is absent when the venue has emitted a raw delta before
/// computing the spendable figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: Currency,
    pub wallet: String,
    pub total: Decimal,
    pub available: Option<Decimal>,
}

/// Authentication session state, mirrored read-only from the auth collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Failed,
}
