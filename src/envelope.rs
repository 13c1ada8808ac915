//! Typed message envelopes and the wire-shape classifier
//!
//! The transport delivers raw JSON frames already tagged with a channel id.
//! This module turns them into typed envelopes. Venues often distinguish a
//! snapshot from an incremental update structurally (array-of-arrays vs flat
//! array) rather than with an explicit tag, so classification is driven by
//! the subscription's [`ChannelKey`] and the message shape, never by guessing.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{Result, StreamError};
use crate::model::{Currency, Instrument, OrderStatus, Side, TradeType};

/// Logical subscription topic kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    OrderBook,
    Trades,
    Ticker,
    Orders,
    UserTrades,
    Balances,
}

impl ChannelKind {
    /// Account-scoped kinds are only deliverable once authenticated
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            ChannelKind::Orders | ChannelKind::UserTrades | ChannelKind::Balances
        )
    }
}

/// Per-subscription options that are part of the identity of a channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChannelOptions {
    pub depth: Option<usize>,
    pub trade_type: Option<TradeType>,
}

/// Uniquely identifies one logical subscription
///
/// Two requests with equal keys share the same underlying wire subscription.
/// Account channels carry no instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub kind: ChannelKind,
    pub instrument: Option<Instrument>,
    pub options: ChannelOptions,
}

impl ChannelKey {
    pub fn order_book(instrument: Instrument, depth: Option<usize>) -> Self {
        Self {
            kind: ChannelKind::OrderBook,
            instrument: Some(instrument),
            options: ChannelOptions {
                depth,
                trade_type: None,
            },
        }
    }

    pub fn trades(instrument: Instrument, trade_type: TradeType) -> Self {
        Self {
            kind: ChannelKind::Trades,
            instrument: Some(instrument),
            options: ChannelOptions {
                depth: None,
                trade_type: Some(trade_type),
            },
        }
    }

    pub fn ticker(instrument: Instrument) -> Self {
        Self {
            kind: ChannelKind::Ticker,
            instrument: Some(instrument),
            options: ChannelOptions::default(),
        }
    }

    pub fn orders() -> Self {
        Self {
            kind: ChannelKind::Orders,
            instrument: None,
            options: ChannelOptions::default(),
        }
    }

    pub fn user_trades() -> Self {
        Self {
            kind: ChannelKind::UserTrades,
            instrument: None,
            options: ChannelOptions::default(),
        }
    }

    pub fn balances() -> Self {
        Self {
            kind: ChannelKind::Balances,
            instrument: None,
            options: ChannelOptions::default(),
        }
    }
}

/// One price level carried by a book snapshot or update
///
/// `amount == 0` removes the level from its side.
#[derive(Debug, Clone, PartialEq)]
pub struct BookEntry {
    pub side: Side,
    pub price: Decimal,
    pub amount: Decimal,
    pub count: Option<u32>,
}

/// Full-state book message establishing a baseline
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub entries: Vec<BookEntry>,
}

/// Incremental book message expressing deltas against the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub entries: Vec<BookEntry>,
}

/// Raw public trade as carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: u64,
    pub price: Decimal,
    pub amount: Decimal,
    pub side: Side,
    /// Absent when the venue does not stamp trades itself
    pub exchange_time: Option<DateTime<Utc>>,
    pub trade_type: TradeType,
}

/// Raw ticker as carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRecord {
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: Decimal,
    pub exchange_time: Option<DateTime<Utc>>,
}

/// Raw order change on the authenticated feed
///
/// `id == 0` marks a placeholder/keep-alive record carrying no real order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRecord {
    pub id: u64,
    #[serde(deserialize_with = "de_instrument")]
    pub instrument: Instrument,
    pub side: Side,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub amount: Option<Decimal>,
    pub status: OrderStatus,
}

/// Raw fill on the authenticated feed
#[derive(Debug, Clone, Deserialize)]
pub struct UserTradeRecord {
    pub id: u64,
    pub order_id: u64,
    #[serde(deserialize_with = "de_instrument")]
    pub instrument: Instrument,
    pub side: Side,
    #[serde(deserialize_with = "de_decimal")]
    pub price: Decimal,
    #[serde(deserialize_with = "de_decimal")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub fee: Option<Decimal>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Raw balance record on the authenticated feed
///
/// `available` is absent while the venue has only emitted a raw delta and has
/// not yet computed the spendable figure.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRecord {
    #[serde(deserialize_with = "de_currency")]
    pub currency: Currency,
    pub wallet: String,
    #[serde(deserialize_with = "de_decimal")]
    pub total: Decimal,
    #[serde(default, deserialize_with = "de_opt_decimal")]
    pub available: Option<Decimal>,
}

/// Account-scoped records, one variant per authenticated channel kind
#[derive(Debug, Clone)]
pub enum AccountRecord {
    Order(OrderRecord),
    Trade(UserTradeRecord),
    Balance(BalanceRecord),
}

/// A classified inbound message for one channel
#[derive(Debug, Clone)]
pub enum Envelope {
    BookSnapshot(BookSnapshot),
    BookUpdate(BookUpdate),
    /// Historical backlog delivered at subscribe time; expands into one
    /// normalized trade per element, in provided order
    TradeBacklog(Vec<TradeRecord>),
    Trade(TradeRecord),
    Ticker(TickerRecord),
    Account(AccountRecord),
    Heartbeat,
}

/// Decodes a raw frame payload into a typed envelope
///
/// Implementations must classify every message deterministically; a failure
/// is per-message and never affects the channel's ongoing state.
pub trait EnvelopeDecoder: Send + Sync {
    fn decode(&self, key: &ChannelKey, raw: &str) -> Result<Envelope>;
}

/// Default decoder driven by JSON shape
///
/// Book messages: an object with `bids`/`asks` arrays is a snapshot with
/// explicit sides; a bare array of rows is a signed-row snapshot; a single
/// flat row is an update. Signed rows are `[price, count, amount]` or
/// `[price, amount]` with the amount's sign selecting the side; a zero
/// amount or `count == 0` removes the level (a sideless removal targets
/// both sides, the price rests on at most one). Trades: a `["te"|"tu",
/// [...]]` tagged pair is a live event, an array of arrays is a backlog.
/// Venues that deviate from these shapes plug in their own
/// [`EnvelopeDecoder`].
#[derive(Debug, Default)]
pub struct JsonShapeDecoder;

impl EnvelopeDecoder for JsonShapeDecoder {
    fn decode(&self, key: &ChannelKey, raw: &str) -> Result<Envelope> {
        let value: Value = serde_json::from_str(raw)?;

        if is_heartbeat(&value) {
            return Ok(Envelope::Heartbeat);
        }

        match key.kind {
            ChannelKind::OrderBook => decode_book(&value),
            ChannelKind::Trades => decode_trades(&value),
            ChannelKind::Ticker => decode_ticker(&value),
            ChannelKind::Orders => {
                let record: OrderRecord = serde_json::from_value(value)?;
                Ok(Envelope::Account(AccountRecord::Order(record)))
            }
            ChannelKind::UserTrades => {
                let record: UserTradeRecord = serde_json::from_value(value)?;
                Ok(Envelope::Account(AccountRecord::Trade(record)))
            }
            ChannelKind::Balances => {
                let record: BalanceRecord = serde_json::from_value(value)?;
                Ok(Envelope::Account(AccountRecord::Balance(record)))
            }
        }
    }
}

fn is_heartbeat(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.len() == 1 && items[0] == "hb",
        Value::Object(map) => map.get("event").and_then(Value::as_str) == Some("heartbeat"),
        _ => false,
    }
}

fn decode_book(value: &Value) -> Result<Envelope> {
    if let Some(map) = value.as_object() {
        // Explicit-side snapshot: {"bids": [[p, a], ...], "asks": [...]}
        let mut entries = Vec::new();
        for (field, side) in [("bids", Side::Bid), ("asks", Side::Ask)] {
            let rows = map
                .get(field)
                .and_then(Value::as_array)
                .ok_or_else(|| StreamError::Decode(format!("book object missing {field}")))?;
            for row in rows {
                entries.push(sided_entry(row, side)?);
            }
        }
        return Ok(Envelope::BookSnapshot(BookSnapshot { entries }));
    }

    let rows = value
        .as_array()
        .ok_or_else(|| StreamError::Decode("book message is neither object nor array".into()))?;

    if rows.first().map(Value::is_array).unwrap_or(false) {
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.extend(signed_entries(row)?);
        }
        Ok(Envelope::BookSnapshot(BookSnapshot { entries }))
    } else {
        Ok(Envelope::BookUpdate(BookUpdate {
            entries: signed_entries(value)?,
        }))
    }
}

/// Row with the side given by the surrounding field: `[price, amount]` or
/// `[price, amount, count]`
fn sided_entry(row: &Value, side: Side) -> Result<BookEntry> {
    let cells = row
        .as_array()
        .ok_or_else(|| StreamError::Decode("book level is not an array".into()))?;
    if cells.len() < 2 || cells.len() > 3 {
        return Err(StreamError::Decode(format!(
            "book level has {} cells",
            cells.len()
        )));
    }
    Ok(BookEntry {
        side,
        price: decimal_cell(&cells[0])?,
        amount: decimal_cell(&cells[1])?,
        count: cells.get(2).map(|c| u32_cell(c)).transpose()?,
    })
}

/// Signed row: `[price, amount]` or `[price, count, amount]`, side taken
/// from the amount's sign
///
/// A removal whose row carries no side (zero amount with no usable sign)
/// expands into one zero-amount entry per side.
fn signed_entries(row: &Value) -> Result<Vec<BookEntry>> {
    let cells = row
        .as_array()
        .ok_or_else(|| StreamError::Decode("book row is not an array".into()))?;

    let (price, count, raw_amount) = match cells.len() {
        2 => (decimal_cell(&cells[0])?, None, decimal_cell(&cells[1])?),
        3 => (
            decimal_cell(&cells[0])?,
            Some(u32_cell(&cells[1])?),
            decimal_cell(&cells[2])?,
        ),
        n => {
            return Err(StreamError::Decode(format!("book row has {n} cells")));
        }
    };

    let removal = raw_amount.is_zero() || count == Some(0);
    if removal {
        if raw_amount.is_zero() {
            // The price rests on at most one side; removing from both is
            // exact
            return Ok(vec![
                BookEntry {
                    side: Side::Bid,
                    price,
                    amount: Decimal::ZERO,
                    count,
                },
                BookEntry {
                    side: Side::Ask,
                    price,
                    amount: Decimal::ZERO,
                    count,
                },
            ]);
        }
        let side = if raw_amount > Decimal::ZERO {
            Side::Bid
        } else {
            Side::Ask
        };
        return Ok(vec![BookEntry {
            side,
            price,
            amount: Decimal::ZERO,
            count,
        }]);
    }

    let side = if raw_amount > Decimal::ZERO {
        Side::Bid
    } else {
        Side::Ask
    };
    Ok(vec![BookEntry {
        side,
        price,
        amount: raw_amount.abs(),
        count,
    }])
}

fn decode_trades(value: &Value) -> Result<Envelope> {
    if let Some(map) = value.as_object() {
        // Object-shaped live trade, no exchange timestamp
        let id = map
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| StreamError::Decode("trade object missing id".into()))?;
        let price = map
            .get("price")
            .map(decimal_cell)
            .transpose()?
            .ok_or_else(|| StreamError::Decode("trade object missing price".into()))?;
        let amount = map
            .get("amount")
            .map(decimal_cell)
            .transpose()?
            .ok_or_else(|| StreamError::Decode("trade object missing amount".into()))?;
        let side = match map.get("side").and_then(Value::as_str) {
            Some("bid") | Some("buy") => Side::Bid,
            Some("ask") | Some("sell") => Side::Ask,
            other => {
                return Err(StreamError::Decode(format!("trade side {other:?}")));
            }
        };
        return Ok(Envelope::Trade(TradeRecord {
            id,
            price,
            amount,
            side,
            exchange_time: None,
            trade_type: TradeType::Executed,
        }));
    }

    let items = value
        .as_array()
        .ok_or_else(|| StreamError::Decode("trade message is neither object nor array".into()))?;

    match items.first() {
        Some(Value::String(tag)) => {
            let trade_type = match tag.as_str() {
                "te" => TradeType::Executed,
                "tu" => TradeType::Updated,
                other => {
                    return Err(StreamError::Decode(format!("unknown trade tag {other}")));
                }
            };
            let row = items
                .get(1)
                .ok_or_else(|| StreamError::Decode("tagged trade missing body".into()))?;
            Ok(Envelope::Trade(trade_row(row, trade_type)?))
        }
        Some(Value::Array(_)) => {
            let trades = items
                .iter()
                .map(|row| trade_row(row, TradeType::Executed))
                .collect::<Result<Vec<_>>>()?;
            Ok(Envelope::TradeBacklog(trades))
        }
        _ => Err(StreamError::Decode("unrecognized trade shape".into())),
    }
}

/// Positional trade row: `[id, timestamp_ms, amount, price]`, signed amount
fn trade_row(row: &Value, trade_type: TradeType) -> Result<TradeRecord> {
    let cells = row
        .as_array()
        .filter(|c| c.len() == 4)
        .ok_or_else(|| StreamError::Decode("trade row must have 4 cells".into()))?;

    let id = cells[0]
        .as_u64()
        .ok_or_else(|| StreamError::Decode("trade id is not an integer".into()))?;
    let millis = cells[1]
        .as_i64()
        .ok_or_else(|| StreamError::Decode("trade timestamp is not an integer".into()))?;
    let exchange_time = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StreamError::Decode(format!("trade timestamp {millis} out of range")))?;
    let raw_amount = decimal_cell(&cells[2])?;
    let price = decimal_cell(&cells[3])?;

    let side = if raw_amount >= Decimal::ZERO {
        Side::Bid
    } else {
        Side::Ask
    };

    Ok(TradeRecord {
        id,
        price,
        amount: raw_amount.abs(),
        side,
        exchange_time: Some(exchange_time),
        trade_type,
    })
}

fn decode_ticker(value: &Value) -> Result<Envelope> {
    let record = if let Some(map) = value.as_object() {
        let field = |name: &str| -> Result<Decimal> {
            map.get(name)
                .map(decimal_cell)
                .transpose()?
                .ok_or_else(|| StreamError::Decode(format!("ticker missing {name}")))
        };
        let exchange_time = map
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
        TickerRecord {
            last: field("last")?,
            bid: field("bid")?,
            ask: field("ask")?,
            volume: field("volume")?,
            exchange_time,
        }
    } else {
        // Positional form: [bid, ask, last, volume]
        let cells = value
            .as_array()
            .filter(|c| c.len() == 4)
            .ok_or_else(|| StreamError::Decode("ticker row must have 4 cells".into()))?;
        TickerRecord {
            bid: decimal_cell(&cells[0])?,
            ask: decimal_cell(&cells[1])?,
            last: decimal_cell(&cells[2])?,
            volume: decimal_cell(&cells[3])?,
            exchange_time: None,
        }
    };
    Ok(Envelope::Ticker(record))
}

/// Decimal from either a JSON string or a JSON number literal
fn decimal_cell(value: &Value) -> Result<Decimal> {
    let parsed = match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| StreamError::Decode(format!("not a decimal: {value}")))
}

fn u32_cell(value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| StreamError::Decode(format!("not a count: {value}")))
}

fn de_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}

fn de_opt_decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| Decimal::from_str(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn de_instrument<'de, D>(deserializer: D) -> std::result::Result<Instrument, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let (base, counter) = s
        .split_once('/')
        .ok_or_else(|| serde::de::Error::custom(format!("instrument `{s}` is not BASE/COUNTER")))?;
    Ok(Instrument::new(base, counter))
}

fn de_currency<'de, D>(deserializer: D) -> std::result::Result<Currency, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(Currency::new(&s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book_key() -> ChannelKey {
        ChannelKey::order_book(Instrument::new("BTC", "USD"), Some(25))
    }

    #[test]
    fn array_of_arrays_classifies_as_snapshot() {
        let raw = r#"[[100.0, 3, 5.0], [101.0, 2, -3.0]]"#;
        let env = JsonShapeDecoder.decode(&book_key(), raw).unwrap();
        match env {
            Envelope::BookSnapshot(snap) => {
                assert_eq!(snap.entries.len(), 2);
                assert_eq!(snap.entries[0].side, Side::Bid);
                assert_eq!(snap.entries[0].price, dec!(100));
                assert_eq!(snap.entries[0].amount, dec!(5));
                assert_eq!(snap.entries[0].count, Some(3));
                assert_eq!(snap.entries[1].side, Side::Ask);
                assert_eq!(snap.entries[1].amount, dec!(3));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn flat_array_classifies_as_update() {
        let raw = r#"[100.0, 1, -2.5]"#;
        let env = JsonShapeDecoder.decode(&book_key(), raw).unwrap();
        match env {
            Envelope::BookUpdate(update) => {
                assert_eq!(update.entries.len(), 1);
                assert_eq!(update.entries[0].side, Side::Ask);
                assert_eq!(update.entries[0].amount, dec!(2.5));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn zero_count_row_removes_level() {
        let raw = r#"[100.0, 0, 1]"#;
        let env = JsonShapeDecoder.decode(&book_key(), raw).unwrap();
        match env {
            Envelope::BookUpdate(update) => {
                assert_eq!(update.entries[0].side, Side::Bid);
                assert_eq!(update.entries[0].amount, Decimal::ZERO);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn explicit_side_object_is_a_snapshot() {
        let raw = r#"{"bids": [["100", "5"]], "asks": [["101", "3"]]}"#;
        let env = JsonShapeDecoder.decode(&book_key(), raw).unwrap();
        match env {
            Envelope::BookSnapshot(snap) => {
                assert_eq!(snap.entries.len(), 2);
                assert_eq!(snap.entries[0].side, Side::Bid);
                assert_eq!(snap.entries[1].side, Side::Ask);
                assert_eq!(snap.entries[1].price, dec!(101));
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn sideless_removal_targets_both_sides() {
        let raw = r#"[100.0, 0]"#;
        match JsonShapeDecoder.decode(&book_key(), raw).unwrap() {
            Envelope::BookUpdate(update) => {
                assert_eq!(update.entries.len(), 2);
                assert!(update.entries.iter().all(|e| e.amount.is_zero()));
                assert_eq!(update.entries[0].side, Side::Bid);
                assert_eq!(update.entries[1].side, Side::Ask);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn malformed_message_fails_only_itself() {
        let err = JsonShapeDecoder.decode(&book_key(), "not json").unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));

        let err = JsonShapeDecoder
            .decode(&book_key(), r#"[100.0, 1, 2.0, 3.0]"#)
            .unwrap_err();
        assert!(matches!(err, StreamError::Decode(_)));
    }

    #[test]
    fn heartbeat_is_recognized_for_any_kind() {
        let env = JsonShapeDecoder.decode(&book_key(), r#"["hb"]"#).unwrap();
        assert!(matches!(env, Envelope::Heartbeat));

        let key = ChannelKey::trades(Instrument::new("BTC", "USD"), TradeType::Executed);
        let env = JsonShapeDecoder
            .decode(&key, r#"{"event": "heartbeat"}"#)
            .unwrap();
        assert!(matches!(env, Envelope::Heartbeat));
    }

    #[test]
    fn tagged_trade_decodes_with_exchange_time() {
        let key = ChannelKey::trades(Instrument::new("BTC", "USD"), TradeType::Executed);
        let raw = r#"["te", [401, 1672531200000, -0.5, "50000.5"]]"#;
        match JsonShapeDecoder.decode(&key, raw).unwrap() {
            Envelope::Trade(trade) => {
                assert_eq!(trade.id, 401);
                assert_eq!(trade.side, Side::Ask);
                assert_eq!(trade.amount, dec!(0.5));
                assert_eq!(trade.price, dec!(50000.5));
                assert_eq!(trade.trade_type, TradeType::Executed);
                assert!(trade.exchange_time.is_some());
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn trade_backlog_decodes_in_order() {
        let key = ChannelKey::trades(Instrument::new("BTC", "USD"), TradeType::Executed);
        let raw = r#"[[1, 1672531200000, 1.0, 100], [2, 1672531201000, 2.0, 101], [3, 1672531202000, -3.0, 102]]"#;
        match JsonShapeDecoder.decode(&key, raw).unwrap() {
            Envelope::TradeBacklog(trades) => {
                assert_eq!(trades.len(), 3);
                assert_eq!(
                    trades.iter().map(|t| t.id).collect::<Vec<_>>(),
                    vec![1, 2, 3]
                );
                assert_eq!(trades[2].side, Side::Ask);
            }
            other => panic!("expected backlog, got {other:?}"),
        }
    }

    #[test]
    fn object_trade_has_no_exchange_time() {
        let key = ChannelKey::trades(Instrument::new("BTC", "USD"), TradeType::Executed);
        let raw = r#"{"id": 9, "price": "100.5", "amount": "0.25", "side": "sell"}"#;
        match JsonShapeDecoder.decode(&key, raw).unwrap() {
            Envelope::Trade(trade) => {
                assert_eq!(trade.side, Side::Ask);
                assert!(trade.exchange_time.is_none());
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn ticker_decodes_by_name_and_positionally() {
        let key = ChannelKey::ticker(Instrument::new("BTC", "USD"));

        let raw = r#"{"last": "100", "bid": "99", "ask": "101", "volume": "1234"}"#;
        match JsonShapeDecoder.decode(&key, raw).unwrap() {
            Envelope::Ticker(t) => {
                assert_eq!(t.last, dec!(100));
                assert_eq!(t.volume, dec!(1234));
            }
            other => panic!("expected ticker, got {other:?}"),
        }

        let raw = r#"[99, 101, 100, 1234]"#;
        match JsonShapeDecoder.decode(&key, raw).unwrap() {
            Envelope::Ticker(t) => {
                assert_eq!(t.bid, dec!(99));
                assert_eq!(t.ask, dec!(101));
                assert_eq!(t.last, dec!(100));
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn balance_record_allows_missing_available() {
        let raw = r#"{"currency": "btc", "wallet": "exchange", "total": "2.5"}"#;
        match JsonShapeDecoder.decode(&ChannelKey::balances(), raw).unwrap() {
            Envelope::Account(AccountRecord::Balance(b)) => {
                assert_eq!(b.currency, Currency::new("BTC"));
                assert_eq!(b.total, dec!(2.5));
                assert!(b.available.is_none());
            }
            other => panic!("expected balance, got {other:?}"),
        }
    }

    #[test]
    fn order_record_decodes_instrument_and_status() {
        let raw = r#"{"id": 77, "instrument": "ETH/USD", "side": "bid", "price": "2000", "amount": "1.5", "status": "partially_filled"}"#;
        match JsonShapeDecoder.decode(&ChannelKey::orders(), raw).unwrap() {
            Envelope::Account(AccountRecord::Order(o)) => {
                assert_eq!(o.id, 77);
                assert_eq!(o.instrument, Instrument::new("ETH", "USD"));
                assert_eq!(o.status, OrderStatus::PartiallyFilled);
            }
            other => panic!("expected order, got {other:?}"),
        }
    }
}
