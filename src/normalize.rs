//! Stateless trade and ticker normalization
//!
//! Venues deliver either a backlog snapshot (an array of historical trades)
//! or single live events; both map to the same canonical shape and flatten
//! into one sequence. The trade-type filter applies before normalization, so
//! a consumer asking for one type never observes the other.

use std::collections::VecDeque;

use chrono::Utc;
use tracing::warn;

use crate::envelope::{Envelope, TickerRecord, TradeRecord};
use crate::error::Result;
use crate::model::{Instrument, NormalizedTrade, Ticker, TradeTime, TradeType};
use crate::mux::ChannelStream;

/// Map one raw trade to the canonical shape
///
/// Falls back to local receipt time when the venue does not stamp trades;
/// the fallback stays distinguishable through [`TradeTime`].
pub fn normalize_trade(instrument: &Instrument, record: &TradeRecord) -> NormalizedTrade {
    NormalizedTrade {
        instrument: instrument.clone(),
        id: record.id.to_string(),
        price: record.price,
        amount: record.amount,
        side: record.side,
        timestamp: match record.exchange_time {
            Some(t) => TradeTime::Exchange(t),
            None => TradeTime::LocalReceipt(Utc::now()),
        },
    }
}

pub fn normalize_ticker(instrument: &Instrument, record: &TickerRecord) -> Ticker {
    Ticker {
        instrument: instrument.clone(),
        last: record.last,
        bid: record.bid,
        ask: record.ask,
        volume: record.volume,
        timestamp: record.exchange_time.unwrap_or_else(Utc::now),
    }
}

/// Canonical public-trade stream for one instrument
pub struct TradeStream {
    inner: ChannelStream,
    instrument: Instrument,
    trade_type: TradeType,
    pending: VecDeque<NormalizedTrade>,
}

impl TradeStream {
    pub(crate) fn new(inner: ChannelStream, instrument: Instrument, trade_type: TradeType) -> Self {
        Self {
            inner,
            instrument,
            trade_type,
            pending: VecDeque::new(),
        }
    }

    /// Next trade of the subscribed type; a backlog snapshot expands into one
    /// emission per historical trade, in provided order
    pub async fn recv(&mut self) -> Result<NormalizedTrade> {
        loop {
            if let Some(trade) = self.pending.pop_front() {
                return Ok(trade);
            }
            match self.inner.recv().await? {
                Envelope::Trade(record) => {
                    if record.trade_type == self.trade_type {
                        return Ok(normalize_trade(&self.instrument, &record));
                    }
                }
                Envelope::TradeBacklog(records) => {
                    self.pending.extend(
                        records
                            .iter()
                            .filter(|r| r.trade_type == self.trade_type)
                            .map(|r| normalize_trade(&self.instrument, r)),
                    );
                }
                other => {
                    warn!(instrument = %self.instrument, envelope = ?other, "unexpected envelope on trade channel");
                }
            }
        }
    }
}

/// Canonical ticker stream for one instrument
pub struct TickerStream {
    inner: ChannelStream,
    instrument: Instrument,
}

impl TickerStream {
    pub(crate) fn new(inner: ChannelStream, instrument: Instrument) -> Self {
        Self { inner, instrument }
    }

    pub async fn recv(&mut self) -> Result<Ticker> {
        loop {
            match self.inner.recv().await? {
                Envelope::Ticker(record) => {
                    return Ok(normalize_ticker(&self.instrument, &record));
                }
                other => {
                    warn!(instrument = %self.instrument, envelope = ?other, "unexpected envelope on ticker channel");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ChannelKey, JsonShapeDecoder};
    use crate::model::Side;
    use crate::mux::ChannelMultiplexer;
    use crate::transport::{ChannelId, MockTransport, RawFrame};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn record(id: u64, trade_type: TradeType) -> TradeRecord {
        TradeRecord {
            id,
            price: dec!(100),
            amount: dec!(1),
            side: Side::Bid,
            exchange_time: Some(Utc::now()),
            trade_type,
        }
    }

    #[test]
    fn missing_exchange_time_degrades_to_local_receipt() {
        let instrument = Instrument::new("BTC", "USD");

        let stamped = normalize_trade(&instrument, &record(1, TradeType::Executed));
        assert!(stamped.timestamp.is_exchange());

        let unstamped = TradeRecord {
            exchange_time: None,
            ..record(2, TradeType::Executed)
        };
        let normalized = normalize_trade(&instrument, &unstamped);
        assert!(!normalized.timestamp.is_exchange());
        assert_eq!(normalized.id, "2");
    }

    #[test]
    fn ticker_maps_field_for_field() {
        let instrument = Instrument::new("BTC", "USD");
        let ticker = normalize_ticker(
            &instrument,
            &TickerRecord {
                last: dec!(100),
                bid: dec!(99),
                ask: dec!(101),
                volume: dec!(4321),
                exchange_time: None,
            },
        );
        assert_eq!(ticker.instrument, instrument);
        assert_eq!(ticker.last, dec!(100));
        assert_eq!(ticker.bid, dec!(99));
        assert_eq!(ticker.ask, dec!(101));
        assert_eq!(ticker.volume, dec!(4321));
    }

    async fn trade_rig(trade_type: TradeType) -> (TradeStream, mpsc::Sender<RawFrame>) {
        let mut transport = MockTransport::new();
        transport
            .expect_open_channel()
            .returning(|_| Ok(ChannelId(1)));
        transport.expect_close_channel().returning(|_| Ok(()));

        let (frame_tx, frame_rx) = mpsc::channel(32);
        let mux = ChannelMultiplexer::spawn(
            Arc::new(transport),
            Arc::new(JsonShapeDecoder),
            frame_rx,
            16,
        );
        let instrument = Instrument::new("BTC", "USD");
        let inner = mux
            .subscribe(ChannelKey::trades(instrument.clone(), trade_type))
            .await
            .unwrap();
        (TradeStream::new(inner, instrument, trade_type), frame_tx)
    }

    #[tokio::test]
    async fn backlog_of_three_expands_in_order() {
        let (mut stream, frames) = trade_rig(TradeType::Executed).await;

        frames
            .send(RawFrame {
                channel: ChannelId(1),
                payload: r#"[[1, 1672531200000, 1.0, 100], [2, 1672531201000, -2.0, 101], [3, 1672531202000, 3.0, 102]]"#
                    .to_string(),
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(stream.recv().await.unwrap().id);
        }
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn filter_hides_the_other_trade_type() {
        let (mut stream, frames) = trade_rig(TradeType::Executed).await;

        frames
            .send(RawFrame {
                channel: ChannelId(1),
                payload: r#"["tu", [10, 1672531200000, 1.0, 100]]"#.to_string(),
            })
            .await
            .unwrap();
        frames
            .send(RawFrame {
                channel: ChannelId(1),
                payload: r#"["te", [11, 1672531201000, 1.0, 100]]"#.to_string(),
            })
            .await
            .unwrap();

        // The update event never surfaces on an executed-only stream
        let trade = stream.recv().await.unwrap();
        assert_eq!(trade.id, "11");
    }
}
