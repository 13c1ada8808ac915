//! Core order book state machine
//!
//! Uses BTreeMap for sorted price level management. Two states per
//! instrument: until a snapshot establishes a baseline, incremental updates
//! are discarded, since applying a diff without its base would produce an
//! undefined book.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::envelope::{BookSnapshot, BookUpdate};
use crate::model::{Instrument, Level, OrderBook, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookState {
    Uninitialized,
    Synced,
}

/// Incremental order book for a single instrument
#[derive(Debug)]
pub struct Book {
    instrument: Instrument,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, (Decimal, Option<u32>)>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, (Decimal, Option<u32>)>,
    state: BookState,
    /// Monotonic version; increments on every applied message
    version: u64,
    /// Depth bound requested by the subscription, if any
    depth: Option<usize>,
    /// Updates dropped while waiting for a snapshot
    discarded: u64,
}

impl Book {
    pub fn new(instrument: Instrument, depth: Option<usize>) -> Self {
        Self {
            instrument,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            state: BookState::Uninitialized,
            version: 0,
            depth,
            discarded: 0,
        }
    }

    /// Replace all state with the snapshot, unconditionally
    ///
    /// A snapshot arriving mid-stream is a full resync, never a diff against
    /// the old state.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for entry in &snapshot.entries {
            if entry.amount > Decimal::ZERO {
                match entry.side {
                    Side::Bid => {
                        self.bids
                            .insert(Reverse(entry.price), (entry.amount, entry.count));
                    }
                    Side::Ask => {
                        self.asks.insert(entry.price, (entry.amount, entry.count));
                    }
                }
            }
        }

        self.state = BookState::Synced;
        self.version += 1;
    }

    /// Apply an incremental update level-by-level
    ///
    /// Returns false (and discards the update) when no snapshot has
    /// established a baseline yet.
    pub fn apply_update(&mut self, update: &BookUpdate) -> bool {
        if self.state != BookState::Synced {
            self.discarded += 1;
            return false;
        }

        for entry in &update.entries {
            match entry.side {
                Side::Bid => {
                    if entry.amount.is_zero() {
                        self.bids.remove(&Reverse(entry.price));
                    } else {
                        self.bids
                            .insert(Reverse(entry.price), (entry.amount, entry.count));
                    }
                }
                Side::Ask => {
                    if entry.amount.is_zero() {
                        self.asks.remove(&entry.price);
                    } else {
                        self.asks.insert(entry.price, (entry.amount, entry.count));
                    }
                }
            }
        }

        self.version += 1;
        true
    }

    /// Discard all state; the next snapshot performs a full resync
    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.state = BookState::Uninitialized;
    }

    pub fn is_synced(&self) -> bool {
        self.state == BookState::Synced
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Updates dropped while no baseline was established
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Materialized, depth-bounded view, both sides sorted best-first
    pub fn materialize(&self, timestamp: DateTime<Utc>) -> OrderBook {
        let limit = self.depth.unwrap_or(usize::MAX);
        OrderBook {
            instrument: self.instrument.clone(),
            version: self.version,
            timestamp,
            bids: self
                .bids
                .iter()
                .take(limit)
                .map(|(Reverse(price), (amount, count))| Level {
                    price: *price,
                    amount: *amount,
                    count: *count,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .take(limit)
                .map(|(price, (amount, count))| Level {
                    price: *price,
                    amount: *amount,
                    count: *count,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::BookEntry;
    use rust_decimal_macros::dec;

    fn entry(side: Side, price: Decimal, amount: Decimal) -> BookEntry {
        BookEntry {
            side,
            price,
            amount,
            count: None,
        }
    }

    fn base_snapshot() -> BookSnapshot {
        BookSnapshot {
            entries: vec![
                entry(Side::Bid, dec!(100), dec!(5)),
                entry(Side::Ask, dec!(101), dec!(3)),
            ],
        }
    }

    fn synced_book() -> Book {
        let mut book = Book::new(Instrument::new("BTC", "USD"), None);
        book.apply_snapshot(&base_snapshot());
        book
    }

    #[test]
    fn remove_then_insert_matches_expected_book() {
        let mut book = synced_book();

        assert!(book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Bid, dec!(100), dec!(0))],
        }));
        assert!(book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Ask, dec!(102), dec!(2))],
        }));

        let out = book.materialize(Utc::now());
        assert!(out.bids.is_empty());
        assert_eq!(out.asks.len(), 2);
        assert_eq!(out.asks[0].price, dec!(101));
        assert_eq!(out.asks[0].amount, dec!(3));
        assert_eq!(out.asks[1].price, dec!(102));
        assert_eq!(out.asks[1].amount, dec!(2));
    }

    #[test]
    fn update_before_snapshot_leaves_no_trace() {
        let mut book = Book::new(Instrument::new("BTC", "USD"), None);

        assert!(!book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Bid, dec!(50), dec!(1))],
        }));
        assert_eq!(book.discarded(), 1);

        book.apply_snapshot(&base_snapshot());
        let out = book.materialize(Utc::now());
        assert_eq!(out.bids.len(), 1);
        assert_eq!(out.bids[0].price, dec!(100));
        assert!(out.asks.iter().all(|l| l.price != dec!(50)));
    }

    #[test]
    fn new_snapshot_replaces_all_prior_state() {
        let mut book = synced_book();
        book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Bid, dec!(99), dec!(7))],
        });

        book.apply_snapshot(&BookSnapshot {
            entries: vec![entry(Side::Bid, dec!(200), dec!(1))],
        });

        let out = book.materialize(Utc::now());
        assert_eq!(out.bids.len(), 1);
        assert_eq!(out.bids[0].price, dec!(200));
        assert!(out.asks.is_empty());
    }

    #[test]
    fn replay_is_deterministic() {
        let updates = vec![
            BookUpdate {
                entries: vec![entry(Side::Bid, dec!(99.5), dec!(2))],
            },
            BookUpdate {
                entries: vec![entry(Side::Ask, dec!(101), dec!(0))],
            },
            BookUpdate {
                entries: vec![entry(Side::Bid, dec!(99.5), dec!(4))],
            },
        ];

        let run = || {
            let mut book = Book::new(Instrument::new("BTC", "USD"), None);
            book.apply_snapshot(&base_snapshot());
            for update in &updates {
                book.apply_update(update);
            }
            book.materialize(chrono::DateTime::UNIX_EPOCH)
        };

        let first = run();
        let second = run();
        assert_eq!(first.bids, second.bids);
        assert_eq!(first.asks, second.asks);
        assert_eq!(first.version, second.version);
    }

    #[test]
    fn sides_are_sorted_best_first() {
        let mut book = synced_book();
        book.apply_update(&BookUpdate {
            entries: vec![
                entry(Side::Bid, dec!(99), dec!(1)),
                entry(Side::Bid, dec!(100.5), dec!(1)),
                entry(Side::Ask, dec!(103), dec!(1)),
                entry(Side::Ask, dec!(100.75), dec!(1)),
            ],
        });

        let out = book.materialize(Utc::now());
        let bid_prices: Vec<_> = out.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<_> = out.asks.iter().map(|l| l.price).collect();
        assert_eq!(bid_prices, vec![dec!(100.5), dec!(100), dec!(99)]);
        assert_eq!(ask_prices, vec![dec!(100.75), dec!(101), dec!(103)]);
    }

    #[test]
    fn materialized_view_honors_depth_bound() {
        let mut book = Book::new(Instrument::new("BTC", "USD"), Some(2));
        let entries: Vec<BookEntry> = (0..5)
            .map(|i| entry(Side::Bid, Decimal::from(100 - i), dec!(1)))
            .chain((0..5).map(|i| entry(Side::Ask, Decimal::from(101 + i), dec!(1))))
            .collect();
        book.apply_snapshot(&BookSnapshot { entries });

        let out = book.materialize(Utc::now());
        assert_eq!(out.bids.len(), 2);
        assert_eq!(out.asks.len(), 2);
        assert_eq!(out.bids[0].price, dec!(100));
        assert_eq!(out.asks[0].price, dec!(101));

        // The bound applies to the view, not the state: a removal deeper in
        // the book still takes effect
        book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Bid, dec!(100), dec!(0))],
        });
        let out = book.materialize(Utc::now());
        assert_eq!(out.bids[0].price, dec!(99));
    }

    #[test]
    fn version_is_monotonic_across_messages() {
        let mut book = synced_book();
        let v1 = book.version();
        book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Bid, dec!(98), dec!(1))],
        });
        let v2 = book.version();
        book.apply_snapshot(&base_snapshot());
        let v3 = book.version();
        assert!(v1 < v2 && v2 < v3);
    }

    #[test]
    fn reset_requires_new_snapshot() {
        let mut book = synced_book();
        book.reset();
        assert!(!book.is_synced());
        assert!(!book.apply_update(&BookUpdate {
            entries: vec![entry(Side::Bid, dec!(100), dec!(1))],
        }));

        book.apply_snapshot(&base_snapshot());
        assert!(book.is_synced());
    }

    #[test]
    fn order_counts_are_carried_through() {
        let mut book = Book::new(Instrument::new("BTC", "USD"), None);
        book.apply_snapshot(&BookSnapshot {
            entries: vec![BookEntry {
                side: Side::Bid,
                price: dec!(100),
                amount: dec!(5),
                count: Some(3),
            }],
        });
        let out = book.materialize(Utc::now());
        assert_eq!(out.bids[0].count, Some(3));
    }
}
