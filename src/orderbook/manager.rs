//! Per-instrument book accumulation tasks
//!
//! One task per subscribed book channel folds the envelope sequence into a
//! [`Book`] and fans out the materialized view after every applied message.
//! The task is the single writer for its instrument's state; independent
//! instruments run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Book;
use crate::envelope::{ChannelKey, Envelope};
use crate::error::{Result, StreamError};
use crate::model::{Instrument, OrderBook};
use crate::mux::{ChannelMultiplexer, ChannelStream};
use crate::transport::ConnectionState;

struct BookHandle {
    updates: broadcast::Sender<OrderBook>,
    consumers: usize,
    task: JoinHandle<()>,
}

/// Manages the accumulation tasks for all subscribed book channels
pub struct BookManager {
    mux: ChannelMultiplexer,
    conn: watch::Receiver<ConnectionState>,
    capacity: usize,
    books: Arc<RwLock<HashMap<ChannelKey, BookHandle>>>,
    release_tx: mpsc::UnboundedSender<ChannelKey>,
}

impl BookManager {
    pub fn new(
        mux: ChannelMultiplexer,
        conn: watch::Receiver<ConnectionState>,
        capacity: usize,
    ) -> Self {
        let books: Arc<RwLock<HashMap<ChannelKey, BookHandle>>> = Arc::default();
        let (release_tx, mut release_rx) = mpsc::unbounded_channel::<ChannelKey>();

        let table = books.clone();
        tokio::spawn(async move {
            while let Some(key) = release_rx.recv().await {
                let mut table = table.write().await;
                let emptied = match table.get_mut(&key) {
                    Some(handle) => {
                        handle.consumers -= 1;
                        handle.consumers == 0
                    }
                    None => false,
                };
                if emptied {
                    // Aborting the fold task drops its mux stream, which
                    // releases the wire subscription in turn
                    if let Some(handle) = table.remove(&key) {
                        handle.task.abort();
                    }
                    debug!(kind = ?key.kind, "book state discarded, no consumers remain");
                }
            }
        });

        Self {
            mux,
            conn,
            capacity,
            books,
            release_tx,
        }
    }

    /// Continuously updated order book for one instrument
    pub async fn subscribe(
        &self,
        instrument: Instrument,
        depth: Option<usize>,
    ) -> Result<BookStream> {
        let key = ChannelKey::order_book(instrument.clone(), depth);
        let mut books = self.books.write().await;

        if let Some(handle) = books.get_mut(&key) {
            handle.consumers += 1;
            return Ok(BookStream {
                rx: handle.updates.subscribe(),
                _guard: BookGuard {
                    key,
                    tx: self.release_tx.clone(),
                },
            });
        }

        let stream = self.mux.subscribe(key.clone()).await?;
        let (updates, rx) = broadcast::channel(self.capacity);
        let task = tokio::spawn(run_book(
            instrument,
            depth,
            stream,
            updates.clone(),
            self.conn.clone(),
        ));
        books.insert(
            key.clone(),
            BookHandle {
                updates,
                consumers: 1,
                task,
            },
        );

        Ok(BookStream {
            rx,
            _guard: BookGuard {
                key,
                tx: self.release_tx.clone(),
            },
        })
    }
}

async fn run_book(
    instrument: Instrument,
    depth: Option<usize>,
    mut stream: ChannelStream,
    updates: broadcast::Sender<OrderBook>,
    mut conn: watch::Receiver<ConnectionState>,
) {
    let mut book = Book::new(instrument.clone(), depth);

    loop {
        tokio::select! {
            envelope = stream.recv() => {
                match envelope {
                    Ok(Envelope::BookSnapshot(snapshot)) => {
                        book.apply_snapshot(&snapshot);
                        let _ = updates.send(book.materialize(chrono::Utc::now()));
                    }
                    Ok(Envelope::BookUpdate(update)) => {
                        if book.apply_update(&update) {
                            let _ = updates.send(book.materialize(chrono::Utc::now()));
                        } else {
                            debug!(
                                instrument = %instrument,
                                discarded = book.discarded(),
                                "update before snapshot dropped"
                            );
                        }
                    }
                    Ok(_) => {
                        warn!(instrument = %instrument, "unexpected envelope on book channel");
                    }
                    Err(StreamError::Lagged { skipped }) => {
                        // Missed diffs would leave a silently wrong book
                        warn!(
                            instrument = %instrument,
                            skipped,
                            "book task lagged, waiting for next snapshot"
                        );
                        book.reset();
                    }
                    Err(_) => break,
                }
            }
            changed = conn.changed() => {
                if changed.is_err() {
                    break;
                }
                if *conn.borrow() == ConnectionState::Disconnected {
                    warn!(instrument = %instrument, "transport disconnected, book state stale");
                    book.reset();
                }
            }
        }
    }
}

/// Consumer-facing stream of materialized order books
pub struct BookStream {
    rx: broadcast::Receiver<OrderBook>,
    _guard: BookGuard,
}

impl BookStream {
    /// Next materialized book, one per applied snapshot/update
    pub async fn recv(&mut self) -> Result<OrderBook> {
        match self.rx.recv().await {
            Ok(book) => Ok(book),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Err(StreamError::Lagged { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => Err(StreamError::Closed),
        }
    }
}

struct BookGuard {
    key: ChannelKey,
    tx: mpsc::UnboundedSender<ChannelKey>,
}

impl Drop for BookGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.key.clone());
    }
}
