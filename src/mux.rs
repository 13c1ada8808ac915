//! Channel multiplexer
//!
//! Owns the ChannelKey → subscription table. Concurrent subscribe requests
//! for an equal key share one wire subscription; the routing task dispatches
//! every inbound frame, in arrival order, to the matching fan-out channel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, trace, warn};

use crate::envelope::{ChannelKey, Envelope, EnvelopeDecoder};
use crate::error::{Result, StreamError};
use crate::transport::{ChannelId, RawFrame, Transport};

struct SubEntry {
    id: ChannelId,
    sender: broadcast::Sender<Envelope>,
    consumers: usize,
}

#[derive(Default)]
struct MuxTable {
    by_key: HashMap<ChannelKey, SubEntry>,
    by_id: HashMap<ChannelId, ChannelKey>,
}

struct MuxInner {
    transport: Arc<dyn Transport>,
    table: RwLock<MuxTable>,
    release_tx: mpsc::UnboundedSender<ChannelKey>,
    capacity: usize,
}

/// Multiplexes typed envelope streams over a single transport connection
#[derive(Clone)]
pub struct ChannelMultiplexer {
    inner: Arc<MuxInner>,
}

impl ChannelMultiplexer {
    /// Start the routing task over the transport's inbound frame stream
    pub fn spawn(
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn EnvelopeDecoder>,
        mut inbound: mpsc::Receiver<RawFrame>,
        capacity: usize,
    ) -> Self {
        let (release_tx, mut release_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(MuxInner {
            transport,
            table: RwLock::new(MuxTable::default()),
            release_tx,
            capacity,
        });

        let routing = inner.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = inbound.recv() => {
                        match frame {
                            Some(frame) => routing.route(decoder.as_ref(), frame).await,
                            None => break,
                        }
                    }
                    key = release_rx.recv() => {
                        if let Some(key) = key {
                            routing.release(key).await;
                        }
                    }
                }
            }
            // Transport gone: dropping the senders ends every derived stream
            // explicitly instead of letting consumers stall
            let mut table = routing.table.write().await;
            table.by_key.clear();
            table.by_id.clear();
            debug!("inbound frame stream ended, all channels closed");
        });

        Self { inner }
    }

    /// Subscribe to the channel identified by `key`
    ///
    /// An equal key joins the existing wire subscription; the last consumer
    /// dropping its stream releases it.
    pub async fn subscribe(&self, key: ChannelKey) -> Result<ChannelStream> {
        let mut table = self.inner.table.write().await;

        if let Some(entry) = table.by_key.get_mut(&key) {
            entry.consumers += 1;
            let rx = entry.sender.subscribe();
            return Ok(ChannelStream {
                rx,
                _guard: ReleaseGuard {
                    key,
                    tx: self.inner.release_tx.clone(),
                },
            });
        }

        // Holding the write lock across the open keeps a concurrent
        // equal-key subscribe from double-opening on the wire
        let id = self.inner.transport.open_channel(&key).await?;
        let (sender, rx) = broadcast::channel(self.inner.capacity);
        table.by_key.insert(
            key.clone(),
            SubEntry {
                id,
                sender,
                consumers: 1,
            },
        );
        table.by_id.insert(id, key.clone());
        debug!(channel = %id, kind = ?key.kind, "channel opened");

        Ok(ChannelStream {
            rx,
            _guard: ReleaseGuard {
                key,
                tx: self.inner.release_tx.clone(),
            },
        })
    }

    #[cfg(test)]
    async fn live_channels(&self) -> usize {
        self.inner.table.read().await.by_key.len()
    }
}

impl MuxInner {
    async fn route(&self, decoder: &dyn EnvelopeDecoder, frame: RawFrame) {
        let (key, sender) = {
            let table = self.table.read().await;
            match table.by_id.get(&frame.channel) {
                Some(key) => (
                    key.clone(),
                    table.by_key.get(key).map(|e| e.sender.clone()),
                ),
                None => {
                    warn!(channel = %frame.channel, "frame for unknown channel dropped");
                    return;
                }
            }
        };
        let Some(sender) = sender else { return };

        match decoder.decode(&key, &frame.payload) {
            Ok(Envelope::Heartbeat) => trace!(channel = %frame.channel, "heartbeat"),
            Ok(envelope) => {
                // A send error only means no consumer is listening right now
                let _ = sender.send(envelope);
            }
            Err(e) => {
                warn!(channel = %frame.channel, error = %e, "undecodable message dropped");
            }
        }
    }

    async fn release(&self, key: ChannelKey) {
        let closed = {
            let mut table = self.table.write().await;
            match table.by_key.get_mut(&key) {
                Some(entry) => {
                    entry.consumers -= 1;
                    if entry.consumers == 0 {
                        let id = entry.id;
                        table.by_key.remove(&key);
                        table.by_id.remove(&id);
                        Some(id)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(id) = closed {
            debug!(channel = %id, "last consumer released, closing channel");
            if let Err(e) = self.transport.close_channel(id).await {
                warn!(channel = %id, error = %e, "failed to close channel");
            }
        }
    }
}

/// One consumer's view over a shared channel subscription
///
/// Dropping the stream releases the consumer's claim; the wire subscription
/// closes when the last claim goes.
pub struct ChannelStream {
    rx: broadcast::Receiver<Envelope>,
    _guard: ReleaseGuard,
}

impl ChannelStream {
    /// Next envelope, in arrival order
    ///
    /// A consumer that falls further behind than the channel buffer is
    /// disconnected with [`StreamError::Lagged`]: a gapped envelope sequence
    /// would desync derived state irrecoverably.
    pub async fn recv(&mut self) -> Result<Envelope> {
        match self.rx.recv().await {
            Ok(envelope) => Ok(envelope),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Err(StreamError::Lagged { skipped })
            }
            Err(broadcast::error::RecvError::Closed) => Err(StreamError::Closed),
        }
    }
}

struct ReleaseGuard {
    key: ChannelKey,
    tx: mpsc::UnboundedSender<ChannelKey>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.key.clone());
    }
}
