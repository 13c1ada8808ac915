//! Default WebSocket transport
//!
//! Handles the socket, ping/pong, and the subscribe/unsubscribe control
//! frames. Reconnection policy stays with the caller: when the socket drops,
//! the connection-state watch flips to `Disconnected` and the frame stream
//! ends.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use super::{ChannelId, ConnectionState, RawFrame, Transport};
use crate::envelope::{ChannelKey, ChannelKind};
use crate::error::{Result, StreamError};
use crate::model::TradeType;
use async_trait::async_trait;

const OUTBOUND_BUFFER: usize = 64;
const INBOUND_BUFFER: usize = 1024;

/// Transport over a single tokio-tungstenite connection
pub struct WsTransport {
    outbound: mpsc::Sender<Message>,
    state_rx: watch::Receiver<ConnectionState>,
    next_id: AtomicU64,
}

impl WsTransport {
    /// Connect to the venue endpoint and start the frame pump
    ///
    /// Returns the transport plus the single inbound frame stream consumed
    /// by the multiplexer.
    pub async fn connect(endpoint: &str) -> Result<(Self, mpsc::Receiver<RawFrame>)> {
        let (ws_stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| StreamError::Transport(format!("failed to connect: {e}")))?;
        info!(status = ?response.status(), "WebSocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
        let (frame_tx, frame_rx) = mpsc::channel(INBOUND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = outbound_rx.recv() => {
                        match outgoing {
                            Some(message) => {
                                if let Err(e) = write.send(message).await {
                                    warn!(error = %e, "WebSocket send failed");
                                    break;
                                }
                            }
                            None => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(frame) = parse_frame(&text) {
                                    if frame_tx.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                debug!("Received ping, sending pong");
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Close(frame))) => {
                                warn!(frame = ?frame, "Received close frame");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket error");
                                break;
                            }
                            None => {
                                warn!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            let _ = state_tx.send(ConnectionState::Disconnected);
        });

        Ok((
            Self {
                outbound: outbound_tx,
                state_rx,
                next_id: AtomicU64::new(1),
            },
            frame_rx,
        ))
    }

    async fn send_control(&self, frame: serde_json::Value) -> Result<()> {
        self.outbound
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|_| StreamError::Transport("WebSocket send channel closed".to_string()))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open_channel(&self, key: &ChannelKey) -> Result<ChannelId> {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send_control(subscribe_frame(key, id)).await?;
        debug!(channel = %id, kind = ?key.kind, "subscription sent");
        Ok(id)
    }

    async fn close_channel(&self, id: ChannelId) -> Result<()> {
        self.send_control(json!({ "event": "unsubscribe", "channel": id.0 }))
            .await?;
        debug!(channel = %id, "unsubscription sent");
        Ok(())
    }

    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

/// Data frames arrive as `{"channel": N, "data": ...}`; everything else
/// (subscription acks, info events) is not routed
fn parse_frame(text: &str) -> Option<RawFrame> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, len = text.len(), "unparseable inbound frame dropped");
            return None;
        }
    };

    let channel = value.get("channel").and_then(|c| c.as_u64());
    let data = value.get("data");
    match (channel, data) {
        (Some(id), Some(payload)) => Some(RawFrame {
            channel: ChannelId(id),
            payload: payload.to_string(),
        }),
        _ => {
            debug!(len = text.len(), "non-data frame skipped");
            None
        }
    }
}

fn subscribe_frame(key: &ChannelKey, id: ChannelId) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("event".into(), json!("subscribe"));
    body.insert("channel".into(), json!(id.0));
    body.insert("kind".into(), json!(kind_tag(key.kind)));
    if let Some(instrument) = &key.instrument {
        body.insert("instrument".into(), json!(instrument.to_string()));
    }
    if let Some(depth) = key.options.depth {
        body.insert("depth".into(), json!(depth));
    }
    if let Some(trade_type) = key.options.trade_type {
        let tag = match trade_type {
            TradeType::Executed => "te",
            TradeType::Updated => "tu",
        };
        body.insert("trade_type".into(), json!(tag));
    }
    serde_json::Value::Object(body)
}

fn kind_tag(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::OrderBook => "order_book",
        ChannelKind::Trades => "trades",
        ChannelKind::Ticker => "ticker",
        ChannelKind::Orders => "orders",
        ChannelKind::UserTrades => "user_trades",
        ChannelKind::Balances => "balances",
    }
}
