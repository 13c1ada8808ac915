//! External collaborator contracts
//!
//! The connection itself (reconnect, backoff, heartbeating, authentication
//! handshake) lives behind these traits. The core only reacts to the
//! connection-state signal.

mod ws;

pub use ws::WsTransport;

use async_trait::async_trait;
use std::fmt;
use tokio::sync::watch;

use crate::envelope::ChannelKey;
use crate::error::Result;
use crate::model::{Balance, Currency};

/// Identifier the transport assigns to a channel at subscribe time; inbound
/// frames are tagged with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A raw inbound message tagged with its channel
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub channel: ChannelId,
    pub payload: String,
}

/// Connection lifecycle as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Transport collaborator: owns the socket and the venue wire protocol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the venue subscribe frame for `key` and return the channel id
    /// inbound frames will carry
    async fn open_channel(&self, key: &ChannelKey) -> Result<ChannelId>;

    /// Send the venue unsubscribe frame; frames still in flight for the id
    /// are dropped by the multiplexer
    async fn close_channel(&self, id: ChannelId) -> Result<()>;

    /// Connection-state signal; a transition to `Disconnected` makes all
    /// per-instrument book state stale
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;
}

/// Account-balance fetch collaborator, invoked by the refresh scheduler
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    async fn fetch_balance(&self, currency: &Currency) -> Result<Balance>;
}
