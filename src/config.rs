//! Configuration for the streaming layer

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, StreamError};

/// What to do with balance records whose computed `available` figure has not
/// arrived yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
    /// Drop the record and request a calculated refresh (default)
    Suppress,
    /// Re-emit the last known available figure alongside the fresh total
    CarryLast,
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suppress" => Ok(StalePolicy::Suppress),
            "carry_last" => Ok(StalePolicy::CarryLast),
            other => Err(format!("unknown stale policy: {other}")),
        }
    }
}

/// Feature flags for the venue behind this instance
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// Some venues deliver trades only and have no live ticker channel
    pub live_ticker: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { live_ticker: true }
    }
}

/// Streaming layer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the venue feed
    pub ws_endpoint: String,

    /// Per-channel fan-out buffer; consumers falling further behind than this
    /// are disconnected rather than fed a gapped sequence
    pub channel_capacity: usize,

    /// Default book depth when the subscriber does not request one
    pub default_depth: usize,

    /// Coalescing window for balance refresh requests
    pub refresh_window: Duration,

    pub stale_policy: StalePolicy,
    pub capabilities: Capabilities,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let stale_policy = env::var("STALE_BALANCE_POLICY")
            .unwrap_or_else(|_| "suppress".to_string())
            .parse()
            .map_err(StreamError::Config)?;

        Ok(Self {
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://localhost:9443/ws".to_string()),
            channel_capacity: env_or("CHANNEL_CAPACITY", 256),
            default_depth: env_or("DEFAULT_DEPTH", 100),
            refresh_window: Duration::from_millis(env_or("REFRESH_WINDOW_MS", 250)),
            stale_policy,
            capabilities: Capabilities {
                live_ticker: env_or("LIVE_TICKER", true),
            },
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://localhost:9443/ws".to_string(),
            channel_capacity: 256,
            default_depth: 100,
            refresh_window: Duration::from_millis(250),
            stale_policy: StalePolicy::Suppress,
            capabilities: Capabilities::default(),
        }
    }
}
