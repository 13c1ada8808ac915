//! Streaming client facade
//!
//! One place that wires the transport, the channel multiplexer, book
//! accumulation, normalization, and the authenticated account streams
//! together behind a small surface.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::account::{AuthGate, BalanceStream, OrderStream, RefreshOutcome, RefreshScheduler, UserTradeStream};
use crate::config::Config;
use crate::envelope::{ChannelKey, JsonShapeDecoder};
use crate::error::{Result, StreamError};
use crate::model::{AuthState, Currency, Instrument, TradeType};
use crate::mux::ChannelMultiplexer;
use crate::normalize::{TickerStream, TradeStream};
use crate::orderbook::{BookManager, BookStream};
use crate::transport::{BalanceFetcher, RawFrame, Transport, WsTransport};

/// Entry point for normalized venue streams
pub struct StreamingClient {
    config: Config,
    mux: ChannelMultiplexer,
    books: BookManager,
    gate: AuthGate,
}

impl StreamingClient {
    /// Connect the bundled WebSocket transport and wire the full pipeline
    ///
    /// Returns the client together with the balance-refresh outcome stream.
    pub async fn connect(
        config: Config,
        fetcher: Arc<dyn BalanceFetcher>,
        auth: watch::Receiver<AuthState>,
    ) -> Result<(Self, mpsc::Receiver<RefreshOutcome>)> {
        let (transport, inbound) = WsTransport::connect(&config.ws_endpoint).await?;
        info!(endpoint = %config.ws_endpoint, "venue feed connected");
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            inbound,
            fetcher,
            auth,
        ))
    }

    /// Wire the pipeline over an already-established transport
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        inbound: mpsc::Receiver<RawFrame>,
        fetcher: Arc<dyn BalanceFetcher>,
        auth: watch::Receiver<AuthState>,
    ) -> (Self, mpsc::Receiver<RefreshOutcome>) {
        let conn = transport.connection_state();
        let mux = ChannelMultiplexer::spawn(
            transport,
            Arc::new(JsonShapeDecoder),
            inbound,
            config.channel_capacity,
        );
        let books = BookManager::new(mux.clone(), conn, config.channel_capacity);
        let (refresh, outcomes) =
            RefreshScheduler::spawn(fetcher, config.refresh_window, config.channel_capacity);
        let gate = AuthGate::new(mux.clone(), auth, refresh, config.stale_policy);

        (
            Self {
                config,
                mux,
                books,
                gate,
            },
            outcomes,
        )
    }

    /// Continuously updated order book for `instrument`
    ///
    /// `depth` bounds the materialized view; unset falls back to the
    /// configured default.
    pub async fn order_books(
        &self,
        instrument: Instrument,
        depth: Option<usize>,
    ) -> Result<BookStream> {
        let depth = depth.or(Some(self.config.default_depth));
        self.books.subscribe(instrument, depth).await
    }

    /// Normalized public trades of one type for `instrument`
    pub async fn trades(
        &self,
        instrument: Instrument,
        trade_type: TradeType,
    ) -> Result<TradeStream> {
        let inner = self
            .mux
            .subscribe(ChannelKey::trades(instrument.clone(), trade_type))
            .await?;
        Ok(TradeStream::new(inner, instrument, trade_type))
    }

    /// Normalized ticker for `instrument`
    ///
    /// Venues without a live ticker channel reject the subscription up front
    /// rather than leaving a silent never-delivering stream.
    pub async fn tickers(&self, instrument: Instrument) -> Result<TickerStream> {
        if !self.config.capabilities.live_ticker {
            return Err(StreamError::NotAvailable("live ticker"));
        }
        let inner = self
            .mux
            .subscribe(ChannelKey::ticker(instrument.clone()))
            .await?;
        Ok(TickerStream::new(inner, instrument))
    }

    /// Changes to the session's own orders; requires authentication
    pub async fn order_changes(&self) -> Result<OrderStream> {
        self.gate.order_changes().await
    }

    /// The session's own fills; requires authentication
    pub async fn user_trades(&self) -> Result<UserTradeStream> {
        self.gate.user_trades().await
    }

    /// Balance changes for one currency and wallet; requires authentication
    pub async fn balance_changes(
        &self,
        currency: Currency,
        wallet: &str,
    ) -> Result<BalanceStream> {
        self.gate.balance_changes(currency, wallet).await
    }
}
