//! Authenticated stream gating
//!
//! Account-scoped channels are only deliverable while the session is
//! authenticated. Access at any other time fails fast and explicitly instead
//! of silently blocking, so "not authenticated" stays distinguishable from
//! "authenticated but no data yet".

use tokio::sync::watch;
use tracing::{debug, warn};

use super::refresh::RefreshHandle;
use crate::config::StalePolicy;
use crate::envelope::{AccountRecord, BalanceRecord, ChannelKey, Envelope};
use crate::error::{Result, StreamError};
use crate::model::{AuthState, Balance, Currency, OrderUpdate, UserTrade};
use crate::mux::{ChannelMultiplexer, ChannelStream};
use rust_decimal::Decimal;

/// Gates account-scoped subscriptions on the mirrored auth session state
pub struct AuthGate {
    mux: ChannelMultiplexer,
    auth: watch::Receiver<AuthState>,
    refresh: RefreshHandle,
    policy: StalePolicy,
}

impl AuthGate {
    pub fn new(
        mux: ChannelMultiplexer,
        auth: watch::Receiver<AuthState>,
        refresh: RefreshHandle,
        policy: StalePolicy,
    ) -> Self {
        Self {
            mux,
            auth,
            refresh,
            policy,
        }
    }

    /// Subscribe with the auth check applied up front, so failure is
    /// immediate rather than a silently empty stream
    async fn subscribe_gated(&self, key: ChannelKey) -> Result<ChannelStream> {
        if key.kind.requires_auth() && *self.auth.borrow() != AuthState::Authenticated {
            return Err(StreamError::NotAuthenticated);
        }
        self.mux.subscribe(key).await
    }

    /// Stream of the session's order changes
    pub async fn order_changes(&self) -> Result<OrderStream> {
        let inner = self.subscribe_gated(ChannelKey::orders()).await?;
        Ok(OrderStream {
            inner,
            auth: self.auth.clone(),
            refresh: self.refresh.clone(),
        })
    }

    /// Stream of the session's fills
    pub async fn user_trades(&self) -> Result<UserTradeStream> {
        let inner = self.subscribe_gated(ChannelKey::user_trades()).await?;
        Ok(UserTradeStream {
            inner,
            auth: self.auth.clone(),
            refresh: self.refresh.clone(),
        })
    }

    /// Stream of balance changes for one currency in one wallet
    pub async fn balance_changes(&self, currency: Currency, wallet: &str) -> Result<BalanceStream> {
        let inner = self.subscribe_gated(ChannelKey::balances()).await?;
        Ok(BalanceStream {
            inner,
            auth: self.auth.clone(),
            refresh: self.refresh.clone(),
            currency,
            wallet: wallet.to_string(),
            policy: self.policy,
            last_available: None,
        })
    }
}

/// Waits for the next auth transition; returns an error once the session is
/// no longer authenticated so dependent streams terminate explicitly
async fn auth_lost(auth: &mut watch::Receiver<AuthState>) -> StreamError {
    loop {
        if auth.changed().await.is_err() {
            return StreamError::Closed;
        }
        if *auth.borrow() != AuthState::Authenticated {
            return StreamError::NotAuthenticated;
        }
    }
}

/// Order changes, with placeholder records filtered out
pub struct OrderStream {
    inner: ChannelStream,
    auth: watch::Receiver<AuthState>,
    refresh: RefreshHandle,
}

impl OrderStream {
    pub async fn recv(&mut self) -> Result<OrderUpdate> {
        loop {
            tokio::select! {
                err = auth_lost(&mut self.auth) => return Err(err),
                envelope = self.inner.recv() => {
                    match envelope? {
                        Envelope::Account(AccountRecord::Order(record)) => {
                            // id 0 marks a keep-alive placeholder carrying no order
                            if record.id == 0 {
                                debug!("placeholder order record dropped");
                                continue;
                            }
                            // Either leg's available balance may have changed
                            self.refresh.request(record.instrument.base.clone());
                            self.refresh.request(record.instrument.counter.clone());
                            return Ok(OrderUpdate {
                                id: record.id,
                                instrument: record.instrument,
                                side: record.side,
                                price: record.price,
                                amount: record.amount,
                                status: record.status,
                            });
                        }
                        other => {
                            warn!(envelope = ?other, "unexpected envelope on orders channel");
                        }
                    }
                }
            }
        }
    }
}

/// The session's fills, with placeholder records filtered out
pub struct UserTradeStream {
    inner: ChannelStream,
    auth: watch::Receiver<AuthState>,
    refresh: RefreshHandle,
}

impl UserTradeStream {
    pub async fn recv(&mut self) -> Result<UserTrade> {
        loop {
            tokio::select! {
                err = auth_lost(&mut self.auth) => return Err(err),
                envelope = self.inner.recv() => {
                    match envelope? {
                        Envelope::Account(AccountRecord::Trade(record)) => {
                            if record.id == 0 {
                                debug!("placeholder trade record dropped");
                                continue;
                            }
                            self.refresh.request(record.instrument.base.clone());
                            self.refresh.request(record.instrument.counter.clone());
                            return Ok(UserTrade {
                                id: record.id,
                                order_id: record.order_id,
                                instrument: record.instrument,
                                side: record.side,
                                price: record.price,
                                amount: record.amount,
                                fee: record.fee,
                                timestamp: record.timestamp,
                            });
                        }
                        other => {
                            warn!(envelope = ?other, "unexpected envelope on user trades channel");
                        }
                    }
                }
            }
        }
    }
}

/// Balance changes for one currency/wallet
pub struct BalanceStream {
    inner: ChannelStream,
    auth: watch::Receiver<AuthState>,
    refresh: RefreshHandle,
    currency: Currency,
    wallet: String,
    policy: StalePolicy,
    last_available: Option<Decimal>,
}

impl BalanceStream {
    pub async fn recv(&mut self) -> Result<Balance> {
        loop {
            tokio::select! {
                err = auth_lost(&mut self.auth) => return Err(err),
                envelope = self.inner.recv() => {
                    match envelope? {
                        Envelope::Account(AccountRecord::Balance(record)) => {
                            if let Some(balance) = self.filter(record) {
                                return Ok(balance);
                            }
                        }
                        other => {
                            warn!(envelope = ?other, "unexpected envelope on balances channel");
                        }
                    }
                }
            }
        }
    }

    fn filter(&mut self, record: BalanceRecord) -> Option<Balance> {
        if !record.wallet.eq_ignore_ascii_case(&self.wallet) || record.currency != self.currency {
            return None;
        }

        match record.available {
            Some(available) => {
                self.last_available = Some(available);
                Some(Balance {
                    currency: record.currency,
                    wallet: record.wallet,
                    total: record.total,
                    available: Some(available),
                })
            }
            // The venue emitted a raw delta before computing the spendable
            // figure; never forward a partial balance
            None => match self.policy {
                StalePolicy::Suppress => {
                    debug!(
                        currency = %record.currency,
                        wallet = %record.wallet,
                        "uncalculated balance dropped, scheduling refresh"
                    );
                    self.refresh.request(record.currency);
                    None
                }
                StalePolicy::CarryLast => match self.last_available {
                    Some(previous) => Some(Balance {
                        currency: record.currency,
                        wallet: record.wallet,
                        total: record.total,
                        available: Some(previous),
                    }),
                    None => {
                        self.refresh.request(record.currency);
                        None
                    }
                },
            },
        }
    }
}
