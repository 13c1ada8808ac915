//! Balance refresh scheduling
//!
//! Order and trade events make balances stale faster than venues recompute
//! them. The scheduler coalesces repeated refresh requests for one currency
//! inside a short window into a single outbound fetch. It owns the only
//! timer in the core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::{Result, StreamError};
use crate::model::{Balance, Currency};
use crate::transport::BalanceFetcher;

/// Handle for requesting a coalesced balance refresh
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<Currency>,
}

impl RefreshHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Currency>) -> Self {
        Self { tx }
    }

    /// Request a refresh for `currency`; requests inside the coalescing
    /// window collapse into one fetch
    pub fn request(&self, currency: Currency) {
        let _ = self.tx.send(currency);
    }
}

/// Result of one coalesced fetch
///
/// Failures are reported here and never retried; a later event re-triggers.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub currency: Currency,
    pub result: Result<Balance>,
}

/// Spawns the coalescing task
pub struct RefreshScheduler;

impl RefreshScheduler {
    pub fn spawn(
        fetcher: Arc<dyn BalanceFetcher>,
        window: Duration,
        buffer: usize,
    ) -> (RefreshHandle, mpsc::Receiver<RefreshOutcome>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Currency>();
        let (out_tx, out_rx) = mpsc::channel(buffer);

        tokio::spawn(async move {
            let mut pending: HashMap<Currency, Instant> = HashMap::new();
            loop {
                let next_due = pending.values().min().copied();
                tokio::select! {
                    request = rx.recv() => {
                        match request {
                            Some(currency) => {
                                // A request for an already-armed currency
                                // coalesces into the existing deadline
                                pending
                                    .entry(currency)
                                    .or_insert_with(|| Instant::now() + window);
                            }
                            None => break,
                        }
                    }
                    _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                        let now = Instant::now();
                        let due: Vec<Currency> = pending
                            .iter()
                            .filter(|(_, deadline)| **deadline <= now)
                            .map(|(currency, _)| currency.clone())
                            .collect();
                        for currency in due {
                            pending.remove(&currency);
                            debug!(currency = %currency, "coalesced balance refresh firing");
                            // Distinct currencies fetch independently
                            let fetcher = fetcher.clone();
                            let out_tx = out_tx.clone();
                            tokio::spawn(async move {
                                let result = fetcher.fetch_balance(&currency).await.map_err(|e| {
                                    StreamError::RefreshFailed {
                                        currency: currency.code().to_string(),
                                        reason: e.to_string(),
                                    }
                                });
                                if let Err(e) = &result {
                                    warn!(currency = %currency, error = %e, "balance refresh failed");
                                }
                                let _ = out_tx.send(RefreshOutcome { currency, result }).await;
                            });
                        }
                    }
                }
            }
        });

        (RefreshHandle::new(tx), out_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBalanceFetcher;
    use rust_decimal_macros::dec;
    use tokio::time::advance;

    fn balance(code: &str) -> Balance {
        Balance {
            currency: Currency::new(code),
            wallet: "exchange".to_string(),
            total: dec!(10),
            available: Some(dec!(8)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_requests_in_window_fetch_once() {
        let mut fetcher = MockBalanceFetcher::new();
        fetcher
            .expect_fetch_balance()
            .times(1)
            .returning(|c| Ok(balance(c.code())));

        let (handle, mut outcomes) =
            RefreshScheduler::spawn(Arc::new(fetcher), Duration::from_millis(250), 8);

        handle.request(Currency::new("BTC"));
        handle.request(Currency::new("BTC"));
        handle.request(Currency::new("BTC"));

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.currency, Currency::new("BTC"));
        assert!(outcome.result.is_ok());

        // Nothing further is in flight
        advance(Duration::from_secs(1)).await;
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn different_currencies_fetch_independently() {
        let mut fetcher = MockBalanceFetcher::new();
        fetcher
            .expect_fetch_balance()
            .times(2)
            .returning(|c| Ok(balance(c.code())));

        let (handle, mut outcomes) =
            RefreshScheduler::spawn(Arc::new(fetcher), Duration::from_millis(250), 8);

        handle.request(Currency::new("BTC"));
        handle.request(Currency::new("USD"));

        let mut seen = vec![
            outcomes.recv().await.unwrap().currency,
            outcomes.recv().await.unwrap().currency,
        ];
        seen.sort_by(|a, b| a.code().cmp(b.code()));
        assert_eq!(seen, vec![Currency::new("BTC"), Currency::new("USD")]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_reported_not_retried() {
        let mut fetcher = MockBalanceFetcher::new();
        fetcher.expect_fetch_balance().times(1).returning(|_| {
            Err(StreamError::Transport("venue unavailable".to_string()))
        });

        let (handle, mut outcomes) =
            RefreshScheduler::spawn(Arc::new(fetcher), Duration::from_millis(250), 8);

        handle.request(Currency::new("BTC"));

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(
            outcome.result,
            Err(StreamError::RefreshFailed { .. })
        ));

        advance(Duration::from_secs(5)).await;
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn requests_after_the_window_fetch_again() {
        let mut fetcher = MockBalanceFetcher::new();
        fetcher
            .expect_fetch_balance()
            .times(2)
            .returning(|c| Ok(balance(c.code())));

        let (handle, mut outcomes) =
            RefreshScheduler::spawn(Arc::new(fetcher), Duration::from_millis(250), 8);

        handle.request(Currency::new("BTC"));
        outcomes.recv().await.unwrap();

        handle.request(Currency::new("BTC"));
        outcomes.recv().await.unwrap();
    }
}
