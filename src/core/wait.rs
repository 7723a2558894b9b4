// src/core/wait.rs
use crate::connectors::traits::PriceOracle;
use crate::error::with_timeout;
use crate::notify::NotificationSink;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Creates a linked stop handle / token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

/// Held by whoever may stop the agent.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Held by the agent loop. A dropped [`CancelHandle`] counts as cancellation.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` on cancellation.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Exhausted,
    Cancelled,
}

/// Probes the oracle up to `retries` times, `delay` apart.
pub async fn wait_for_oracle(
    oracle: &dyn PriceOracle,
    notifier: &dyn NotificationSink,
    token: &mut CancelToken,
    retries: u32,
    delay: Duration,
    call_timeout: Duration,
) -> Availability {
    info!("Waiting for prediction API (max {} attempts)", retries);
    notifier.publish("INFO: Agent started. Waiting for API server...");

    for attempt in 1..=retries {
        if token.is_cancelled() {
            return Availability::Cancelled;
        }

        let probe = tokio::select! {
            _ = token.cancelled() => return Availability::Cancelled,
            res = with_timeout("oracle.is_available", call_timeout, oracle.is_available()) => res,
        };

        match probe {
            Ok(true) => {
                notifier.publish("INFO: Prediction API is available.");
                return Availability::Available;
            }
            Ok(false) => warn!("Attempt {}/{}: API answered but is not healthy", attempt, retries),
            Err(e) => warn!("Attempt {}/{}: API not available: {}", attempt, retries, e),
        }

        if attempt < retries {
            notifier.publish(&format!(
                "INFO: API not available. Retrying... ({}/{})",
                attempt, retries
            ));
            if !token.sleep(delay).await {
                return Availability::Cancelled;
            }
        }
    }

    Availability::Exhausted
}
