//! Long-lived subscription to the daemon's notification bus.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use client_core::{is_cancellation, BusWatcher, ClientError, LocalClient};
use shared::domain::{ConnectionState, WatchOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

const WATCH_OPTIONS: WatchOptions = WatchOptions {
    initial_state: true,
    no_private_keys: true,
};

pub struct StreamWatcher {
    client: Arc<dyn LocalClient>,
    states: mpsc::Sender<ConnectionState>,
    lifetime: CancelToken,
    reconnect_delay: Duration,
}

impl StreamWatcher {
    /// `states` should have capacity 1 so that every push waits for the consumer.
    pub fn new(
        client: Arc<dyn LocalClient>,
        states: mpsc::Sender<ConnectionState>,
        lifetime: CancelToken,
    ) -> Self {
        Self {
            client,
            states,
            lifetime,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Watches until the consumer goes away.
    ///
    /// Transport errors are retried forever after the reconnect delay. Once the
    /// process lifetime is cancelled this returns [`ClientError::Cancelled`].
    ///
    /// A new subscription replays the daemon's current state first; that replay
    /// is dropped when it matches the last state delivered.
    pub async fn run(self) -> Result<()> {
        let mut attempt: u64 = 0;
        let mut last_delivered = None;
        loop {
            attempt += 1;
            match self.watch_once(&mut last_delivered).await {
                Ok(()) => {
                    debug!("state consumer gone, watcher exiting");
                    return Ok(());
                }
                Err(err) if is_cancellation(&err) || self.lifetime.is_cancelled() => {
                    return Err(ClientError::Cancelled.into());
                }
                Err(err) => {
                    warn!(
                        attempt,
                        error = %format!("{err:#}"),
                        retry_in_ms = self.reconnect_delay.as_millis() as u64,
                        "watch-ipn-bus failed"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.lifetime.cancelled() => return Err(ClientError::Cancelled.into()),
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
    }

    /// One subscription. Returns `Ok` only when the consumer has gone away.
    async fn watch_once(&self, last_delivered: &mut Option<ConnectionState>) -> Result<()> {
        let mut bus = tokio::select! {
            biased;
            _ = self.lifetime.cancelled() => return Err(ClientError::Cancelled.into()),
            bus = self.client.watch_ipn_bus(WATCH_OPTIONS) => bus?,
        };
        info!("watching daemon notifications");

        let outcome = self.pump(bus.as_mut(), last_delivered).await;
        bus.close().await;
        outcome
    }

    async fn pump(
        &self,
        bus: &mut dyn BusWatcher,
        last_delivered: &mut Option<ConnectionState>,
    ) -> Result<()> {
        let mut replayed = false;
        loop {
            let notify = tokio::select! {
                biased;
                _ = self.lifetime.cancelled() => return Err(ClientError::Cancelled.into()),
                notify = bus.next() => notify?,
            };

            if let Some(message) = &notify.err_message {
                warn!(%message, "daemon reported an error");
            }
            let Some(state) = notify.state else {
                continue;
            };
            let is_replay = !replayed;
            replayed = true;
            if is_replay && *last_delivered == Some(state) {
                debug!(%state, "skipping replayed state");
                continue;
            }
            info!(%state, "new state");

            tokio::select! {
                biased;
                _ = self.lifetime.cancelled() => return Err(ClientError::Cancelled.into()),
                sent = self.states.send(state) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                    *last_delivered = Some(state);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/watcher_tests.rs"]
mod tests;
