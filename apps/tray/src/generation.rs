//! Task scope for one build of the menu.
//!
//! Every listener spawned while building a menu belongs to the generation that
//! built it. Retiring the generation cancels the listeners and waits for them,
//! so nothing from an older menu can reach the event loop afterwards.

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::cancel::{CancelSignal, CancelToken};

pub struct Generation {
    id: u64,
    signal: CancelSignal,
    tasks: Vec<JoinHandle<()>>,
}

impl Generation {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            signal: CancelSignal::new(),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancelToken {
        self.signal.token()
    }

    /// Relays each click as `value` on `tx` until the generation is retired.
    pub fn forward_clicks<T>(
        &mut self,
        mut clicks: mpsc::Receiver<()>,
        tx: mpsc::Sender<T>,
        value: T,
    ) where
        T: Clone + Send + 'static,
    {
        let token = self.token();
        let generation = self.id;
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    click = clicks.recv() => {
                        if click.is_none() {
                            break;
                        }
                    }
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = tx.send(value.clone()) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(generation, "listener stopped");
        }));
    }

    /// Listeners that have not finished yet.
    pub fn live_tasks(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Cancels every listener and waits until they have all exited.
    pub async fn retire(&mut self) {
        self.signal.cancel();
        let tasks = std::mem::take(&mut self.tasks);
        let count = tasks.len();
        for task in tasks {
            if let Err(err) = task.await {
                if err.is_panic() {
                    tracing::error!(generation = self.id, "listener panicked");
                }
            }
        }
        debug!(generation = self.id, listeners = count, "generation retired");
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.signal.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod tests;
