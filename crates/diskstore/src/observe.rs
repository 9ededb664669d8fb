//! Live update streams for store observers.
//!
//! An [`Updates`] stream follows the replay-then-stream contract: the first
//! item is the state persisted at subscription time, every later item is the
//! result of a subsequent mutation, and the stream ends (yielding `None`)
//! when the store is deleted. Each subscriber gets its own independent
//! replay prefix.

use tokio::sync::broadcast;
use tracing::warn;

/// A replay-then-live stream of store updates.
pub struct Updates<E> {
    replay: Option<E>,
    events: broadcast::Receiver<E>,
}

impl<E: Clone> Updates<E> {
    pub(crate) fn new(replay: E, events: broadcast::Receiver<E>) -> Self {
        Self {
            replay: Some(replay),
            events,
        }
    }

    /// Receive the next update, or `None` once the store has been deleted.
    pub async fn next(&mut self) -> Option<E> {
        if let Some(current) = self.replay.take() {
            return Some(current);
        }
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "observer lagged behind store updates");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
