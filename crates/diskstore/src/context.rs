//! Execution contexts for store operations.
//!
//! Stores never block the caller of an async entry point: the blocking file
//! operation is dispatched onto an [`ExecutionContext`] and its result comes
//! back over a oneshot channel. The default context is a dedicated worker
//! thread that runs all operations in submission order; tests typically use
//! [`ExecutionContext::inline`] for deterministic, same-thread execution.
//!
//! The context is injected through the [`StoreProvider`](crate::StoreProvider)
//! rather than being ambient global state, and any store can be rebound to a
//! different context per call chain via `with_context`.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A strategy for running blocking store operations.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

enum Inner {
    /// Run on the calling thread.
    Inline,
    /// Serialize through one background worker thread.
    Worker(mpsc::Sender<Job>),
}

impl ExecutionContext {
    /// A context that serializes all operations through a single dedicated
    /// worker thread, so items are written and read in submission order.
    pub fn worker() -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        thread::spawn(move || {
            debug!("store worker started");
            while let Ok(job) = rx.recv() {
                job();
            }
            debug!("store worker shut down");
        });
        Self {
            inner: Arc::new(Inner::Worker(tx)),
        }
    }

    /// A context that runs operations directly on the calling thread.
    ///
    /// Useful for tests that need deterministic scheduling.
    pub fn inline() -> Self {
        Self {
            inner: Arc::new(Inner::Inline),
        }
    }

    /// Run `f` on this context and await its result.
    pub(crate) async fn run<R>(
        &self,
        f: impl FnOnce() -> StoreResult<R> + Send + 'static,
    ) -> StoreResult<R>
    where
        R: Send + 'static,
    {
        match &*self.inner {
            Inner::Inline => f(),
            Inner::Worker(jobs) => {
                let (tx, rx) = oneshot::channel();
                jobs.send(Box::new(move || {
                    let _ = tx.send(f());
                }))
                .map_err(|_| worker_gone())?;
                rx.await.map_err(|_| worker_gone())?
            }
        }
    }

    /// Run `f` on this context without waiting for it.
    pub(crate) fn dispatch(&self, f: impl FnOnce() + Send + 'static) {
        match &*self.inner {
            Inner::Inline => f(),
            Inner::Worker(jobs) => {
                let _ = jobs.send(Box::new(f));
            }
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::worker()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &*self.inner {
            Inner::Inline => "inline",
            Inner::Worker(_) => "worker",
        };
        f.debug_struct("ExecutionContext").field("kind", &kind).finish()
    }
}

fn worker_gone() -> StoreError {
    StoreError::io("store worker thread has shut down")
}
