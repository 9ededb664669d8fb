//! Single-value store: at most one value persisted under a key.

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::context::ExecutionContext;
use crate::converter::Converter;
use crate::error::{StoreError, StoreResult};
use crate::lock::StoreLock;
use crate::observe::Updates;
use crate::write::atomic_write;

/// Capacity of a store's update channel.
pub(crate) const UPDATE_CAPACITY: usize = 256;

/// An update published to observers of a [`ValueStore`].
///
/// `value` is `None` after `clear()` (and as the replay state of a store
/// that has never held a value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueUpdate<T> {
    pub value: Option<T>,
}

impl<T> ValueUpdate<T> {
    pub fn of(value: T) -> Self {
        Self { value: Some(value) }
    }

    pub fn empty() -> Self {
        Self { value: None }
    }

    /// Returns `true` if this update carries no value.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

/// Update stream returned by [`ValueStore::observe`].
pub type ValueUpdates<T> = Updates<ValueUpdate<T>>;

/// Store a single value of type `T` in one file on disk.
///
/// The file is the authoritative state; the store holds nothing in memory
/// between operations. An absent file means "no value", which is not an
/// error. Created through a [`StoreProvider`](crate::StoreProvider).
///
/// Cloning a store is cheap and clones share the same lock and observer
/// channel.
pub struct ValueStore<T, C> {
    shared: Arc<Shared<T, C>>,
    ctx: ExecutionContext,
}

struct Shared<T, C> {
    file: PathBuf,
    converter: Arc<C>,
    lock: StoreLock,
    deleted: AtomicBool,
    /// Taken (set to `None`) on delete so observer streams terminate.
    updates: Mutex<Option<broadcast::Sender<ValueUpdate<T>>>>,
}

impl<T, C> Clone for ValueStore<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<T, C> Shared<T, C> {
    fn ensure_live(&self) -> StoreResult<()> {
        if self.deleted.load(Ordering::Acquire) {
            Err(StoreError::Deleted)
        } else {
            Ok(())
        }
    }

    fn publish(&self, update: ValueUpdate<T>) {
        let senders = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = senders.as_ref() {
            // No receivers is fine.
            let _ = tx.send(update);
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ValueUpdate<T>>> {
        let senders = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        senders.as_ref().map(|tx| tx.subscribe())
    }

    fn close(&self) {
        let mut senders = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        *senders = None;
    }
}

impl<T, C> ValueStore<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    C: Converter + 'static,
{
    pub(crate) fn new(file: PathBuf, converter: Arc<C>, ctx: ExecutionContext) -> Self {
        let (tx, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                file,
                converter,
                lock: StoreLock::new(),
                deleted: AtomicBool::new(false),
                updates: Mutex::new(Some(tx)),
            }),
            ctx,
        }
    }

    /// The backing file for this store.
    pub fn path(&self) -> &Path {
        &self.shared.file
    }

    /// A clone of this store bound to a different execution context.
    ///
    /// State, lock, and observers stay shared; only dispatch changes.
    pub fn with_context(&self, ctx: ExecutionContext) -> Self {
        Self {
            shared: self.shared.clone(),
            ctx,
        }
    }

    /// Read the current value, dispatched on this store's execution context.
    ///
    /// Yields `None` if no value has been written or the store was cleared.
    pub async fn get(&self) -> StoreResult<Option<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_get()).await
    }

    /// Read the current value on the calling thread.
    pub fn blocking_get(&self) -> StoreResult<Option<T>> {
        let shared = &self.shared;
        shared.lock.run_shared(|| {
            shared.ensure_live()?;
            read_current(shared)
        })
    }

    /// Write a value and await the result. Returns the value written, which
    /// is useful for chaining.
    pub async fn put(&self, value: T) -> StoreResult<T> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_put(value)).await
    }

    /// Write a value on the calling thread.
    pub fn blocking_put(&self, value: T) -> StoreResult<T> {
        let shared = &self.shared;
        shared.lock.run_exclusive(|| {
            shared.ensure_live()?;
            atomic_write(Some(&value), &*shared.converter, &shared.file)?;
            shared.publish(ValueUpdate::of(value.clone()));
            Ok(value)
        })
    }

    /// Write a value without waiting for the outcome. A failure is surfaced
    /// through an error-level log, never silently dropped; use [`put`] when
    /// the caller needs the result.
    ///
    /// [`put`]: ValueStore::put
    pub fn spawn_put(&self, value: T) {
        let store = self.clone();
        self.ctx.dispatch(move || {
            if let Err(err) = store.blocking_put(value) {
                error!(path = %store.shared.file.display(), error = %err, "fire-and-forget put failed");
            }
        });
    }

    /// Reset this store to "no value" and await the result.
    ///
    /// Unlike [`delete`], the store stays usable afterwards: the backing
    /// file is rewritten with the converter's explicit empty encoding.
    ///
    /// [`delete`]: ValueStore::delete
    pub async fn clear(&self) -> StoreResult<()> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_clear()).await
    }

    /// Reset this store to "no value" on the calling thread.
    pub fn blocking_clear(&self) -> StoreResult<()> {
        let shared = &self.shared;
        shared.lock.run_exclusive(|| {
            shared.ensure_live()?;
            atomic_write(Option::<&T>::None, &*shared.converter, &shared.file)?;
            shared.publish(ValueUpdate::empty());
            Ok(())
        })
    }

    /// Clear without waiting for the outcome; failures are logged.
    pub fn spawn_clear(&self) {
        let store = self.clone();
        self.ctx.dispatch(move || {
            if let Err(err) = store.blocking_clear() {
                error!(path = %store.shared.file.display(), error = %err, "fire-and-forget clear failed");
            }
        });
    }

    /// Remove the backing file and render this store permanently unusable.
    ///
    /// Observers receive one final empty update and then their stream
    /// terminates. Every subsequent operation on this instance fails with
    /// [`StoreError::Deleted`]; obtain a fresh store from the provider to
    /// reuse the key.
    pub async fn delete(&self) -> StoreResult<()> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_delete()).await
    }

    /// Delete on the calling thread.
    pub fn blocking_delete(&self) -> StoreResult<()> {
        let shared = &self.shared;
        shared.lock.run_exclusive(|| {
            shared.ensure_live()?;
            match fs::remove_file(&shared.file) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            shared.deleted.store(true, Ordering::Release);
            debug!(path = %shared.file.display(), "store deleted");
            shared.publish(ValueUpdate::empty());
            shared.close();
            Ok(())
        })
    }

    /// Delete without waiting for the outcome; failures are logged.
    pub fn spawn_delete(&self) {
        let store = self.clone();
        self.ctx.dispatch(move || {
            if let Err(err) = store.blocking_delete() {
                error!(path = %store.shared.file.display(), error = %err, "fire-and-forget delete failed");
            }
        });
    }

    /// Observe this store. The stream immediately yields the current state,
    /// then every subsequent update, and terminates when the store is
    /// deleted. Each subscriber gets its own replay of the current state.
    pub async fn observe(&self) -> StoreResult<ValueUpdates<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_observe()).await
    }

    /// Subscribe on the calling thread.
    pub fn blocking_observe(&self) -> StoreResult<ValueUpdates<T>> {
        let shared = &self.shared;
        shared.lock.run_shared(|| {
            shared.ensure_live()?;
            // Subscribing under the read lock makes the replay snapshot and
            // the live subscription consistent: no write can land between.
            let rx = shared.subscribe().ok_or(StoreError::Deleted)?;
            let current = read_current(shared)?;
            Ok(Updates::new(ValueUpdate { value: current }, rx))
        })
    }
}

/// Read the persisted value. Callers must hold at least the read lock.
fn read_current<T, C>(shared: &Shared<T, C>) -> StoreResult<Option<T>>
where
    T: DeserializeOwned,
    C: Converter,
{
    if !shared.file.exists() {
        return Ok(None);
    }
    Ok(shared.converter.read(&shared.file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonConverter;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    fn store(dir: &Path) -> ValueStore<TestData, JsonConverter> {
        ValueStore::new(
            dir.join("value"),
            Arc::new(JsonConverter::new()),
            ExecutionContext::inline(),
        )
    }

    #[tokio::test]
    async fn fresh_store_has_no_value() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let data = TestData {
            name: "A".to_string(),
            value: 1,
        };
        let written = store.put(data.clone()).await.unwrap();
        assert_eq!(written, data);
        assert_eq!(store.get().await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn clear_keeps_store_usable() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store
            .put(TestData {
                name: "A".to_string(),
                value: 1,
            })
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);

        let second = TestData {
            name: "B".to_string(),
            value: 2,
        };
        store.put(second.clone()).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn deleted_store_rejects_every_operation() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store
            .put(TestData {
                name: "A".to_string(),
                value: 1,
            })
            .await
            .unwrap();
        store.delete().await.unwrap();

        assert!(matches!(store.get().await, Err(StoreError::Deleted)));
        assert!(matches!(
            store
                .put(TestData {
                    name: "B".to_string(),
                    value: 2,
                })
                .await,
            Err(StoreError::Deleted)
        ));
        assert!(matches!(store.clear().await, Err(StoreError::Deleted)));
        assert!(matches!(store.delete().await, Err(StoreError::Deleted)));
        assert!(matches!(store.observe().await, Err(StoreError::Deleted)));
    }

    #[tokio::test]
    async fn observe_replays_then_streams() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let mut updates = store.observe().await.unwrap();
        assert_eq!(updates.next().await, Some(ValueUpdate::empty()));

        let data = TestData {
            name: "A".to_string(),
            value: 1,
        };
        store.put(data.clone()).await.unwrap();
        assert_eq!(updates.next().await, Some(ValueUpdate::of(data)));

        store.clear().await.unwrap();
        assert_eq!(updates.next().await, Some(ValueUpdate::empty()));
    }

    #[tokio::test]
    async fn observers_terminate_on_delete() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let mut first = store.observe().await.unwrap();
        let mut second = store.observe().await.unwrap();
        store.delete().await.unwrap();

        // Replay state, the final empty update, then termination.
        for updates in [&mut first, &mut second] {
            assert_eq!(updates.next().await, Some(ValueUpdate::empty()));
            assert_eq!(updates.next().await, Some(ValueUpdate::empty()));
            assert_eq!(updates.next().await, None);
        }
    }

    #[tokio::test]
    async fn clones_share_state_and_observers() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let clone = store.clone();

        let mut updates = clone.observe().await.unwrap();
        assert_eq!(updates.next().await, Some(ValueUpdate::empty()));

        let data = TestData {
            name: "A".to_string(),
            value: 1,
        };
        store.put(data.clone()).await.unwrap();
        assert_eq!(clone.get().await.unwrap(), Some(data.clone()));
        assert_eq!(updates.next().await, Some(ValueUpdate::of(data)));
    }
}
