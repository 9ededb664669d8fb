//! List store: an ordered sequence of values persisted under a key.
//!
//! Deliberate asymmetry with the value store: an absent backing file reads
//! as an empty list, never as "no value". Every mutation runs its whole
//! read-modify-write sequence inside one exclusive-lock critical section,
//! so concurrent callers cannot lose updates.

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
use crate::value::UPDATE_CAPACITY;
use crate::write::atomic_write;

/// Update stream returned by [`ListStore::observe`]. Each item is the full
/// list as persisted after an operation; the empty list doubles as the
/// idle/replay state of a store with no backing data.
pub type ListUpdates<T> = Updates<Vec<T>>;

/// Store an ordered list of `T` in one file on disk.
///
/// Created through a [`StoreProvider`](crate::StoreProvider). Cloning is
/// cheap; clones share the same lock and observer channel.
pub struct ListStore<T, C> {
    shared: Arc<Shared<T, C>>,
    ctx: ExecutionContext,
}

struct Shared<T, C> {
    file: PathBuf,
    converter: Arc<C>,
    lock: StoreLock,
    deleted: AtomicBool,
    updates: Mutex<Option<broadcast::Sender<Vec<T>>>>,
}

impl<T, C> Clone for ListStore<T, C> {
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

    fn publish(&self, list: Vec<T>) {
        let senders = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = senders.as_ref() {
            let _ = tx.send(list);
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<Vec<T>>> {
        let senders = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        senders.as_ref().map(|tx| tx.subscribe())
    }

    fn close(&self) {
        let mut senders = self.updates.lock().unwrap_or_else(PoisonError::into_inner);
        *senders = None;
    }
}

impl<T, C> ListStore<T, C>
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
    pub fn with_context(&self, ctx: ExecutionContext) -> Self {
        Self {
            shared: self.shared.clone(),
            ctx,
        }
    }

    /// Read the current list, dispatched on this store's execution context.
    ///
    /// A store with no persisted data yields an empty list, not an error.
    pub async fn get(&self) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_get()).await
    }

    /// Read the current list on the calling thread.
    pub fn blocking_get(&self) -> StoreResult<Vec<T>> {
        let shared = &self.shared;
        shared.lock.run_shared(|| {
            shared.ensure_live()?;
            read_list(shared)
        })
    }

    /// Replace the whole list and await the result. Returns the list
    /// written, useful for chaining.
    pub async fn put(&self, list: Vec<T>) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_put(list)).await
    }

    /// Replace the whole list on the calling thread.
    pub fn blocking_put(&self, list: Vec<T>) -> StoreResult<Vec<T>> {
        self.mutate(move |_| Mutation::write(list))
    }

    /// Replace the whole list without waiting; failures are logged.
    pub fn spawn_put(&self, list: Vec<T>) {
        self.spawn_op("put", move |store| store.blocking_put(list));
    }

    /// Reset to the empty list. The store stays usable, unlike [`delete`].
    ///
    /// [`delete`]: ListStore::delete
    pub async fn clear(&self) -> StoreResult<()> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_clear()).await
    }

    /// Reset to the empty list on the calling thread.
    pub fn blocking_clear(&self) -> StoreResult<()> {
        self.mutate(|_| Mutation::write(Vec::new())).map(|_| ())
    }

    /// Clear without waiting; failures are logged.
    pub fn spawn_clear(&self) {
        self.spawn_op("clear", |store| store.blocking_clear());
    }

    /// Append a value to the list. Creates the list if it does not exist
    /// yet. Returns the new list.
    pub async fn add(&self, value: T) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_add(value)).await
    }

    /// Append on the calling thread.
    pub fn blocking_add(&self, value: T) -> StoreResult<Vec<T>> {
        self.mutate(move |mut list| {
            list.push(value);
            Mutation::write(list)
        })
    }

    /// Append without waiting; failures are logged.
    pub fn spawn_add(&self, value: T) {
        self.spawn_op("add", move |store| store.blocking_add(value));
    }

    /// Remove the first element equal to `value`, if any. When nothing
    /// matches, nothing is written but the unchanged list is still returned
    /// and published to observers.
    pub async fn remove(&self, value: T) -> StoreResult<Vec<T>>
    where
        T: PartialEq,
    {
        self.remove_matching(move |element| *element == value).await
    }

    /// Remove by equality on the calling thread.
    pub fn blocking_remove(&self, value: &T) -> StoreResult<Vec<T>>
    where
        T: PartialEq,
    {
        self.blocking_remove_matching(|element| element == value)
    }

    /// Remove the first element for which `predicate` returns `true`.
    ///
    /// When nothing matches, the write is skipped but the unchanged list is
    /// still returned and published.
    pub async fn remove_matching(
        &self,
        predicate: impl FnMut(&T) -> bool + Send + 'static,
    ) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx
            .run(move || store.blocking_remove_matching(predicate))
            .await
    }

    /// Remove by predicate on the calling thread.
    pub fn blocking_remove_matching(
        &self,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> StoreResult<Vec<T>> {
        self.mutate(move |mut list| {
            match list.iter().position(&mut predicate) {
                Some(index) => {
                    list.remove(index);
                    Mutation::write(list)
                }
                // Nothing matched: skip the disk write, still notify.
                None => Mutation::keep(list),
            }
        })
    }

    /// Remove by predicate without waiting; failures are logged.
    pub fn spawn_remove_matching(&self, predicate: impl FnMut(&T) -> bool + Send + 'static) {
        self.spawn_op("remove", move |store| {
            store.blocking_remove_matching(predicate)
        });
    }

    /// Remove by equality without waiting; failures are logged.
    pub fn spawn_remove(&self, value: T)
    where
        T: PartialEq,
    {
        self.spawn_op("remove", move |store| store.blocking_remove(&value));
    }

    /// Remove the element at `position`. An out-of-range position fails
    /// fast with [`StoreError::OutOfBounds`] before anything is written,
    /// and observers are not notified.
    pub async fn remove_at(&self, position: usize) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_remove_at(position)).await
    }

    /// Remove by position on the calling thread.
    pub fn blocking_remove_at(&self, position: usize) -> StoreResult<Vec<T>> {
        self.mutate(move |mut list| {
            if position >= list.len() {
                return Mutation::fail(StoreError::OutOfBounds {
                    index: position,
                    len: list.len(),
                });
            }
            list.remove(position);
            Mutation::write(list)
        })
    }

    /// Remove by position without waiting; failures (including an
    /// out-of-range position) are logged.
    pub fn spawn_remove_at(&self, position: usize) {
        self.spawn_op("remove_at", move |store| store.blocking_remove_at(position));
    }

    /// Replace the first element for which `predicate` returns `true` with
    /// `value`, keeping its position. When nothing matches the list is left
    /// unchanged (no append, no write), but still returned and published.
    pub async fn replace(
        &self,
        value: T,
        predicate: impl FnMut(&T) -> bool + Send + 'static,
    ) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx
            .run(move || store.blocking_replace(value, predicate))
            .await
    }

    /// Replace in place on the calling thread.
    pub fn blocking_replace(
        &self,
        value: T,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> StoreResult<Vec<T>> {
        self.mutate(move |mut list| match list.iter().position(&mut predicate) {
            Some(index) => {
                list[index] = value;
                Mutation::write(list)
            }
            None => Mutation::keep(list),
        })
    }

    /// Replace in place without waiting; failures are logged.
    pub fn spawn_replace(&self, value: T, predicate: impl FnMut(&T) -> bool + Send + 'static) {
        self.spawn_op("replace", move |store| {
            store.blocking_replace(value, predicate)
        });
    }

    /// Replace the first match in place, or append `value` when nothing
    /// matches. Always persists; changes the list length by at most one and
    /// never fails on "not found".
    pub async fn add_or_replace(
        &self,
        value: T,
        predicate: impl FnMut(&T) -> bool + Send + 'static,
    ) -> StoreResult<Vec<T>> {
        let store = self.clone();
        self.ctx
            .run(move || store.blocking_add_or_replace(value, predicate))
            .await
    }

    /// Add-or-replace on the calling thread.
    pub fn blocking_add_or_replace(
        &self,
        value: T,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> StoreResult<Vec<T>> {
        self.mutate(move |mut list| {
            match list.iter().position(&mut predicate) {
                Some(index) => list[index] = value,
                None => list.push(value),
            }
            Mutation::write(list)
        })
    }

    /// Add-or-replace without waiting; failures are logged.
    pub fn spawn_add_or_replace(
        &self,
        value: T,
        predicate: impl FnMut(&T) -> bool + Send + 'static,
    ) {
        self.spawn_op("add_or_replace", move |store| {
            store.blocking_add_or_replace(value, predicate)
        });
    }

    /// Remove the backing file and render this store permanently unusable.
    ///
    /// Observers receive one final empty list and then their stream
    /// terminates. Every subsequent operation fails with
    /// [`StoreError::Deleted`].
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
            debug!(path = %shared.file.display(), "list store deleted");
            shared.publish(Vec::new());
            shared.close();
            Ok(())
        })
    }

    /// Delete without waiting; failures are logged.
    pub fn spawn_delete(&self) {
        self.spawn_op("delete", |store| store.blocking_delete());
    }

    /// Observe this store: replay of the current list, then every update,
    /// terminating when the store is deleted.
    pub async fn observe(&self) -> StoreResult<ListUpdates<T>> {
        let store = self.clone();
        self.ctx.run(move || store.blocking_observe()).await
    }

    /// Subscribe on the calling thread.
    pub fn blocking_observe(&self) -> StoreResult<ListUpdates<T>> {
        let shared = &self.shared;
        shared.lock.run_shared(|| {
            shared.ensure_live()?;
            let rx = shared.subscribe().ok_or(StoreError::Deleted)?;
            let current = read_list(shared)?;
            Ok(Updates::new(current, rx))
        })
    }

    /// Run one read-modify-write cycle under the exclusive lock: read the
    /// current list, apply `op`, persist if requested, publish the result.
    fn mutate(&self, op: impl FnOnce(Vec<T>) -> Mutation<T>) -> StoreResult<Vec<T>> {
        let shared = &self.shared;
        shared.lock.run_exclusive(|| {
            shared.ensure_live()?;
            let list = read_list(shared)?;
            match op(list) {
                Mutation::Write(list) => {
                    atomic_write(Some(&list), &*shared.converter, &shared.file)?;
                    shared.publish(list.clone());
                    Ok(list)
                }
                Mutation::Keep(list) => {
                    shared.publish(list.clone());
                    Ok(list)
                }
                Mutation::Fail(err) => Err(err),
            }
        })
    }

    fn spawn_op<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Self) -> StoreResult<R> + Send + 'static,
    ) where
        R: Send + 'static,
    {
        let store = self.clone();
        self.ctx.dispatch(move || {
            if let Err(err) = f(&store) {
                error!(
                    path = %store.shared.file.display(),
                    op,
                    error = %err,
                    "fire-and-forget list operation failed"
                );
            }
        });
    }
}

/// Outcome of a list mutation closure.
enum Mutation<T> {
    /// Persist the list, then publish it.
    Write(Vec<T>),
    /// Skip the disk write but still publish the (unchanged) list.
    Keep(Vec<T>),
    /// Abort before any I/O.
    Fail(StoreError),
}

impl<T> Mutation<T> {
    fn write(list: Vec<T>) -> Self {
        Self::Write(list)
    }

    fn keep(list: Vec<T>) -> Self {
        Self::Keep(list)
    }

    fn fail(err: StoreError) -> Self {
        Self::Fail(err)
    }
}

/// Read the persisted list. Callers must hold at least the read lock.
fn read_list<T, C>(shared: &Shared<T, C>) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
    C: Converter,
{
    if !shared.file.exists() {
        return Ok(Vec::new());
    }
    let list: Option<Vec<T>> = shared.converter.read(&shared.file)?;
    Ok(list.unwrap_or_default())
}
