//! Per-store reader/writer lock with read-to-write escalation.
//!
//! Each store instance owns one [`StoreLock`]. Reads are reentrant per
//! thread and run concurrently with each other; writes are exclusive and
//! reentrant per thread. A thread that enters [`StoreLock::run_exclusive`]
//! while holding read locks releases all of them first, takes the write
//! lock, and re-takes the same number of read holds before releasing the
//! write lock again (a lock downgrade). Without that protocol a nested
//! read-then-write call chain would deadlock against its own read holds.
//!
//! Locks are per store *instance*: two stores obtained for the same key do
//! not share one, which is why callers must not keep two live instances for
//! a key they mutate concurrently.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

pub(crate) struct StoreLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

#[derive(Default)]
struct LockState {
    /// Read-hold count per thread.
    readers: HashMap<ThreadId, usize>,
    /// Thread currently holding the write lock, if any.
    writer: Option<ThreadId>,
    /// Reentrant write-hold count for `writer`.
    writer_holds: usize,
}

impl StoreLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            cond: Condvar::new(),
        }
    }

    /// Run `f` while holding the read lock.
    pub fn run_shared<R>(&self, f: impl FnOnce() -> R) -> R {
        self.acquire_read();
        let _guard = ReadGuard(self);
        f()
    }

    /// Run `f` while holding the write lock, escalating from any read holds
    /// the calling thread currently has.
    pub fn run_exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let me = thread::current().id();

        // Drop this thread's read holds so the write acquisition cannot
        // deadlock against them. A thread already holding the write lock
        // keeps its reads (it cannot block itself).
        let dropped = {
            let mut state = self.lock_state();
            if state.writer == Some(me) {
                0
            } else {
                state.readers.remove(&me).unwrap_or(0)
            }
        };
        if dropped > 0 {
            self.cond.notify_all();
        }

        self.acquire_write(me);
        let _guard = WriteGuard {
            lock: self,
            reacquire: dropped,
        };
        f()
    }

    fn acquire_read(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        // A thread holding the write lock may take reads (downgrade path).
        while state.writer.is_some_and(|w| w != me) {
            state = self.wait(state);
        }
        *state.readers.entry(me).or_insert(0) += 1;
    }

    fn acquire_write(&self, me: ThreadId) {
        let mut state = self.lock_state();
        if state.writer == Some(me) {
            state.writer_holds += 1;
            return;
        }
        while state.writer.is_some() || !state.readers.is_empty() {
            state = self.wait(state);
        }
        state.writer = Some(me);
        state.writer_holds = 1;
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn read_holds(&self) -> usize {
        let me = thread::current().id();
        self.lock_state().readers.get(&me).copied().unwrap_or(0)
    }
}

struct ReadGuard<'a>(&'a StoreLock);

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut state = self.0.lock_state();
        if let Some(count) = state.readers.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&me);
            }
        }
        drop(state);
        self.0.cond.notify_all();
    }
}

struct WriteGuard<'a> {
    lock: &'a StoreLock,
    reacquire: usize,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut state = self.lock.lock_state();
        // Restore the read holds dropped on entry while still holding the
        // write lock, so no other writer can slip in between.
        if self.reacquire > 0 {
            *state.readers.entry(me).or_insert(0) += self.reacquire;
        }
        state.writer_holds -= 1;
        if state.writer_holds == 0 {
            state.writer = None;
        }
        drop(state);
        self.lock.cond.notify_all();
    }
}
