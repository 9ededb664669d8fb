//! File-backed observable value and list stores.
//!
//! `diskstore` persists a single value or a homogeneous list of values under
//! a key, one file per key, as a lightweight alternative to a database for
//! applications that need durable, observable state without query semantics.
//!
//! # Pieces
//!
//! - [`StoreProvider`] -- maps keys to stores backed by files in a directory
//! - [`ValueStore`] -- at most one value per key; absent file means "no value"
//! - [`ListStore`] -- an ordered list per key; absent file means "empty list"
//! - [`Converter`] -- pluggable typed encode/decode ([`JsonConverter`] is the
//!   default; more formats live in the `diskstore-converters` crate)
//! - [`ExecutionContext`] -- injected dispatch strategy for async entry
//!   points (serial worker by default)
//!
//! # Design Rules
//!
//! 1. The file on disk is the authoritative state; stores keep nothing in
//!    memory between operations.
//! 2. Writes go through write-to-temp-then-rename, so a backing file never
//!    holds a partially written value.
//! 3. Every read-modify-write runs in one exclusive-lock critical section;
//!    readers run concurrently with each other but never with a writer.
//! 4. Observers always receive the current persisted state on subscribe,
//!    then every subsequent change, and a terminal end-of-stream on delete.
//! 5. All I/O errors are propagated, never silently ignored; fire-and-forget
//!    entry points surface failures through error-level logs.
//!
//! # Example
//!
//! ```no_run
//! use diskstore::{JsonConverter, StoreProvider};
//!
//! # async fn demo() -> diskstore::StoreResult<()> {
//! let provider = StoreProvider::new("/var/lib/myapp", JsonConverter::new());
//! let names = provider.list_store::<String>("names")?;
//!
//! names.add("amy".to_string()).await?;
//! let mut updates = names.observe().await?;
//! while let Some(list) = updates.next().await {
//!     println!("names now: {list:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod converter;
pub mod error;
pub mod json;
pub mod list;
pub mod observe;
pub mod provider;
pub mod value;

mod lock;
mod write;

// Re-export primary types at crate root for ergonomic imports.
pub use context::ExecutionContext;
pub use converter::{Converter, ConverterError};
pub use error::{StoreError, StoreResult};
pub use json::JsonConverter;
pub use list::{ListStore, ListUpdates};
pub use observe::Updates;
pub use provider::StoreProvider;
pub use value::{ValueStore, ValueUpdate, ValueUpdates};
