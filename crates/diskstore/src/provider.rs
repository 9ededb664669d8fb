//! Store provider: maps logical keys to stores backed by files in one
//! directory.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::converter::Converter;
use crate::error::{StoreError, StoreResult};
use crate::list::ListStore;
use crate::value::ValueStore;

/// Hands out [`ValueStore`]s and [`ListStore`]s backed by files inside one
/// directory, all sharing a converter and a default execution context.
///
/// The directory and each store's backing file are created eagerly when a
/// store is requested; a failure there is a configuration error reported
/// from the requesting call, not from later operations.
///
/// Each store instance carries its own lock. Requesting the same key twice
/// yields two instances that do *not* share a lock, so callers that want
/// true mutual exclusion must keep a single instance (clones of it are
/// fine) per key.
pub struct StoreProvider<C> {
    directory: PathBuf,
    converter: Arc<C>,
    ctx: ExecutionContext,
}

impl<C: Converter + 'static> StoreProvider<C> {
    /// Create a provider storing files under `directory`, with the default
    /// serial-worker execution context.
    pub fn new(directory: impl Into<PathBuf>, converter: C) -> Self {
        Self::with_context(directory, converter, ExecutionContext::worker())
    }

    /// Create a provider with a caller-supplied execution context (for
    /// example [`ExecutionContext::inline`] in tests).
    pub fn with_context(
        directory: impl Into<PathBuf>,
        converter: C,
        ctx: ExecutionContext,
    ) -> Self {
        Self {
            directory: directory.into(),
            converter: Arc::new(converter),
            ctx,
        }
    }

    /// A single-value store for `key`.
    pub fn value_store<T>(&self, key: &str) -> StoreResult<ValueStore<T, C>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let file = self.file_for(key)?;
        Ok(ValueStore::new(file, self.converter.clone(), self.ctx.clone()))
    }

    /// A list store for `key`.
    pub fn list_store<T>(&self, key: &str) -> StoreResult<ListStore<T, C>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let file = self.file_for(key)?;
        Ok(ListStore::new(file, self.converter.clone(), self.ctx.clone()))
    }

    /// Resolve `key` to a backing file, creating the directory and an empty
    /// file eagerly so later operations only deal with content.
    fn file_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        fs::create_dir_all(&self.directory)?;

        let file = self.directory.join(key);
        match OpenOptions::new().write(true).create_new(true).open(&file) {
            Ok(_) => debug!(path = %file.display(), "created backing file"),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }
        Ok(file)
    }
}

/// Reject keys that would escape the provider's directory.
fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::invalid_key("key cannot be empty"));
    }
    if key.contains('/') || key.contains('\\') || key == "." || key == ".." {
        return Err(StoreError::invalid_key(format!(
            "invalid key component: {key}"
        )));
    }
    Ok(())
}
