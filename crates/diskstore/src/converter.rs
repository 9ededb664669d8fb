//! The converter boundary: pluggable typed encode/decode to and from files.
//!
//! A [`Converter`] turns values of a declared type into bytes on disk and
//! back. The store engine never interprets file contents itself; converters
//! own the format entirely. The engine only requires that an explicit "empty"
//! encoding exists (written by `write(None, ..)`) and that decoding it is
//! distinguishable from a decode failure (`Ok(None)` vs `Err`).

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error reported by a [`Converter`] when encoding or decoding fails.
///
/// Converter failures are opaque to the store engine and never retried; they
/// surface verbatim to the caller of the triggering operation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConverterError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConverterError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error wrapping an underlying cause.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<serde_json::Error> for ConverterError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source("JSON conversion failed", err)
    }
}

impl From<std::io::Error> for ConverterError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source("converter file access failed", err)
    }
}

/// Typed encode/decode of values to and from a file.
///
/// `write(None, ..)` must produce the format's explicit empty encoding so a
/// cleared store remains readable. `read` returns `Ok(None)` for an empty or
/// explicitly-emptied file, reserving `Err` for genuine decode failures.
pub trait Converter: Send + Sync {
    /// Serialize `value` (or the empty encoding) into `file`.
    fn write<T: Serialize>(&self, value: Option<&T>, file: &Path) -> Result<(), ConverterError>;

    /// Deserialize a value of the declared type from `file`.
    fn read<T: DeserializeOwned>(&self, file: &Path) -> Result<Option<T>, ConverterError>;
}
