//! Bincode converter.

use diskstore::{Converter, ConverterError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Converter storing values as compact bincode.
///
/// The empty encoding is a serialized `Option::None`; a zero-length file
/// (as created eagerly by the provider) also reads as "nothing".
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeConverter;

impl BincodeConverter {
    /// Create a new bincode converter.
    pub fn new() -> Self {
        Self
    }
}

impl Converter for BincodeConverter {
    fn write<T: Serialize>(&self, value: Option<&T>, file: &Path) -> Result<(), ConverterError> {
        debug!(path = %file.display(), "encoding bincode");
        let bytes = bincode::serialize(&value)
            .map_err(|err| ConverterError::with_source("bincode encoding failed", err))?;
        fs::write(file, bytes)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, file: &Path) -> Result<Option<T>, ConverterError> {
        debug!(path = %file.display(), "decoding bincode");
        let bytes = fs::read(file)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        bincode::deserialize(&bytes)
            .map_err(|err| ConverterError::with_source("bincode decoding failed", err))
    }
}
