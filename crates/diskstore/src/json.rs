//! JSON converter, the default format for stores.
//!
//! Values are written as pretty-printed JSON. The empty encoding is the JSON
//! literal `null`; a zero-length file (the provider creates backing files
//! empty) also decodes to "nothing".

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::converter::{Converter, ConverterError};

/// Converter storing values as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl JsonConverter {
    /// Create a new JSON converter.
    pub fn new() -> Self {
        Self
    }
}

impl Converter for JsonConverter {
    fn write<T: Serialize>(&self, value: Option<&T>, file: &Path) -> Result<(), ConverterError> {
        debug!(path = %file.display(), "encoding JSON");
        let content = serde_json::to_string_pretty(&value)?;
        fs::write(file, content)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, file: &Path) -> Result<Option<T>, ConverterError> {
        debug!(path = %file.display(), "decoding JSON");
        let content = fs::read_to_string(file)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str(&content)?)
    }
}
