//! YAML converter.

use diskstore::{Converter, ConverterError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Converter storing values as YAML.
///
/// The empty encoding is the YAML `null` document.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlConverter;

impl YamlConverter {
    /// Create a new YAML converter.
    pub fn new() -> Self {
        Self
    }
}

impl Converter for YamlConverter {
    fn write<T: Serialize>(&self, value: Option<&T>, file: &Path) -> Result<(), ConverterError> {
        debug!(path = %file.display(), "encoding YAML");
        let content = serde_yaml::to_string(&value)
            .map_err(|err| ConverterError::with_source("YAML encoding failed", err))?;
        fs::write(file, content)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, file: &Path) -> Result<Option<T>, ConverterError> {
        debug!(path = %file.display(), "decoding YAML");
        let content = fs::read_to_string(file)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_yaml::from_str(&content)
            .map_err(|err| ConverterError::with_source("YAML decoding failed", err))
    }
}
