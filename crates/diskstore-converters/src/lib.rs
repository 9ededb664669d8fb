//! Extra converter formats for `diskstore`.
//!
//! The core crate ships JSON as its default format; this crate adds:
//!
//! - [`YamlConverter`] -- human-editable files
//! - [`BincodeConverter`] -- compact binary files
//!
//! Both honor the converter contract: `write(None, ..)` produces an explicit
//! empty encoding, and reading an empty or emptied file yields `Ok(None)`
//! rather than a decode error.

pub mod bincode;
pub mod yaml;

pub use crate::bincode::BincodeConverter;
pub use crate::yaml::YamlConverter;
