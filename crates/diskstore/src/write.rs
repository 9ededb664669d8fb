//! Atomic write protocol: serialize to a temp file, then replace the target.
//!
//! The target file never observes a partially written value. If the converter
//! or the replace step fails, the target keeps whatever valid content it
//! already had and the temp file is removed.

use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::converter::Converter;
use crate::error::StoreResult;

/// Write `value` to `file` through `converter` with replace-on-rename
/// atomicity.
///
/// Callers must hold the store's write lock; this function is not safe
/// against concurrent invocation on the same path.
pub(crate) fn atomic_write<T, C>(value: Option<&T>, converter: &C, file: &Path) -> StoreResult<()>
where
    T: Serialize,
    C: Converter + ?Sized,
{
    let tmp = tmp_path(file);
    if let Err(err) = converter.write(value, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }

    // Some filesystems refuse to overwrite on rename, so clear the target
    // first. A missing target is fine.
    if let Err(err) = fs::remove_file(file) {
        if err.kind() != ErrorKind::NotFound {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
    }

    fs::rename(&tmp, file)?;
    debug!(path = %file.display(), "value persisted");
    Ok(())
}

fn tmp_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
