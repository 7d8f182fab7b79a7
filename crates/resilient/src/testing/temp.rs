//! Temporary settings files

#![allow(clippy::missing_errors_doc)]

use std::io::{self, Write};

use tempfile::NamedTempFile;

/// Write `contents` to a temporary file ending in `.{extension}`
///
/// The file is deleted when the handle drops.
pub fn settings_file(contents: &str, extension: &str) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("resilient-settings-")
        .suffix(&format!(".{extension}"))
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}
