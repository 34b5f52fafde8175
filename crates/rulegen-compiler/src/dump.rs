//! Diagnostic dump of generated classes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Path a class with internal name `internal_name` is dumped to below `dir`.
pub fn dump_path(dir: &Path, internal_name: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    path.extend(internal_name.split('/'));
    path.set_extension("class");
    path
}

/// Write `bytes` to `<dir>/<internal_name>.class`, creating package
/// directories as needed.
///
/// Failures are logged and otherwise ignored. Returns the path written on
/// success.
pub fn dump_class(dir: &Path, internal_name: &str, bytes: &[u8]) -> Option<PathBuf> {
    let path = dump_path(dir, internal_name);
    match write_file(&path, bytes) {
        Ok(()) => {
            debug!(path = %path.display(), bytes = bytes.len(), "dumped generated class");
            Some(path)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to dump generated class");
            None
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
