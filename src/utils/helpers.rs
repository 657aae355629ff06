use std::io;
use std::path::Path;

use snafu::ResultExt;

use crate::error::{MoveFileSnafu, Result};

/// Read an environment variable, treating an empty value as unset.
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Flatten an object key into a single file name component.
///
/// Path separators become `_` and spaces are dropped, so
/// `studies/2020-01-01 scan/img1.dcm` becomes `studies_2020-01-01scan_img1.dcm`.
pub fn sanitize_key(key: &str) -> String {
    key.replace(['/', '\\'], "_").replace(' ', "")
}

/// Last path segment of an object key. Empty for folder placeholders
/// such as `studies/`.
pub fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or_default()
}

/// Hidden/system files such as `.DS_Store`
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

/// Move a file. A rename that fails because `from` and `to` are on
/// different filesystems falls back to copy and remove; any other rename
/// error is returned as is.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(from, to, |path| std::fs::remove_file(path))
        }
        Err(e) => Err(e).context(MoveFileSnafu { from, to }),
    }
}

// the copy is deleted again when the source cannot be removed, so a failed
// move never leaves the file in both places
fn copy_then_remove<F>(from: &Path, to: &Path, remove: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    std::fs::copy(from, to).context(MoveFileSnafu { from, to })?;
    if let Err(e) = remove(from) {
        let _ = std::fs::remove_file(to);
        return Err(e).context(MoveFileSnafu { from, to });
    }
    Ok(())
}
