//! Object key validation.
//!
//! Keys are derived from local filesystem paths, so they get the same
//! treatment a path would: no escaping the destination root, no NUL bytes,
//! nothing platform-specific. Valid keys always use `/` as the separator.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a destination key for security and correctness, returning the
/// normalized `/`-separated form.
///
/// # Examples
///
/// ```
/// use lofter_storage::validate_key;
/// // Valid keys
/// assert_eq!(validate_key("photos/2024/cat.jpg").unwrap(), "photos/2024/cat.jpg");
/// assert_eq!(validate_key("/backups//./notes.txt").unwrap(), "backups/notes.txt");
/// assert_eq!(validate_key("a/../file.txt").unwrap(), "file.txt");
/// // Invalid keys
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a/../../b").is_err());
/// assert!(validate_key("a\0b").is_err());
/// assert!(validate_key("").is_err());
/// ```
pub fn validate_key(key: impl AsRef<Path>) -> Result<String> {
    let path = key.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                let Some(s) = s.to_str() else {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                };
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.join("/")),
    }
}

/// Join a validated key onto a local destination root.
pub(crate) fn key_to_path(root: &Path, key: &str) -> Result<PathBuf> {
    let validated = validate_key(key)?;
    Ok(root.join(validated))
}
