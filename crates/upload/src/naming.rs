//! Deriving destination keys from local paths.

use lofter_config::{Naming, Objects};
use std::path::{Component, Path, PathBuf};

/// The directory keys are computed relative to, for an upload of `path`.
///
/// Directories keep their own name in keys (the search root is their
/// parent) unless `omit_root_dir` is set. Files always use their parent.
pub fn search_root(path: &Path, is_dir: bool, objects: &Objects) -> PathBuf {
    if is_dir && objects.omit_root_dir {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// The destination key for the entry at `path`.
///
/// Keys always use `/` and never start with one. Validation happens later,
/// in the backend object.
pub fn object_key(objects: &Objects, search_root: &Path, path: &Path) -> String {
    let relative = match objects.naming {
        Naming::Relative => path.strip_prefix(search_root).unwrap_or(path),
        Naming::Absolute => path,
    };
    let key = join(relative);
    match objects.prefix.as_deref().map(|p| p.trim_matches('/')) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{key}"),
        _ => key,
    }
}

fn join(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
