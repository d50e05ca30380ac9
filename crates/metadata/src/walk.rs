use crate::entry::{Entry, EntryMode, ScanOptions};
use crate::error::{ErrorKind, Result};
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::{self, DirEntry};

pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;

enum WalkEntry {
    Entry(Entry),
    Descend(PathBuf),
}

/// Stream every non-directory entry below `root`.
///
/// Directories are walked depth-first. Symbolic links are reported as entries
/// and never descended into, even when they point at a directory. Errors for
/// individual entries are yielded and the walk carries on.
pub fn walk<'a>(root: &'a Path, options: ScanOptions) -> EntryStream<'a> {
    let mut stack = vec![root.to_path_buf()];
    Box::pin(stream! {
        'dirs: while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) => {
                    yield Err(exn::Exn::from(ErrorKind::from_io(e, &current)));
                    continue 'dirs;
                },
            };
            'entries: loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break 'entries,
                    Err(e) => {
                        yield Err(exn::Exn::from(ErrorKind::from_io(e, &current)));
                        continue 'entries;
                    },
                };
                match process_entry(entry, root, options).await {
                    Ok(WalkEntry::Entry(e)) => yield Ok(e),
                    Ok(WalkEntry::Descend(d)) => stack.push(d),
                    Err(e) => yield Err(e),
                }
            }
        }
    })
}

async fn process_entry(entry: DirEntry, root: &Path, options: ScanOptions) -> Result<WalkEntry> {
    let path = entry.path();
    // DirEntry::file_type() doesn't follow symlinks, which is exactly what we want.
    let file_type = entry.file_type().await.map_err(|e| ErrorKind::from_io(e, &path))?;
    if EntryMode::from(file_type) == EntryMode::Directory {
        return Ok(WalkEntry::Descend(path));
    }
    Ok(WalkEntry::Entry(Entry::stat(path, root, options).await?))
}

/// Collect every non-directory entry below `root`, sorted by path.
///
/// Entries that fail while walking (a subdirectory that can't be read, a file
/// removed between listing and stat) are logged and left out; the rest of the
/// tree is still returned.
///
/// # Errors
/// - [`NotFound`](ErrorKind::NotFound) if `root` doesn't exist.
/// - [`NotADirectory`](ErrorKind::NotADirectory) if `root` isn't a directory.
/// - [`PermissionDenied`](ErrorKind::PermissionDenied) if `root` itself can't
///   be read.
/// - [`Empty`](ErrorKind::Empty) if nothing but directories was found.
pub async fn list(root: &Path, options: ScanOptions) -> Result<Vec<Entry>> {
    let metadata = fs::metadata(root).await.map_err(|e| ErrorKind::from_io(e, root))?;
    if !metadata.is_dir() {
        exn::bail!(ErrorKind::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).await.map_err(|e| ErrorKind::from_io(e, root))?;
    let mut entries = gather(walk(root, options)).await;
    if entries.is_empty() {
        exn::bail!(ErrorKind::Empty(root.to_path_buf()));
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

async fn gather(mut stream: EntryStream<'_>) -> Vec<Entry> {
    let mut entries = Vec::new();
    while let Some(entry) = stream.next().await {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(error = %e, "Leaving entry out of listing"),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, data: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_list_nested() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "a.txt", b"a");
        write(temp_dir.path(), "dir/b.txt", b"bb");
        write(temp_dir.path(), "dir/deeper/c.txt", b"ccc");
        std::fs::create_dir_all(temp_dir.path().join("empty/dir")).unwrap();

        let entries = list(temp_dir.path(), ScanOptions::default()).await.unwrap();
        let relative: Vec<_> = entries.iter().map(|e| e.relative_path().to_path_buf()).collect();
        assert_eq!(
            relative,
            vec![PathBuf::from("a.txt"), PathBuf::from("dir/b.txt"), PathBuf::from("dir/deeper/c.txt")]
        );
        assert_eq!(entries.iter().map(|e| e.size).sum::<u64>(), 6);
        assert!(entries.iter().all(|e| e.root == temp_dir.path()));
    }

    #[tokio::test]
    async fn test_list_only_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("a/b/c")).unwrap();
        let err = list(temp_dir.path(), ScanOptions::default()).await.unwrap_err();
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_list_not_a_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "file.txt", b"data");
        let err = list(&temp_dir.path().join("file.txt"), ScanOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
        let err = list(&temp_dir.path().join("missing"), ScanOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_does_not_follow_directory_links() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "real/file.txt", b"data");
        std::os::unix::fs::symlink(temp_dir.path().join("real"), temp_dir.path().join("alias")).unwrap();

        let entries: Vec<_> = walk(temp_dir.path(), ScanOptions::default()).collect().await;
        let mut entries: Vec<Entry> = entries.into_iter().map(|e| e.unwrap()).collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].relative_path(), Path::new("alias"));
        assert_eq!(entries[0].mode, EntryMode::Link);
        // A link to a directory has no readable content.
        assert!(!entries[0].readable);
        assert_eq!(entries[1].relative_path(), Path::new("real/file.txt"));
    }

    #[tokio::test]
    async fn test_gather_skips_failed_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "a.txt", b"a");
        write(temp_dir.path(), "b.txt", b"bb");
        let a = Entry::stat(temp_dir.path().join("a.txt"), temp_dir.path(), ScanOptions::default()).await.unwrap();
        let b = Entry::stat(temp_dir.path().join("b.txt"), temp_dir.path(), ScanOptions::default()).await.unwrap();
        let items: Vec<Result<Entry>> = vec![
            Ok(a.clone()),
            Err(exn::Exn::from(ErrorKind::NotFound(temp_dir.path().join("vanished.txt")))),
            Err(exn::Exn::from(ErrorKind::PermissionDenied(temp_dir.path().join("locked")))),
            Ok(b.clone()),
        ];
        let entries = gather(Box::pin(futures::stream::iter(items))).await;
        assert_eq!(entries, vec![a, b]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_survives_unreadable_subdirectory() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "a.txt", b"a");
        write(temp_dir.path(), "locked/b.txt", b"bb");
        let locked = temp_dir.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still read it; either way the batch isn't lost.
        let entries = list(temp_dir.path(), ScanOptions::default()).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        let entries = entries.unwrap();
        assert_eq!(entries[0].relative_path(), Path::new("a.txt"));
        assert!(entries.len() <= 2);
    }
}
