//! Local filesystem storage backend.
//!
//! "Uploads" into a directory on the local filesystem (a mounted NAS, a
//! second disk, ...). Object keys map onto paths below the configured root
//! and parent directories are created as needed. Files are written next to
//! their destination first and renamed into place, so a destination path
//! never holds a partial file.

use crate::backend::{Object, Operator, SourceFile, Supports};
use crate::error::{ErrorKind, Result};
use crate::path::{key_to_path, validate_key};
use async_trait::async_trait;
use exn::OptionExt;
use lofter_metadata::Entry;
use std::path::{Path, PathBuf};
use tokio::fs;

const SUPPORTS: Supports = Supports::new(true, false, true, false);

/// Local filesystem operator.
///
/// # Examples
///
/// ```no_run
/// use lofter_storage::LocalOperator;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let operator = LocalOperator::new("nas", "/mnt/nas/backups")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalOperator {
    name: String,
    /// Destination root directory
    root: PathBuf,
}
impl LocalOperator {
    /// Create a new local filesystem operator.
    ///
    /// The root doesn't have to exist yet, see
    /// [`bucket_create()`](Operator::bucket_create).
    ///
    /// # Errors
    /// Returns an error if the path is not absolute.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn destination(&self, object: &LocalObject) -> Result<PathBuf> {
        let address = object.address.as_deref().ok_or_raise(|| ErrorKind::NotPrepared(object.key.clone()))?;
        key_to_path(&self.root, address)
    }

    async fn write(&self, object: &LocalObject, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        let partial = partial_path(destination);
        let mut reader = object.source.reader().await?;
        let written = async {
            let mut file = fs::File::create(&partial).await?;
            let written = tokio::io::copy(&mut reader, &mut file).await?;
            file.sync_all().await?;
            fs::rename(&partial, destination).await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;
        match written {
            Ok(written) => Ok(written),
            Err(e) => {
                // Don't leave the partial file lying around, whatever happened.
                _ = fs::remove_file(&partial).await;
                exn::bail!(ErrorKind::from_io(e, destination))
            },
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let name = destination.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    destination.with_file_name(format!(".{name}.partial"))
}

#[async_trait]
impl Operator for LocalOperator {
    type Object = LocalObject;

    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self) -> Supports {
        SUPPORTS
    }

    async fn object_exists(&self, object: &LocalObject) -> Result<bool> {
        let destination = self.destination(object)?;
        Ok(fs::try_exists(&destination).await.map_err(|e| ErrorKind::from_io(e, &destination))?)
    }

    async fn object_upload(&self, object: &mut LocalObject) -> Result<()> {
        let destination = self.destination(object)?;
        let written = self.write(object, &destination).await?;
        tracing::debug!(target = %self.name, key = %object.key, bytes = written, "Wrote object");
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match fs::metadata(&self.root).await {
            Ok(metadata) if metadata.is_dir() => Ok(true),
            Ok(_) => exn::bail!(ErrorKind::InvalidPath(self.root.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => exn::bail!(ErrorKind::from_io(e, &self.root)),
        }
    }

    async fn bucket_create(&self) -> Result<()> {
        Ok(fs::create_dir_all(&self.root).await.map_err(|e| ErrorKind::from_io(e, &self.root))?)
    }
}

/// A file headed for a [`LocalOperator`] destination.
#[derive(Debug)]
pub struct LocalObject {
    source: SourceFile,
    key: String,
    address: Option<String>,
}
impl LocalObject {
    pub fn new(entry: Entry, key: impl Into<String>) -> Self {
        Self {
            source: SourceFile::new(entry),
            key: key.into(),
            address: None,
        }
    }

    /// The validated key, once [`generate()`](Object::generate) succeeded.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }
}

#[async_trait]
impl Object for LocalObject {
    fn key(&self) -> &str {
        &self.key
    }

    async fn generate(&mut self) -> Result<()> {
        self.address = Some(validate_key(&self.key)?);
        Ok(())
    }

    async fn pre(&mut self) -> Result<()> {
        self.source.open().await
    }

    async fn post(&mut self) -> Result<()> {
        self.source.close()
    }

    async fn destroy(&mut self) -> Result<()> {
        self.source.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofter_metadata::ScanOptions;

    async fn object(dir: &Path, name: &str, data: &[u8], key: &str) -> LocalObject {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        LocalObject::new(Entry::stat(&path, dir, ScanOptions::default()).await.unwrap(), key)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalOperator::new("name", temp_dir.path()).is_ok());
        assert!(LocalOperator::new("name", "relative/path").is_err());
        assert!(LocalOperator::new("name", "./relative").is_err());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(partial_path(Path::new("/a/b/file.txt")), Path::new("/a/b/.file.txt.partial"));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let source_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let operator = LocalOperator::new("local", dest_dir.path()).unwrap();
        let mut object = object(source_dir.path(), "file.txt", b"Hello, world!", "a/b/file.txt").await;

        object.generate().await.unwrap();
        assert_eq!(object.address(), Some("a/b/file.txt"));
        assert!(!operator.object_exists(&object).await.unwrap());
        object.pre().await.unwrap();
        operator.object_upload(&mut object).await.unwrap();
        object.post().await.unwrap();
        object.destroy().await.unwrap();

        let written = std::fs::read(dest_dir.path().join("a/b/file.txt")).unwrap();
        assert_eq!(written, b"Hello, world!");
        assert!(!dest_dir.path().join("a/b/.file.txt.partial").exists());
        assert!(operator.object_exists(&object).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrites_existing() {
        let source_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        std::fs::write(dest_dir.path().join("file.txt"), b"old contents, longer than new").unwrap();
        let operator = LocalOperator::new("local", dest_dir.path()).unwrap();
        let mut object = object(source_dir.path(), "file.txt", b"new", "file.txt").await;
        object.generate().await.unwrap();
        object.pre().await.unwrap();
        operator.object_upload(&mut object).await.unwrap();
        assert_eq!(std::fs::read(dest_dir.path().join("file.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_generate_rejects_escaping_key() {
        let source_dir = tempfile::tempdir().unwrap();
        let mut object = object(source_dir.path(), "file.txt", b"data", "../../etc/passwd").await;
        let err = object.generate().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(object.address().is_none());
    }

    #[tokio::test]
    async fn test_operations_before_generate() {
        let source_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let operator = LocalOperator::new("local", dest_dir.path()).unwrap();
        let mut object = object(source_dir.path(), "file.txt", b"data", "file.txt").await;
        let err = operator.object_exists(&object).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotPrepared(_)));
        let err = operator.object_upload(&mut object).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotPrepared(_)));
    }

    #[tokio::test]
    async fn test_upload_before_pre() {
        let source_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let operator = LocalOperator::new("local", dest_dir.path()).unwrap();
        let mut object = object(source_dir.path(), "file.txt", b"data", "file.txt").await;
        object.generate().await.unwrap();
        let err = operator.object_upload(&mut object).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotPrepared(_)));
        // Post without a successful pre has nothing to close; destroy never fails.
        assert!(object.post().await.is_err());
        assert!(object.destroy().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pre_fails_when_link_target_removed() {
        let source_dir = tempfile::tempdir().unwrap();
        let target = source_dir.path().join("target.txt");
        let link = source_dir.path().join("link.txt");
        std::fs::write(&target, b"data").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let entry = Entry::stat(&link, source_dir.path(), ScanOptions::default()).await.unwrap();
        let mut object = LocalObject::new(entry, "link.txt");
        object.generate().await.unwrap();

        std::fs::remove_file(&target).unwrap();
        let err = object.pre().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Inaccessible(_)));
        assert!(err.to_string().starts_with("file no longer accessible"));
        assert!(!object.source().is_open());
    }

    #[tokio::test]
    async fn test_bucket() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("new/root");
        let operator = LocalOperator::new("local", &root).unwrap();
        assert!(operator.supports().bucket_create);
        assert!(!operator.bucket_exists().await.unwrap());
        operator.bucket_create().await.unwrap();
        assert!(operator.bucket_exists().await.unwrap());
        assert!(root.is_dir());
    }
}
