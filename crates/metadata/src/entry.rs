use crate::error::{ErrorKind, Result};
use derive_more::Display;
use sha2::{Digest, Sha256};
use std::fs::{FileType, Metadata};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncReadExt;

const CHECKSUM_BUFFER: usize = 64 * 1024;

/// Filesystem entry types that can't be uploaded and aren't directories.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum OtherKind {
    #[display("named pipe")]
    NamedPipe,
    #[display("socket")]
    Socket,
    #[display("character device")]
    CharDevice,
    #[display("block device")]
    BlockDevice,
    #[display("unknown")]
    Unknown,
}

/// What kind of filesystem object an [`Entry`] is.
///
/// Symbolic links are reported as [`Link`](Self::Link) regardless of what
/// they point at; the resolved target lives in [`Entry::target_final`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum EntryMode {
    #[display("regular")]
    Regular,
    #[display("link")]
    Link,
    #[display("directory")]
    Directory,
    #[display("{_0}")]
    Other(OtherKind),
}
impl EntryMode {
    /// Regular files and symbolic links are the only entries with content
    /// that can be transferred.
    pub fn is_uploadable(&self) -> bool {
        matches!(self, Self::Regular | Self::Link)
    }
}
impl From<FileType> for EntryMode {
    fn from(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            return Self::Link;
        }
        if file_type.is_dir() {
            return Self::Directory;
        }
        if file_type.is_file() {
            return Self::Regular;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_fifo() {
                return Self::Other(OtherKind::NamedPipe);
            }
            if file_type.is_socket() {
                return Self::Other(OtherKind::Socket);
            }
            if file_type.is_char_device() {
                return Self::Other(OtherKind::CharDevice);
            }
            if file_type.is_block_device() {
                return Self::Other(OtherKind::BlockDevice);
            }
        }
        Self::Other(OtherKind::Unknown)
    }
}

/// Options that change how much work goes into describing an entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Hash the content of every readable entry with SHA-256.
    pub checksum_sha256: bool,
}

/// Metadata describing one filesystem entry, discovered relative to a search
/// root.
///
/// An entry is a snapshot: the filesystem can change underneath it at any
/// time, so anything about to act on the entry should call
/// [`update()`](Self::update) first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path of the entry as discovered (not resolved).
    pub path: PathBuf,
    /// The search root the entry was discovered under.
    pub root: PathBuf,
    pub mode: EntryMode,
    /// Size in bytes. For links this is the size of the final target.
    pub size: u64,
    pub modified: Option<OffsetDateTime>,
    /// `false` once the entry (or a link's target) has disappeared.
    pub exists: bool,
    /// Whether the content can be opened for reading.
    pub readable: bool,
    /// Fully resolved target of a symbolic link.
    pub target_final: Option<PathBuf>,
    /// What a symbolic link's final target is, when it exists.
    pub target_mode: Option<EntryMode>,
    /// Lowercase hex SHA-256 of the content, when requested.
    pub checksum_sha256: Option<String>,
    options: ScanOptions,
}

impl Entry {
    /// Describe the entry at `path`, discovered under the search root `root`.
    ///
    /// # Errors
    /// Returns [`NotFound`](ErrorKind::NotFound) if nothing exists at `path`
    /// (a dangling symbolic link still exists, it just isn't readable).
    pub async fn stat(path: impl Into<PathBuf>, root: impl Into<PathBuf>, options: ScanOptions) -> Result<Self> {
        let path = path.into();
        let metadata = fs::symlink_metadata(&path).await.map_err(|e| ErrorKind::from_io(e, &path))?;
        let mut entry = Self {
            path,
            root: root.into(),
            mode: EntryMode::Regular,
            size: 0,
            modified: None,
            exists: true,
            readable: false,
            target_final: None,
            target_mode: None,
            checksum_sha256: None,
            options,
        };
        entry.describe(&metadata).await;
        Ok(entry)
    }

    /// Re-query the filesystem for this entry, replacing everything that was
    /// previously known about it.
    ///
    /// An entry that has vanished is not an error: it's reported through
    /// [`exists`](Self::exists) and [`readable`](Self::readable).
    pub async fn update(&mut self) -> Result<()> {
        match fs::symlink_metadata(&self.path).await {
            Ok(metadata) => {
                self.exists = true;
                self.readable = false;
                self.target_final = None;
                self.target_mode = None;
                self.checksum_sha256 = None;
                self.describe(&metadata).await;
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.exists = false;
                self.readable = false;
                self.target_final = None;
                self.target_mode = None;
                Ok(())
            },
            Err(e) => exn::bail!(ErrorKind::from_io(e, &self.path)),
        }
    }

    /// Full path of the entry as discovered.
    pub fn full_path(&self) -> &Path {
        &self.path
    }

    /// Whether there's content to transfer: regular files, and links whose
    /// final target is a regular file. Dangling links count too, they're
    /// caught when the content is opened.
    pub fn is_uploadable(&self) -> bool {
        self.mode.is_uploadable() && self.target_mode.is_none_or(|target| target == EntryMode::Regular)
    }

    /// Path of the entry relative to its search root. Falls back to the full
    /// path if the entry isn't actually under the root.
    pub fn relative_path(&self) -> &Path {
        self.path.strip_prefix(&self.root).unwrap_or(&self.path)
    }

    /// The path content should be read from: the final target for links, the
    /// entry itself for everything else.
    pub fn source_path(&self) -> &Path {
        match (&self.mode, &self.target_final) {
            (EntryMode::Link, Some(target)) => target,
            _ => &self.path,
        }
    }

    async fn describe(&mut self, metadata: &Metadata) {
        self.mode = EntryMode::from(metadata.file_type());
        self.size = metadata.len();
        self.modified = metadata.modified().ok().map(OffsetDateTime::from);
        match self.mode {
            EntryMode::Regular => self.readable = can_open(&self.path).await,
            EntryMode::Directory => self.readable = fs::read_dir(&self.path).await.is_ok(),
            EntryMode::Link => self.resolve_link().await,
            // Never try to open pipes or devices, it can block forever.
            EntryMode::Other(_) => {},
        }
        if self.options.checksum_sha256 && self.readable && self.mode.is_uploadable() {
            match sha256(self.source_path()).await {
                Ok(sum) => self.checksum_sha256 = Some(sum),
                Err(e) => tracing::debug!(path = %self.path.display(), error = %e, "Could not checksum entry"),
            }
        }
    }

    async fn resolve_link(&mut self) {
        let target = match fs::canonicalize(&self.path).await {
            Ok(target) => target,
            Err(_) => {
                self.exists = false;
                return;
            },
        };
        match fs::metadata(&target).await {
            Ok(metadata) => {
                self.size = metadata.len();
                self.modified = metadata.modified().ok().map(OffsetDateTime::from);
                self.readable = metadata.is_file() && can_open(&target).await;
                self.target_mode = Some(EntryMode::from(metadata.file_type()));
            },
            Err(_) => self.exists = false,
        }
        self.target_final = Some(target);
    }
}

async fn can_open(path: &Path) -> bool {
    fs::File::open(path).await.is_ok()
}

async fn sha256(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
