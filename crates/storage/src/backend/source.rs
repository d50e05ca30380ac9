use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use lofter_metadata::Entry;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::AsyncSeekExt;

/// The local side of a transfer: an [`Entry`] plus the read handle opened
/// for it.
///
/// Every backend object embeds one of these, so the "is the file still
/// there?" re-validation behaves the same whatever the destination is.
#[derive(Debug)]
pub struct SourceFile {
    entry: Entry,
    handle: Option<File>,
}

impl SourceFile {
    pub fn new(entry: Entry) -> Self {
        Self { entry, handle: None }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Re-query the entry and open its content for reading.
    ///
    /// Symbolic links are opened through their final target, as resolved
    /// by the re-query (not at scan time).
    ///
    /// # Errors
    /// Returns [`Inaccessible`](ErrorKind::Inaccessible) if the entry no
    /// longer exists or can't be read.
    pub async fn open(&mut self) -> Result<()> {
        let path = self.entry.full_path().to_path_buf();
        self.entry.update().await.or_raise(|| ErrorKind::Inaccessible(path.clone()))?;
        if !self.entry.exists || !self.entry.readable {
            exn::bail!(ErrorKind::Inaccessible(path));
        }
        let source = self.entry.source_path();
        let file = File::open(source).await.map_err(|e| ErrorKind::from_io(e, source))?;
        self.handle = Some(file);
        Ok(())
    }

    /// A fresh handle on the opened content, positioned at the start.
    ///
    /// The returned handle shares its cursor with the one held here, so only
    /// one reader should be in use at a time.
    pub async fn reader(&self) -> Result<File> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_raise(|| ErrorKind::NotPrepared(self.entry.full_path().display().to_string()))?;
        let mut reader = handle.try_clone().await.map_err(ErrorKind::Io)?;
        reader.seek(SeekFrom::Start(0)).await.map_err(ErrorKind::Io)?;
        Ok(reader)
    }

    /// Close the handle opened by [`open()`](Self::open).
    ///
    /// # Errors
    /// Returns [`NotPrepared`](ErrorKind::NotPrepared) if nothing was open.
    pub fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => {
                drop(handle);
                Ok(())
            },
            None => exn::bail!(ErrorKind::NotPrepared(self.entry.full_path().display().to_string())),
        }
    }

    /// Drop the handle if there is one.
    pub fn release(&mut self) {
        self.handle = None;
    }
}
