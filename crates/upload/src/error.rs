//! Upload Error Types
//!
//! Every job failure is one of these kinds, raised with [`exn`] on top of
//! the backend error that caused it (when there is one), so the full tree is
//! still available for logging.

use derive_more::{Display, Error};
use exn::Frame;
use lofter_metadata::EntryMode;
use std::path::PathBuf;

/// An upload error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a job ended up skipped or failed.
///
/// ### Skips
/// - [`ErrorKind::InvalidFormat`], [`ErrorKind::InvalidTarget`]
/// - [`ErrorKind::AlreadyExists`]
///
/// ### Failures
/// - [`ErrorKind::Build`], [`ErrorKind::ExistsCheck`], [`ErrorKind::Prepare`],
///   [`ErrorKind::Upload`], [`ErrorKind::Stalled`]
///
/// [`ErrorKind::Finalize`] is attached to jobs that still count as done.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Only regular files and symbolic links have uploadable content.
    #[display("not a valid file: {_0}")]
    InvalidFormat(#[error(not(source))] EntryMode),
    /// A symbolic link whose final target has no uploadable content.
    #[display("link target is not a valid file: {_0}")]
    InvalidTarget(#[error(not(source))] EntryMode),
    #[display("unable to build data object")]
    Build,
    /// The existence check errored, so whether the object exists is unknown.
    #[display("unable to check if object exists")]
    ExistsCheck,
    #[display("object already exists")]
    AlreadyExists,
    #[display("could not initialize object")]
    Prepare,
    #[display("could not upload object")]
    Upload,
    #[display("post failed")]
    Finalize,
    /// The job was still pending after a polling pass that changed nothing.
    #[display("upload stalled")]
    Stalled,
    #[display("unable to read path {}", _0.display())]
    Scan(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExistsCheck | Self::Upload | Self::Stalled)
    }
}

/// Render an error and everything underneath it on one line, outermost
/// first: `could not initialize object: file no longer accessible: /a/b`.
pub fn describe(err: &Error) -> String {
    let mut parts = Vec::new();
    collect(err.frame(), &mut parts);
    parts.join(": ")
}

fn collect(frame: &Frame, parts: &mut Vec<String>) {
    parts.push(frame.to_string());
    for child in frame.children() {
        collect(child, parts);
    }
}

/// Whether any error in the tree displays as `message`.
pub fn contains(err: &Error, message: &str) -> bool {
    let mut parts = Vec::new();
    collect(err.frame(), &mut parts);
    parts.iter().any(|part| part.starts_with(message))
}
