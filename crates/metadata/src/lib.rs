//! Filesystem metadata for files about to be uploaded.
//!
//! An [`Entry`] describes one filesystem object discovered under a search
//! root: its [`EntryMode`], size, whether it still exists and can be read,
//! where a symbolic link finally points, and optionally a SHA-256 checksum of
//! its content. Entries are snapshots and can be re-queried with
//! [`Entry::update`] right before they're used.
//!
//! [`walk`] streams every non-directory entry below a directory; [`list`]
//! collects that stream and reports empty trees as
//! [`ErrorKind::Empty`](error::ErrorKind::Empty).

mod entry;
pub mod error;
mod walk;

pub use crate::entry::{Entry, EntryMode, OtherKind, ScanOptions};
pub use crate::walk::{EntryStream, list, walk};
