//! Storage backend traits and implementations.
//!
//! Every backend is a pair: an [`Operator`], the control plane that talks to
//! the destination (existence checks, transfers, bucket setup), and an
//! [`Object`], the unit of transfer built for a single source file. The
//! upload engine only ever drives these two traits, so adding a backend never
//! touches the engine.
//!

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;
mod source;

pub use self::local::{LocalObject, LocalOperator};
#[cfg(feature = "mock")]
pub use self::mock::{Fault, MockObject, MockOperator, Step};
#[cfg(feature = "s3")]
pub use self::s3::{S3Object, S3Operator, TagOptions};
pub use self::source::SourceFile;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;

/// Static description of what a backend can do beyond plain uploads.
///
/// Consulted by setup code (deciding whether a missing bucket can be
/// created, for example). The upload lifecycle itself never looks at it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Supports {
    pub bucket_create: bool,
    pub bucket_delete: bool,
    pub object_delete: bool,
    pub object_upload_multipart: bool,
}
impl Supports {
    pub const fn new(
        bucket_create: bool,
        bucket_delete: bool,
        object_delete: bool,
        object_upload_multipart: bool,
    ) -> Self {
        Self {
            bucket_create,
            bucket_delete,
            object_delete,
            object_upload_multipart,
        }
    }
}

/// A backend-specific transfer unit, built for one source entry and one
/// destination key.
///
/// The lifecycle, driven by the upload engine, is:
///
/// 1. [`generate()`](Self::generate): derive backend addressing from the key.
/// 2. [`pre()`](Self::pre): re-validate the source and acquire resources.
/// 3. the transfer itself, via [`Operator::object_upload`].
/// 4. [`post()`](Self::post): release resources after a successful transfer.
/// 5. [`destroy()`](Self::destroy): unconditional cleanup, on every path.
#[async_trait]
pub trait Object: Send + Sync {
    /// The destination key this object was built with (before any
    /// backend-specific prefixing).
    fn key(&self) -> &str;

    /// Derive backend-specific addressing. Must be idempotent and have no
    /// side effects outside the object itself.
    async fn generate(&mut self) -> Result<()>;

    /// Acquire whatever the transfer needs.
    ///
    /// Implementations re-query the source entry and fail with
    /// [`Inaccessible`](crate::error::ErrorKind::Inaccessible) if it vanished
    /// or became unreadable since it was scanned. Symbolic links are read
    /// through their final target.
    async fn pre(&mut self) -> Result<()>;

    /// Release resources after a successful transfer. May fail on its own,
    /// independently of how the transfer went.
    async fn post(&mut self) -> Result<()>;

    /// Release everything, whatever state the object is in. Safe to call
    /// when [`pre()`](Self::pre) never ran, and more than once.
    async fn destroy(&mut self) -> Result<()>;
}

/// Backend control plane, independent of any single object.
///
/// # Examples
///
/// ```no_run
/// use lofter_storage::{Object, Operator, error::Result};
///
/// async fn upload_unless_present<O: Operator>(operator: &O, object: &mut O::Object) -> Result<bool> {
///     object.generate().await?;
///     if operator.object_exists(object).await? {
///         object.destroy().await?;
///         return Ok(false);
///     }
///     object.pre().await?;
///     operator.object_upload(object).await?;
///     object.post().await?;
///     Ok(true)
/// }
/// ```
#[async_trait]
pub trait Operator: Send + Sync {
    /// The transfer unit this backend works with.
    type Object: Object;

    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// What this backend can do beyond uploads.
    fn supports(&self) -> Supports;

    /// Whether the destination already holds something at the object's
    /// address. Never mutates remote state.
    async fn object_exists(&self, object: &Self::Object) -> Result<bool>;

    /// Transfer the object. On success the destination holds the full
    /// content. There's no resume: a failed upload is retried from scratch.
    async fn object_upload(&self, object: &mut Self::Object) -> Result<()>;

    /// Whether the configured bucket (or equivalent) exists.
    async fn bucket_exists(&self) -> Result<bool> {
        exn::bail!(ErrorKind::Unsupported("bucket lookup"))
    }

    /// Create the configured bucket (or equivalent). Only called when
    /// [`Supports::bucket_create`] is set.
    async fn bucket_create(&self) -> Result<()> {
        exn::bail!(ErrorKind::Unsupported("bucket create"))
    }
}
