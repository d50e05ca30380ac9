//! Destination backends for lofter.
//!
//! See [`backend`] for the [`Operator`]/[`Object`] pair every backend
//! implements.

pub mod backend;
pub mod error;
mod path;

#[cfg(feature = "mock")]
pub use crate::backend::{Fault, MockObject, MockOperator, Step};
#[cfg(feature = "s3")]
pub use crate::backend::{S3Object, S3Operator, TagOptions};
pub use crate::backend::{LocalObject, LocalOperator, Object, Operator, SourceFile, Supports};
pub use crate::path::validate_key;
