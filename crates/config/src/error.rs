//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The profile file doesn't exist.
    #[display("profile not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// No home directory to derive the default profile location from.
    #[display("unable to determine the configuration directory")]
    NoConfigDir,
    /// The profile (or environment) couldn't be parsed into a configuration.
    #[display("unable to parse profile: {_0}")]
    Parse(#[error(not(source))] String),
    /// Parsed fine, but the values don't make sense together.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Configuration errors never go away on their own.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
