use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load profile")]
    Config,
    #[display("could not open log file {}", _0.display())]
    LogFile(#[error(not(source))] PathBuf),
    #[display("could not install log subscriber")]
    Logging,
    #[display("could not set up {_0} backend")]
    Operator(#[error(not(source))] &'static str),
    #[display("could not check bucket")]
    BucketCheck,
    #[display("bucket does not exist and create_bucket is not set")]
    BucketMissing,
    #[display("could not create bucket")]
    BucketCreate,
    #[display("{_0} backend does not support creating buckets")]
    BucketUnsupported(#[error(not(source))] String),
    /// The binary was built without this backend.
    #[display("{_0} backend is not available in this build")]
    Unavailable(#[error(not(source))] &'static str),
    #[display("unable to read path {}", _0.display())]
    Scan(#[error(not(source))] PathBuf),
}
