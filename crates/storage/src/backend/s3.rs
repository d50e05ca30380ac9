//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Linode/Akamai Object Storage, Backblaze B2,
//! MinIO, and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration profile. The
//! SDK's credential provider chain isn't consulted.

use crate::{
    backend::{Object, Operator, SourceFile, Supports},
    error::{ErrorKind, Result},
    path::validate_key,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl, StorageClass},
};
use exn::{OptionExt, ResultExt};
use lofter_metadata::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// The one region where `CreateBucket` must not name a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

const SUPPORTS: Supports = Supports::new(true, true, true, true);

/// Which user metadata entries get attached to every uploaded object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TagOptions {
    /// `origin-path`: the full local path the object was uploaded from.
    pub origin_path: bool,
    /// `checksum-sha256`: hex SHA-256 of the content, when the entry was
    /// scanned with checksums enabled.
    pub checksum_sha256: bool,
}

/// S3-compatible storage operator.
///
/// # Examples
///
/// ```no_run
/// use lofter_storage::S3Operator;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let operator = S3Operator::new(
///     "linode",
///     "my-bucket",
///     "us-east-1",
///     Some("https://us-east-1.linodeobjects.com"),
///     "access_key_id",
///     "secret_access_key",
/// )
/// .with_storage_class("STANDARD")
/// .with_acl("private");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Operator {
    name: String,
    client: Client,
    bucket: String,
    region: String,
    storage_class: Option<StorageClass>,
    acl: Option<ObjectCannedAcl>,
    tag_options: TagOptions,
    tags: BTreeMap<String, String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Operator {
    /// Create a new S3 storage operator.
    ///
    /// # Arguments
    /// * `name` - A name for this operator (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "lofter-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Linode, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            region,
            storage_class: None,
            acl: None,
            tag_options: TagOptions::default(),
            tags: BTreeMap::new(),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    pub fn with_storage_class(mut self, storage_class: &str) -> Self {
        self.storage_class = Some(StorageClass::from(storage_class));
        self
    }

    /// Canned ACL applied to every uploaded object (`private`,
    /// `public-read`, ...).
    pub fn with_acl(mut self, acl: &str) -> Self {
        self.acl = Some(ObjectCannedAcl::from(acl));
        self
    }

    pub fn with_tag_options(mut self, tag_options: TagOptions) -> Self {
        self.tag_options = tag_options;
        self
    }

    /// Custom user metadata attached to every uploaded object.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.tags.extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        // The semaphore is never closed, but don't panic over it.
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 request limiter closed".to_string()))
    }
}

/// User metadata for one object: custom tags first, then the built-in
/// entries (which win on a name clash).
fn object_metadata(entry: &Entry, options: TagOptions, tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut metadata = tags.clone();
    if options.origin_path {
        metadata.insert("origin-path".to_string(), entry.full_path().display().to_string());
    }
    if options.checksum_sha256
        && let Some(checksum) = &entry.checksum_sha256
    {
        metadata.insert("checksum-sha256".to_string(), checksum.clone());
    }
    metadata
}

/// Network failures are worth retrying, everything else is reported as a
/// backend error.
fn sdk_error<E, R>(err: &SdkError<E, R>) -> ErrorKind
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ErrorKind::Network(message),
        _ => ErrorKind::BackendError(message),
    }
}

#[async_trait]
impl Operator for S3Operator {
    type Object = S3Object;

    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self) -> Supports {
        SUPPORTS
    }

    async fn object_exists(&self, object: &S3Object) -> Result<bool> {
        let key = object.address()?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_not_found() => Ok(false),
                _ => exn::bail!(sdk_error(&err)),
            },
        }
    }

    async fn object_upload(&self, object: &mut S3Object) -> Result<()> {
        let key = object.address()?.to_string();
        let reader = object.source.reader().await?;
        let body = ByteStream::read_from()
            .file(reader)
            .build()
            .await
            .or_raise(|| ErrorKind::BackendError(format!("unable to stream {}", object.source.entry().full_path().display())))?;
        let mut request = self.client.put_object().bucket(&self.bucket).key(&key).body(body);
        if let Some(storage_class) = &self.storage_class {
            request = request.storage_class(storage_class.clone());
        }
        if let Some(acl) = &self.acl {
            request = request.acl(acl.clone());
        }
        for (name, value) in object_metadata(object.source.entry(), self.tag_options, &self.tags) {
            request = request.metadata(name, value);
        }
        let _permit = self.acquire_permit().await?;
        request.send().await.map_err(|err| sdk_error(&err))?;
        tracing::debug!(target = %self.name, bucket = %self.bucket, key = %key, "Put object");
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool> {
        let _permit = self.acquire_permit().await?;
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_not_found() => Ok(false),
                _ => exn::bail!(sdk_error(&err)),
            },
        }
    }

    async fn bucket_create(&self) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if self.region != DEFAULT_REGION {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build();
            request = request.create_bucket_configuration(configuration);
        }
        let _permit = self.acquire_permit().await?;
        request.send().await.map_err(|err| sdk_error(&err))?;
        tracing::info!(target = %self.name, bucket = %self.bucket, "Created bucket");
        Ok(())
    }
}

/// A file headed for an [`S3Operator`] bucket.
#[derive(Debug)]
pub struct S3Object {
    source: SourceFile,
    key: String,
    address: Option<String>,
}

impl S3Object {
    pub fn new(entry: Entry, key: impl Into<String>) -> Self {
        Self {
            source: SourceFile::new(entry),
            key: key.into(),
            address: None,
        }
    }

    fn address(&self) -> Result<&str> {
        self.address.as_deref().ok_or_raise(|| ErrorKind::NotPrepared(self.key.clone()))
    }
}

#[async_trait]
impl Object for S3Object {
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
