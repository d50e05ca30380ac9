use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_HEARTBEAT_SECONDS: u64 = 5;

/// A complete upload profile.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub provider: Provider,
    #[serde(default)]
    pub options: Options,
    #[serde(default)]
    pub objects: Objects,
    #[serde(default)]
    pub tag_options: TagOptions,
    /// Custom metadata attached to every uploaded object.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    /// A profile for `provider` with every other setting at its default.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            options: Options::default(),
            objects: Objects::default(),
            tag_options: TagOptions::default(),
            tags: BTreeMap::new(),
            files: Vec::new(),
            dirs: Vec::new(),
            logging: Logging::default(),
        }
    }
}

/// Where objects get uploaded to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Provider {
    S3(S3Provider),
    Local(LocalProvider),
}

impl Provider {
    /// Whether a missing bucket should be created before uploading.
    pub fn create_bucket(&self) -> bool {
        match self {
            Self::S3(s3) => s3.create_bucket,
            Self::Local(local) => local.create_bucket,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct S3Provider {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (Linode, MinIO, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
    #[serde(default)]
    pub storage_class: Option<String>,
    /// Canned ACL, e.g. `private` or `public-read`.
    #[serde(default)]
    pub acl: Option<String>,
    #[serde(default)]
    pub create_bucket: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LocalProvider {
    pub root: PathBuf,
    #[serde(default)]
    pub create_bucket: bool,
}

/// What to do when the destination already holds an object.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Overwrite {
    /// Skip the upload.
    #[default]
    Never,
    /// Upload anyway, replacing what's there. The existence check is skipped
    /// entirely.
    Always,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Options {
    pub overwrite: Overwrite,
    /// Seconds between "still uploading" log lines.
    pub heartbeat: u64,
}
impl Default for Options {
    fn default() -> Self {
        Self {
            overwrite: Overwrite::default(),
            heartbeat: DEFAULT_HEARTBEAT_SECONDS,
        }
    }
}
impl Options {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat)
    }
}

/// How object keys are derived from local paths.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Naming {
    /// Relative to the directory the upload was started from.
    #[default]
    Relative,
    /// The full local path, minus the leading `/`.
    Absolute,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Objects {
    pub naming: Naming,
    pub prefix: Option<String>,
    /// Don't include the uploaded directory's own name in keys.
    pub omit_root_dir: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TagOptions {
    pub checksum_sha256: bool,
    pub origin_path: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub console: bool,
    pub file: Option<PathBuf>,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: None,
        }
    }
}
