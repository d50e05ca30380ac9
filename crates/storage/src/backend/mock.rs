//! In-memory storage backend for testing.

use crate::backend::{Object, Operator, SourceFile, Supports};
use crate::error::{ErrorKind, Result};
use crate::path::validate_key;
use async_trait::async_trait;
use exn::OptionExt;
use lofter_metadata::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, RwLock};

/// A lifecycle step, as recorded in the [`MockOperator`] journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    Generate,
    Exists,
    Pre,
    Upload,
    Post,
    Destroy,
}

/// A step that should fail for a given key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Fault {
    Generate,
    Exists,
    Pre,
    Upload,
    Post,
    Destroy,
}
impl Fault {
    fn step(self) -> Step {
        match self {
            Self::Generate => Step::Generate,
            Self::Exists => Step::Exists,
            Self::Pre => Step::Pre,
            Self::Upload => Step::Upload,
            Self::Post => Step::Post,
            Self::Destroy => Step::Destroy,
        }
    }
}

type Journal = Arc<Mutex<Vec<(String, Step)>>>;
type Faults = Arc<HashSet<(String, Fault)>>;

/// In-memory storage backend for testing.
///
/// Uploaded content lands in a `HashMap` behind a [`RwLock`]. Every lifecycle
/// step, on the operator or on one of its objects, is appended to a shared
/// journal so tests can assert on ordering. Failures are injected per key
/// with [`with_fault()`](Self::with_fault).
///
/// # Examples
///
/// ```
/// use lofter_storage::{Fault, MockOperator, Operator};
///
/// let operator = MockOperator::with_objects([("photos/cat.jpg", b"meow")])
///     .with_fault("photos/dog.jpg", Fault::Upload);
/// assert_eq!(operator.name(), "mock");
/// ```
pub struct MockOperator {
    name: String,
    storage: RwLock<HashMap<String, Vec<u8>>>,
    faults: Faults,
    supports: Supports,
    bucket: AtomicBool,
    upload_delay: Option<Duration>,
    journal: Journal,
}

impl MockOperator {
    /// Create a mock operator whose destination already holds some objects.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (key, data) in objects {
            let key = key.into();
            let Ok(validated) = validate_key(&key) else {
                panic!("MockOperator::with_objects: invalid key {key}");
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            faults: Arc::default(),
            supports: Supports::new(true, true, true, false),
            bucket: AtomicBool::new(true),
            upload_delay: None,
            journal: Journal::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make `fault` fail for objects built with `key`.
    ///
    /// Must be called before any object is built: objects take a snapshot of
    /// the fault set.
    pub fn with_fault(mut self, key: impl Into<String>, fault: Fault) -> Self {
        let mut faults = (*self.faults).clone();
        faults.insert((key.into(), fault));
        self.faults = Arc::new(faults);
        self
    }

    pub fn with_supports(mut self, supports: Supports) -> Self {
        self.supports = supports;
        self
    }

    /// Start without a bucket, see [`Operator::bucket_create`].
    pub fn without_bucket(self) -> Self {
        self.bucket.store(false, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every upload (use with paused tokio time).
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    /// Build an object for `entry` that shares this operator's journal and
    /// faults.
    pub fn object(&self, entry: Entry, key: impl Into<String>) -> MockObject {
        MockObject {
            source: SourceFile::new(entry),
            key: key.into(),
            address: None,
            faults: Arc::clone(&self.faults),
            journal: Arc::clone(&self.journal),
        }
    }

    /// Content stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.read().await.get(key).cloned()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.storage.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every step taken so far, in order.
    pub async fn journal(&self) -> Vec<(String, Step)> {
        self.journal.lock().await.clone()
    }

    /// The steps taken for a single key, in order.
    pub async fn steps(&self, key: &str) -> Vec<Step> {
        self.journal.lock().await.iter().filter(|(k, _)| k == key).map(|(_, step)| *step).collect()
    }
}

impl Default for MockOperator {
    fn default() -> Self {
        let objects: [(&str, &[u8]); 0] = [];
        Self::with_objects(objects)
    }
}

async fn record(journal: &Journal, faults: &Faults, key: &str, step: Step) -> Result<()> {
    journal.lock().await.push((key.to_string(), step));
    if faults.iter().any(|(k, fault)| k == key && fault.step() == step) {
        exn::bail!(ErrorKind::Injected(format!("{step:?} {key}")));
    }
    Ok(())
}

#[async_trait]
impl Operator for MockOperator {
    type Object = MockObject;

    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self) -> Supports {
        self.supports
    }

    async fn object_exists(&self, object: &MockObject) -> Result<bool> {
        record(&self.journal, &object.faults, &object.key, Step::Exists).await?;
        let address = object.address()?;
        Ok(self.storage.read().await.contains_key(address))
    }

    async fn object_upload(&self, object: &mut MockObject) -> Result<()> {
        record(&self.journal, &object.faults, &object.key, Step::Upload).await?;
        let address = object.address()?.to_string();
        let mut reader = object.source.reader().await?;
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.map_err(ErrorKind::Io)?;
        self.storage.write().await.insert(address, data);
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket.load(Ordering::SeqCst))
    }

    async fn bucket_create(&self) -> Result<()> {
        if !self.supports.bucket_create {
            exn::bail!(ErrorKind::Unsupported("bucket create"));
        }
        self.bucket.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Transfer unit for [`MockOperator`]. Build one with
/// [`MockOperator::object()`].
#[derive(Debug)]
pub struct MockObject {
    source: SourceFile,
    key: String,
    address: Option<String>,
    faults: Faults,
    journal: Journal,
}

impl MockObject {
    fn address(&self) -> Result<&str> {
        self.address.as_deref().ok_or_raise(|| ErrorKind::NotPrepared(self.key.clone()))
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }
}

#[async_trait]
impl Object for MockObject {
    fn key(&self) -> &str {
        &self.key
    }

    async fn generate(&mut self) -> Result<()> {
        record(&self.journal, &self.faults, &self.key, Step::Generate).await?;
        self.address = Some(validate_key(&self.key)?);
        Ok(())
    }

    async fn pre(&mut self) -> Result<()> {
        record(&self.journal, &self.faults, &self.key, Step::Pre).await?;
        self.source.open().await
    }

    async fn post(&mut self) -> Result<()> {
        record(&self.journal, &self.faults, &self.key, Step::Post).await?;
        self.source.close()
    }

    async fn destroy(&mut self) -> Result<()> {
        self.source.release();
        record(&self.journal, &self.faults, &self.key, Step::Destroy).await
    }
}
