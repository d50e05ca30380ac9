use crate::error::{ErrorKind, describe};
use crate::heartbeat::Heartbeat;
use crate::job::{Job, Status};
use crate::naming::object_key;
use crate::stats::Stats;
use exn::Exn;
use lofter_config::{Config, Overwrite};
use lofter_metadata::{Entry, EntryMode, ScanOptions};
use lofter_storage::{Object, Operator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Builds the backend object for a job. Never fails: anything that can go
/// wrong is deferred to [`Object::generate()`].
pub type ObjectFn<O> = Arc<dyn Fn(&Job<O>) -> O + Send + Sync>;

/// Uploads one top-level path (a single file or a whole directory tree)
/// through one [`Operator`].
///
/// Jobs are handled one at a time. Results are only observable through
/// [`stats()`](Self::stats), [`jobs()`](Self::jobs) and the log.
pub struct Worker<Op: Operator> {
    uuid: Uuid,
    path: PathBuf,
    search_root: PathBuf,
    is_dir: bool,
    config: Arc<Config>,
    status: Status,
    operator: Arc<Op>,
    object_fn: ObjectFn<Op::Object>,
    stats: Stats,
    jobs: Vec<Job<Op::Object>>,
}

impl<Op: Operator> Worker<Op> {
    /// Create a worker for `path`.
    ///
    /// `is_dir` and `is_file` are mutually exclusive; if both or neither are
    /// set, the path is treated as a directory.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        path: impl Into<PathBuf>,
        search_root: impl Into<PathBuf>,
        is_dir: bool,
        is_file: bool,
        status: Status,
        operator: Arc<Op>,
        object_fn: ObjectFn<Op::Object>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            path: path.into(),
            search_root: search_root.into(),
            is_dir: is_dir || !is_file,
            config,
            status,
            operator,
            object_fn,
            stats: Stats::default(),
            jobs: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The jobs from the most recent [`scan()`](Self::scan), with their final
    /// status and error. Backend objects have been released by then.
    pub fn jobs(&self) -> &[Job<Op::Object>] {
        &self.jobs
    }

    /// Scan the worker's path and upload everything found.
    pub async fn scan(&mut self) {
        if self.status == Status::Queued {
            self.status = Status::Waiting;
        }
        let options = ScanOptions {
            checksum_sha256: self.config.tag_options.checksum_sha256,
        };
        let mut jobs = match self.is_dir {
            true => self.scan_dir(options).await,
            false => self.scan_file(options).await,
        };
        let mut batch = Stats::default();
        for job in &jobs {
            batch.record(job.status(), job.entry().size);
        }
        self.stats.merge(&batch);
        if self.is_dir && !jobs.is_empty() {
            if batch.objects().count != 0 {
                tracing::info!(worker = %self.uuid, "Upload Complete [{}]", self.path.display());
            } else {
                tracing::warn!(worker = %self.uuid, "No uploads [{}]", self.path.display());
            }
        }
        for job in &mut jobs {
            job.unbind();
        }
        self.jobs = jobs;
    }

    async fn scan_dir(&self, options: ScanOptions) -> Vec<Job<Op::Object>> {
        tracing::info!(worker = %self.uuid, "Reading path {}...", self.path.display());
        let entries = match lofter_metadata::list(&self.path, options).await {
            Ok(entries) => entries,
            Err(e) if e.is_empty() => {
                tracing::debug!(worker = %self.uuid, path = %self.path.display(), "Nothing to upload");
                return Vec::new();
            },
            Err(e) => {
                let e = e.raise(ErrorKind::Scan(self.path.clone()));
                tracing::error!(worker = %self.uuid, error = %describe(&e), "Error reading path {}", self.path.display());
                return Vec::new();
            },
        };
        let mut jobs: Vec<_> = entries.into_iter().map(|entry| self.job(entry)).collect();

        tracing::info!(worker = %self.uuid, jobs = jobs.len(), "Uploading directory {}...", self.path.display());
        self.drain(&mut jobs).await;
        jobs
    }

    /// Keep passing over the jobs until every one of them is terminal. A pass
    /// that changes nothing fails whatever is left.
    async fn drain(&self, jobs: &mut [Job<Op::Object>]) {
        while jobs.iter().any(|job| !job.status().is_terminal()) {
            let before: Vec<Status> = jobs.iter().map(Job::status).collect();
            for job in jobs.iter_mut().filter(|job| job.status() == Status::Queued) {
                self.handle(job).await;
            }
            let progressed = jobs.iter().zip(&before).any(|(job, status)| job.status() != *status);
            if !progressed {
                for job in jobs.iter_mut().filter(|job| !job.status().is_terminal()) {
                    tracing::error!(worker = %self.uuid, key = %job.key(), "Upload stalled for {}", job.entry().full_path().display());
                    job.set_status_with_error(Status::Failed, Exn::from(ErrorKind::Stalled));
                }
            }
        }
    }

    async fn scan_file(&self, options: ScanOptions) -> Vec<Job<Op::Object>> {
        let entry = match Entry::stat(&self.path, &self.search_root, options).await {
            Ok(entry) => entry,
            Err(e) => {
                let e = e.raise(ErrorKind::Scan(self.path.clone()));
                tracing::error!(worker = %self.uuid, error = %describe(&e), "Error reading path {}", self.path.display());
                return Vec::new();
            },
        };
        let mut job = self.job(entry);
        job.set_status(Status::Queued);
        self.handle(&mut job).await;
        vec![job]
    }

    fn job(&self, mut entry: Entry) -> Job<Op::Object> {
        entry.root = self.search_root.clone();
        let key = object_key(&self.config.objects, &self.search_root, entry.full_path());
        Job::new(entry, key)
    }

    /// Drive one queued job to a terminal status, with a heartbeat running
    /// for as long as that takes.
    async fn handle(&self, job: &mut Job<Op::Object>) {
        if job.status() != Status::Queued {
            return;
        }
        let heartbeat = Heartbeat::start(job.entry().full_path().to_path_buf(), self.config.options.heartbeat_interval());
        self.lifecycle(job).await;
        heartbeat.stop().await;
    }

    /// Every exit path destroys the bound object, including skips for entries
    /// that were never eligible: the object was built, so it gets released.
    async fn lifecycle(&self, job: &mut Job<Op::Object>) {
        let path = job.entry().full_path().to_path_buf();
        job.set_status(Status::Waiting);
        let object = (self.object_fn)(&*job);
        job.bind(object);

        let mode = job.entry().mode;
        if !mode.is_uploadable() {
            tracing::warn!(worker = %self.uuid, "Skipping {} [invalid file format: {mode}]", path.display());
            self.destroy(job).await;
            job.set_status_with_error(Status::Skipped, Exn::from(ErrorKind::InvalidFormat(mode)));
            return;
        }
        if let Some(target) = job.entry().target_mode.filter(|target| *target != EntryMode::Regular) {
            tracing::warn!(worker = %self.uuid, "Skipping {} [invalid link target: {target}]", path.display());
            self.destroy(job).await;
            job.set_status_with_error(Status::Skipped, Exn::from(ErrorKind::InvalidTarget(target)));
            return;
        }

        let Some(object) = job.object_mut() else {
            return;
        };

        if let Err(e) = object.generate().await {
            self.destroy(job).await;
            tracing::warn!(worker = %self.uuid, error = %e, "Failed on {} [could not build object]", path.display());
            job.set_status_with_error(Status::Failed, e.raise(ErrorKind::Build));
            return;
        }

        if self.config.options.overwrite == Overwrite::Never {
            match self.operator.object_exists(object).await {
                Err(e) => {
                    self.destroy(job).await;
                    tracing::warn!(worker = %self.uuid, error = %e, "Existing object check failed for {}", path.display());
                    job.set_status_with_error(
                        Status::Failed,
                        e.raise(ErrorKind::ExistsCheck),
                    );
                    return;
                },
                Ok(true) => {
                    self.destroy(job).await;
                    tracing::warn!(worker = %self.uuid, "Skipping {} [object already exists]", path.display());
                    job.set_status_with_error(Status::Skipped, Exn::from(ErrorKind::AlreadyExists));
                    return;
                },
                Ok(false) => {},
            }
        }

        if let Err(e) = object.pre().await {
            self.destroy(job).await;
            tracing::warn!(worker = %self.uuid, error = %e, "Object prepare failed for {}", path.display());
            job.set_status_with_error(Status::Failed, e.raise(ErrorKind::Prepare));
            return;
        }

        if let Err(e) = self.operator.object_upload(object).await {
            self.destroy(job).await;
            tracing::error!(worker = %self.uuid, key = %job.key(), error = %e, "Upload Failed: {}", path.display());
            job.set_status_with_error(Status::Failed, e.raise(ErrorKind::Upload));
            return;
        }

        job.set_status(Status::Done);
        tracing::info!(worker = %self.uuid, key = %job.key(), operator = %self.operator.name(), "Uploaded {}", path.display());

        let finalized = match job.object_mut() {
            Some(object) => object.post().await,
            None => Ok(()),
        };
        if let Err(e) = finalized {
            tracing::warn!(worker = %self.uuid, error = %e, "Post-upload cleanup failed for {}", path.display());
            job.set_status_with_error(Status::Done, e.raise(ErrorKind::Finalize));
        }
        self.destroy(job).await;
    }

    /// Best-effort release of the job's object. Errors are only worth a debug
    /// line: the job's status and error are already decided.
    async fn destroy(&self, job: &mut Job<Op::Object>) {
        let Some(object) = job.object_mut() else {
            return;
        };
        if let Err(e) = object.destroy().await {
            tracing::debug!(worker = %self.uuid, key = %object.key(), error = %e, "Ignoring object destroy failure");
        }
    }
}
