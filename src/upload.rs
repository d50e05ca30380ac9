//! Driving workers for every configured path.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use lofter_config::Config;
use lofter_metadata::{Entry, ScanOptions};
use lofter_storage::Operator;
use lofter_upload::naming::{object_key, search_root};
use lofter_upload::{ObjectFn, Stats, Status, Worker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every configured path with whether it's a directory. Directories first,
/// each list in profile order.
fn targets(config: &Config) -> impl Iterator<Item = (&Path, bool)> {
    config
        .dirs
        .iter()
        .map(|path| (path.as_path(), true))
        .chain(config.files.iter().map(|path| (path.as_path(), false)))
}

/// Make sure the destination bucket exists, creating it when the profile
/// asks for it and the backend can.
pub async fn ensure_bucket<Op: Operator>(config: &Config, operator: &Op) -> Result<()> {
    if operator.bucket_exists().await.or_raise(|| ErrorKind::BucketCheck)? {
        return Ok(());
    }
    if !config.provider.create_bucket() {
        exn::bail!(ErrorKind::BucketMissing);
    }
    if !operator.supports().bucket_create {
        exn::bail!(ErrorKind::BucketUnsupported(operator.name().to_string()));
    }
    operator.bucket_create().await.or_raise(|| ErrorKind::BucketCreate)?;
    tracing::info!(operator = %operator.name(), "Created bucket");
    Ok(())
}

/// Upload every configured path, one worker at a time, and return the
/// combined totals.
pub async fn run<Op: Operator>(config: Arc<Config>, operator: Arc<Op>, object_fn: ObjectFn<Op::Object>) -> Stats {
    let mut stats = Stats::default();
    for (path, is_dir) in targets(&config) {
        let root = search_root(path, is_dir, &config.objects);
        let mut worker = Worker::new(
            Arc::clone(&config),
            path,
            root,
            is_dir,
            !is_dir,
            Status::Queued,
            Arc::clone(&operator),
            Arc::clone(&object_fn),
        );
        tracing::debug!(worker = %worker.uuid(), path = %path.display(), "Starting worker");
        worker.scan().await;
        stats.merge(worker.stats());
    }
    stats
}

/// The keys an upload would produce, without touching the destination.
/// Paths that can't be read are logged and left out.
pub async fn plan(config: &Config) -> Vec<(PathBuf, String)> {
    let mut planned = Vec::new();
    for (path, is_dir) in targets(config) {
        let root = search_root(path, is_dir, &config.objects);
        match entries(path, &root, is_dir).await {
            Ok(entries) => planned.extend(entries.into_iter().map(|entry| {
                let key = object_key(&config.objects, &root, entry.full_path());
                (entry.path, key)
            })),
            Err(e) => tracing::warn!(error = %e, "Skipping {}", path.display()),
        }
    }
    planned
}

async fn entries(path: &Path, root: &Path, is_dir: bool) -> Result<Vec<Entry>> {
    let options = ScanOptions::default();
    let entries = match is_dir {
        true => lofter_metadata::list(path, options).await,
        false => Entry::stat(path, root, options).await.map(|entry| vec![entry]),
    };
    match entries {
        Ok(entries) => Ok(entries.into_iter().filter(|entry| entry.is_uploadable()).collect()),
        Err(e) if e.is_empty() => Ok(Vec::new()),
        Err(e) => Err(e.raise(ErrorKind::Scan(path.to_path_buf()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofter_config::{LocalProvider, Overwrite, Provider};
    use lofter_storage::{MockObject, MockOperator, Supports};
    use lofter_upload::Job;

    fn config(create_bucket: bool) -> Config {
        Config::new(Provider::Local(LocalProvider {
            root: PathBuf::from("/srv/backup"),
            create_bucket,
        }))
    }

    fn object_fn(operator: &Arc<MockOperator>) -> ObjectFn<MockObject> {
        let operator = Arc::clone(operator);
        Arc::new(move |job: &Job<MockObject>| operator.object(job.entry().clone(), job.key()))
    }

    fn tree() -> (tempfile::TempDir, Config) {
        let temp_dir = tempfile::tempdir().unwrap();
        let photos = temp_dir.path().join("photos");
        std::fs::create_dir_all(photos.join("2024")).unwrap();
        std::fs::write(photos.join("2024/cat.jpg"), b"meow").unwrap();
        std::fs::write(photos.join("dog.jpg"), b"woof!").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), b"hi").unwrap();

        let mut config = config(false);
        config.dirs.push(photos);
        config.files.push(temp_dir.path().join("notes.txt"));
        (temp_dir, config)
    }

    #[tokio::test]
    async fn test_run_merges_workers() {
        let (_dir, mut config) = tree();
        config.objects.prefix = Some("backups".to_string());
        let operator = Arc::new(MockOperator::default());
        let stats = run(Arc::new(config), Arc::clone(&operator), object_fn(&operator)).await;

        assert_eq!(stats.objects().count, 3);
        assert_eq!(stats.objects().bytes, 11);
        assert_eq!(
            operator.keys().await,
            vec!["backups/notes.txt", "backups/photos/2024/cat.jpg", "backups/photos/dog.jpg"]
        );
    }

    #[tokio::test]
    async fn test_run_twice_skips() {
        let (_dir, mut config) = tree();
        config.options.overwrite = Overwrite::Never;
        let config = Arc::new(config);
        let operator = Arc::new(MockOperator::default());
        run(Arc::clone(&config), Arc::clone(&operator), object_fn(&operator)).await;
        let stats = run(config, Arc::clone(&operator), object_fn(&operator)).await;

        assert_eq!(stats.objects().count, 0);
        assert_eq!(stats.skipped().count, 3);
    }

    #[tokio::test]
    async fn test_plan_matches_upload() {
        let (_dir, mut config) = tree();
        config.dirs.push(PathBuf::from("/definitely/not/here"));
        let planned = plan(&config).await;
        let keys: Vec<_> = planned.iter().map(|(_, key)| key.as_str()).collect();
        assert_eq!(keys, vec!["photos/2024/cat.jpg", "photos/dog.jpg", "notes.txt"]);
    }

    #[tokio::test]
    async fn test_bucket_present() {
        let operator = MockOperator::default();
        ensure_bucket(&config(false), &operator).await.unwrap();
        assert!(operator.bucket_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_bucket_created() {
        let operator = MockOperator::default().without_bucket();
        ensure_bucket(&config(true), &operator).await.unwrap();
        assert!(operator.bucket_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_bucket_missing() {
        let operator = MockOperator::default().without_bucket();
        let err = ensure_bucket(&config(false), &operator).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BucketMissing));
    }

    #[tokio::test]
    async fn test_bucket_create_unsupported() {
        let operator = MockOperator::default()
            .without_bucket()
            .with_supports(Supports::new(false, false, true, false));
        let err = ensure_bucket(&config(true), &operator).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BucketUnsupported(_)));
    }
}
