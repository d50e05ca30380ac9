use crate::error::Error;
use derive_more::Display;
use lofter_metadata::Entry;

/// Where a [`Job`] is in its lifecycle.
///
/// `Queued` → `Waiting` → one of the terminal statuses. A job never goes
/// back, and terminal statuses never change.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Status {
    Queued,
    Waiting,
    Skipped,
    Failed,
    Done,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Failed | Self::Done)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    /// Staying put is always allowed (it's how errors get attached after the
    /// fact).
    pub fn can_become(self, next: Status) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Queued => true,
            Self::Waiting => next.is_terminal(),
            Self::Skipped | Self::Failed | Self::Done => false,
        }
    }
}

/// One filesystem entry on its way to one destination key.
#[derive(Debug)]
pub struct Job<O> {
    entry: Entry,
    key: String,
    status: Status,
    error: Option<Error>,
    object: Option<O>,
}

impl<O> Job<O> {
    /// A fresh, [`Queued`](Status::Queued) job.
    pub fn new(entry: Entry, key: impl Into<String>) -> Self {
        Self {
            entry,
            key: key.into(),
            status: Status::Queued,
            error: None,
            object: None,
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The destination key, before any backend-specific processing.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The last recorded skip or failure reason.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// The backend object, while the job is being handled.
    pub fn object(&self) -> Option<&O> {
        self.object.as_ref()
    }

    /// Move to `status`, returning `false` (and changing nothing) when the
    /// transition would go backwards.
    pub fn set_status(&mut self, status: Status) -> bool {
        if !self.status.can_become(status) {
            tracing::warn!(
                path = %self.entry.full_path().display(),
                from = %self.status,
                to = %status,
                "Ignoring backwards job status change"
            );
            return false;
        }
        self.status = status;
        true
    }

    /// Move to `status` and record why.
    pub fn set_status_with_error(&mut self, status: Status, error: Error) -> bool {
        let changed = self.set_status(status);
        if changed {
            self.error = Some(error);
        }
        changed
    }

    pub(crate) fn bind(&mut self, object: O) {
        self.object = Some(object);
    }

    pub(crate) fn object_mut(&mut self) -> Option<&mut O> {
        self.object.as_mut()
    }

    pub(crate) fn unbind(&mut self) -> Option<O> {
        self.object.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use lofter_metadata::ScanOptions;
    use rstest::rstest;

    #[rstest]
    #[case(Status::Queued, Status::Waiting, true)]
    #[case(Status::Queued, Status::Done, true)]
    #[case(Status::Waiting, Status::Skipped, true)]
    #[case(Status::Waiting, Status::Failed, true)]
    #[case(Status::Waiting, Status::Done, true)]
    #[case(Status::Waiting, Status::Queued, false)]
    #[case(Status::Done, Status::Done, true)]
    #[case(Status::Done, Status::Failed, false)]
    #[case(Status::Skipped, Status::Waiting, false)]
    #[case(Status::Failed, Status::Queued, false)]
    fn test_can_become(#[case] from: Status, #[case] to: Status, #[case] allowed: bool) {
        assert_eq!(from.can_become(to), allowed);
    }

    async fn job() -> (tempfile::TempDir, Job<()>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, b"a").unwrap();
        let entry = Entry::stat(&path, temp_dir.path(), ScanOptions::default()).await.unwrap();
        (temp_dir, Job::new(entry, "a.txt"))
    }

    #[tokio::test]
    async fn test_terminal_status_is_sticky() {
        let (_dir, mut job) = job().await;
        assert_eq!(job.status(), Status::Queued);
        assert!(job.set_status(Status::Waiting));
        assert!(job.set_status(Status::Done));
        assert!(!job.set_status(Status::Failed));
        assert!(!job.set_status(Status::Queued));
        assert_eq!(job.status(), Status::Done);
    }

    #[tokio::test]
    async fn test_error_attached_to_same_status() {
        let (_dir, mut job) = job().await;
        job.set_status(Status::Waiting);
        job.set_status(Status::Done);
        assert!(job.error().is_none());
        assert!(job.set_status_with_error(Status::Done, exn::Exn::from(ErrorKind::Finalize)));
        assert_eq!(job.status(), Status::Done);
        assert_eq!(job.error().unwrap().to_string(), "post failed");
    }

    #[tokio::test]
    async fn test_rejected_transition_keeps_error() {
        let (_dir, mut job) = job().await;
        job.set_status(Status::Waiting);
        job.set_status_with_error(Status::Skipped, exn::Exn::from(ErrorKind::AlreadyExists));
        assert!(!job.set_status_with_error(Status::Failed, exn::Exn::from(ErrorKind::Upload)));
        assert_eq!(job.status(), Status::Skipped);
        assert_eq!(job.error().unwrap().to_string(), "object already exists");
    }
}
