use crate::job::Status;
use derive_more::AddAssign;

/// A number of objects and their combined size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AddAssign)]
pub struct Counter {
    pub count: u64,
    pub bytes: u64,
}

impl Counter {
    pub fn increment(&mut self, count: u64, bytes: u64) {
        self.count += count;
        self.bytes += bytes;
    }
}

/// Running totals for one or more upload batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, AddAssign)]
pub struct Stats {
    objects: Counter,
    skipped: Counter,
    failed: Counter,
}

impl Stats {
    /// Objects transferred.
    pub fn objects(&self) -> Counter {
        self.objects
    }

    pub fn skipped(&self) -> Counter {
        self.skipped
    }

    pub fn failed(&self) -> Counter {
        self.failed
    }

    pub fn inc_objects(&mut self, count: u64, bytes: u64) {
        self.objects.increment(count, bytes);
    }

    pub fn inc_skipped(&mut self, count: u64, bytes: u64) {
        self.skipped.increment(count, bytes);
    }

    pub fn inc_failed(&mut self, count: u64, bytes: u64) {
        self.failed.increment(count, bytes);
    }

    /// Count one job by its terminal status. Non-terminal statuses are
    /// ignored.
    pub fn record(&mut self, status: Status, bytes: u64) {
        match status {
            Status::Done => self.inc_objects(1, bytes),
            Status::Skipped => self.inc_skipped(1, bytes),
            Status::Failed => self.inc_failed(1, bytes),
            Status::Queued | Status::Waiting => {},
        }
    }

    /// Fold another batch's totals into these.
    pub fn merge(&mut self, other: &Stats) {
        *self += *other;
    }

    /// Every counted job, whatever the outcome.
    pub fn total(&self) -> Counter {
        let mut total = self.objects;
        total += self.skipped;
        total += self.failed;
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Status::Done, (1, 0, 0))]
    #[case(Status::Skipped, (0, 1, 0))]
    #[case(Status::Failed, (0, 0, 1))]
    #[case(Status::Queued, (0, 0, 0))]
    #[case(Status::Waiting, (0, 0, 0))]
    fn test_record(#[case] status: Status, #[case] expected: (u64, u64, u64)) {
        let mut stats = Stats::default();
        stats.record(status, 10);
        assert_eq!((stats.objects().count, stats.skipped().count, stats.failed().count), expected);
        assert_eq!(stats.total().bytes, if expected == (0, 0, 0) { 0 } else { 10 });
    }

    #[test]
    fn test_merge() {
        let mut first = Stats::default();
        first.inc_objects(2, 100);
        first.inc_failed(1, 5);
        let mut second = Stats::default();
        second.inc_objects(1, 50);
        second.inc_skipped(3, 30);

        first.merge(&second);
        assert_eq!(first.objects(), Counter { count: 3, bytes: 150 });
        assert_eq!(first.skipped(), Counter { count: 3, bytes: 30 });
        assert_eq!(first.failed(), Counter { count: 1, bytes: 5 });
        assert_eq!(first.total(), Counter { count: 7, bytes: 185 });
    }
}
