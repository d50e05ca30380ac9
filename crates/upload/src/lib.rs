//! Upload orchestration.
//!
//! A [`Worker`] owns one top-level path. It scans the path into [`Job`]s,
//! drives each job's backend object through its lifecycle, and keeps
//! [`Stats`] on the outcomes. Per-job failures never abort a batch: they are
//! logged, recorded on the job, and counted.

pub mod error;
mod heartbeat;
mod job;
pub mod naming;
mod stats;
mod worker;

pub use crate::heartbeat::Heartbeat;
pub use crate::job::{Job, Status};
pub use crate::stats::{Counter, Stats};
pub use crate::worker::{ObjectFn, Worker};
