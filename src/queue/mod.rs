//! The pop/push contract the enumerator runs against.
//!
//! [`LocalQueue`] covers single-process runs; [`WorkerQueue`] and [`Master`]
//! spread one logical queue over many workers. The enumerator cannot tell
//! them apart.

pub mod distributed;
mod local;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::machine::Job;

pub use distributed::{
    Master, MasterSettings, MasterStats, MasterStatus, WorkerQueue, WorkerQueueStats,
    WorkerSettings,
};
pub use local::{Discipline, LocalQueue};

pub trait WorkQueue {
    /// Next job, or `None` once no work is left anywhere (not merely here).
    fn pop_job(&mut self) -> Result<Option<Job>, QueueError>;

    fn push_job(&mut self, job: Job) -> Result<(), QueueError> {
        self.push_jobs(vec![job])
    }

    fn push_jobs(&mut self, jobs: Vec<Job>) -> Result<(), QueueError>;

    /// Jobs buffered in this process.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the locally buffered jobs, oldest first.
    fn snapshot(&self) -> QueueSnapshot;
}

/// Serializable content of a local buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub discipline: Discipline,
    pub jobs: Vec<Job>,
}
