use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{QueueSnapshot, WorkQueue};
use crate::error::QueueError;
use crate::machine::Job;

/// Order in which a local buffer hands out jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Discipline {
    /// LIFO: memory stays proportional to depth times branching factor.
    #[default]
    DepthFirst,
    /// FIFO: level by level.
    BreadthFirst,
}

/// Single-process queue. Also serves as the worker's local buffer in the
/// distributed queue.
#[derive(Debug, Clone)]
pub struct LocalQueue {
    discipline: Discipline,
    jobs: VecDeque<Job>,
    min_len: Option<usize>,
    max_len: usize,
}

impl LocalQueue {
    pub fn new(discipline: Discipline) -> Self {
        Self {
            discipline,
            jobs: VecDeque::new(),
            min_len: None,
            max_len: 0,
        }
    }

    pub fn depth_first() -> Self {
        Self::new(Discipline::DepthFirst)
    }

    pub fn breadth_first() -> Self {
        Self::new(Discipline::BreadthFirst)
    }

    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let len = snapshot.jobs.len();
        Self {
            discipline: snapshot.discipline,
            jobs: snapshot.jobs.into(),
            min_len: None,
            max_len: len,
        }
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Smallest occupancy observed after a pop, 0 before the first pop.
    pub fn min_len(&self) -> usize {
        self.min_len.unwrap_or(0)
    }

    /// Largest occupancy observed after a push.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn take(&mut self) -> Option<Job> {
        let job = match self.discipline {
            Discipline::DepthFirst => self.jobs.pop_back(),
            Discipline::BreadthFirst => self.jobs.pop_front(),
        }?;
        let len = self.jobs.len();
        self.min_len = Some(self.min_len.map_or(len, |min| min.min(len)));
        Some(job)
    }

    pub fn extend(&mut self, jobs: impl IntoIterator<Item = Job>) {
        self.jobs.extend(jobs);
        self.max_len = self.max_len.max(self.jobs.len());
    }

    /// Removes the `count` oldest jobs (those pushed first).
    pub fn split_oldest(&mut self, count: usize) -> Vec<Job> {
        let count = count.min(self.jobs.len());
        self.jobs.drain(..count).collect()
    }
}

impl WorkQueue for LocalQueue {
    fn pop_job(&mut self) -> Result<Option<Job>, QueueError> {
        Ok(self.take())
    }

    fn push_jobs(&mut self, jobs: Vec<Job>) -> Result<(), QueueError> {
        self.extend(jobs);
        Ok(())
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            discipline: self.discipline,
            jobs: self.jobs.iter().cloned().collect(),
        }
    }
}
