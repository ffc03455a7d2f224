use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Peer, ProtocolError, QueueError, TransportError};
use crate::machine::Job;
use crate::protocol::{DEFAULT_MIN_BATCH, ToMaster, ToWorker, target_queue_size};
use crate::transport::MasterLink;

#[derive(Debug, Clone)]
pub struct MasterSettings {
    pub min_batch: usize,
    /// Must match what the workers start with.
    pub initial_max_queue_size: usize,
    /// Minimum time between two `UpdateMaxQueueSize` broadcasts.
    pub broadcast_interval: Duration,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            min_batch: DEFAULT_MIN_BATCH,
            initial_max_queue_size: 1000,
            broadcast_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterStats {
    pub batches_sent: u64,
    pub jobs_sent: u64,
    pub jobs_received: u64,
    pub broadcasts: u64,
    pub peak_global: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStatus {
    Running,
    /// Every worker has been sent the termination batch.
    Done,
}

/// Coordinator of the distributed queue. Owns the global buffer and never
/// evaluates jobs itself.
pub struct Master<L> {
    link: L,
    global: VecDeque<Job>,
    waiting: Vec<bool>,
    reported: Vec<usize>,
    settings: MasterSettings,
    max_queue_size: usize,
    last_broadcast: Instant,
    stats: MasterStats,
}

impl<L: MasterLink> Master<L> {
    /// `initial` seeds the global buffer, normally with the root job.
    pub fn new(link: L, settings: MasterSettings, initial: Vec<Job>) -> Self {
        let workers = link.num_workers();
        let global: VecDeque<Job> = initial.into();
        let stats = MasterStats {
            peak_global: global.len(),
            ..MasterStats::default()
        };
        Self {
            link,
            global,
            waiting: vec![false; workers],
            reported: vec![0; workers],
            max_queue_size: settings.initial_max_queue_size.max(1),
            settings,
            last_broadcast: Instant::now(),
            stats,
        }
    }

    pub fn stats(&self) -> &MasterStats {
        &self.stats
    }

    pub fn global_len(&self) -> usize {
        self.global.len()
    }

    pub fn num_waiting(&self) -> usize {
        self.waiting.iter().filter(|w| **w).count()
    }

    /// Runs until termination has been broadcast.
    pub fn run(mut self) -> Result<MasterStats, QueueError> {
        info!(workers = self.waiting.len(), jobs = self.global.len(), "master started");
        while self.step()? == MasterStatus::Running {}
        info!(
            batches = self.stats.batches_sent,
            jobs_sent = self.stats.jobs_sent,
            jobs_received = self.stats.jobs_received,
            peak_global = self.stats.peak_global,
            "master finished"
        );
        Ok(self.stats)
    }

    /// Blocks for at least one message, handles everything pending, then
    /// rebalances.
    pub fn step(&mut self) -> Result<MasterStatus, QueueError> {
        let first = self.link.recv_any().map_err(worker_lost)?;
        self.handle(first)?;
        while let Some(next) = self.link.try_recv_any().map_err(worker_lost)? {
            self.handle(next)?;
        }

        self.maybe_broadcast()?;

        if self.global.is_empty() && self.waiting.iter().all(|w| *w) {
            for worker in 0..self.waiting.len() {
                self.link
                    .send_to(worker, ToWorker::PopJobs(Vec::new()))
                    .map_err(worker_lost)?;
            }
            debug!("termination broadcast sent");
            return Ok(MasterStatus::Done);
        }

        self.distribute()?;
        Ok(MasterStatus::Running)
    }

    fn handle(&mut self, (worker, msg): (usize, ToMaster)) -> Result<(), QueueError> {
        match msg {
            ToMaster::WaitingForPop => {
                if self.waiting[worker] {
                    return Err(ProtocolError::DuplicateWait { worker }.into());
                }
                self.waiting[worker] = true;
                self.reported[worker] = 0;
            }
            ToMaster::PushJobs(jobs) => {
                debug!(worker, jobs = jobs.len(), "surplus received");
                self.stats.jobs_received += jobs.len() as u64;
                self.global.extend(jobs);
                self.stats.peak_global = self.stats.peak_global.max(self.global.len());
            }
            ToMaster::ReportQueueSize(size) => self.reported[worker] = size,
        }
        Ok(())
    }

    fn maybe_broadcast(&mut self) -> Result<(), QueueError> {
        let outstanding = self.global.len() + self.reported.iter().sum::<usize>();
        let wanted = (outstanding / self.waiting.len().max(1)).max(self.settings.min_batch);
        if wanted == self.max_queue_size
            || self.last_broadcast.elapsed() < self.settings.broadcast_interval
        {
            return Ok(());
        }
        debug!(max_queue_size = wanted, outstanding, "broadcasting max queue size");
        for worker in 0..self.waiting.len() {
            self.link
                .send_to(worker, ToWorker::UpdateMaxQueueSize(wanted))
                .map_err(worker_lost)?;
        }
        self.max_queue_size = wanted;
        self.last_broadcast = Instant::now();
        self.stats.broadcasts += 1;
        Ok(())
    }

    /// Splits the global buffer over the waiting workers, front first.
    fn distribute(&mut self) -> Result<(), QueueError> {
        let waiting: Vec<usize> = (0..self.waiting.len()).filter(|w| self.waiting[*w]).collect();
        if waiting.is_empty() || self.global.is_empty() {
            return Ok(());
        }
        let min_batch = self.settings.min_batch;
        let cap = target_queue_size(self.max_queue_size).max(min_batch);
        let base = self.global.len() / waiting.len();
        let extra = self.global.len() % waiting.len();

        for (i, worker) in waiting.into_iter().enumerate() {
            if self.global.is_empty() {
                break;
            }
            let size = (base + usize::from(i < extra))
                .max(min_batch)
                .min(cap)
                .min(self.global.len());
            let batch: Vec<Job> = self.global.drain(..size).collect();
            debug!(worker, jobs = size, "batch sent");
            self.link
                .send_to(worker, ToWorker::PopJobs(batch))
                .map_err(worker_lost)?;
            self.waiting[worker] = false;
            self.stats.batches_sent += 1;
            self.stats.jobs_sent += size as u64;
        }
        Ok(())
    }
}

/// A link to one worker going away while the search is live is fatal.
fn worker_lost(err: TransportError) -> QueueError {
    match err {
        TransportError::Disconnected {
            peer: Peer::Worker(worker),
        } => ProtocolError::WorkerLost { worker }.into(),
        other => other.into(),
    }
}
