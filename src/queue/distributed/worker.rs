use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ProtocolError, QueueError};
use crate::machine::Job;
use crate::protocol::{ToMaster, ToWorker, target_queue_size};
use crate::queue::{Discipline, LocalQueue, QueueSnapshot, WorkQueue};
use crate::transport::WorkerLink;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// `max_queue_size` until the master's first broadcast.
    pub initial_max_queue_size: usize,
    /// Minimum time between two `ReportQueueSize` messages.
    pub report_interval: Duration,
    pub discipline: Discipline,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            initial_max_queue_size: 1000,
            report_interval: Duration::from_secs(10),
            discipline: Discipline::DepthFirst,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerQueueStats {
    pub batches_received: u64,
    pub jobs_received: u64,
    pub jobs_pushed_back: u64,
    pub reports_sent: u64,
}

/// Worker half of the distributed queue: a local buffer that asks the
/// master for work when empty and hands surplus back when full.
pub struct WorkerQueue<L> {
    link: L,
    buffer: LocalQueue,
    max_queue_size: usize,
    target_queue_size: usize,
    report_interval: Duration,
    last_report: Instant,
    finished: bool,
    stats: WorkerQueueStats,
}

impl<L: WorkerLink> WorkerQueue<L> {
    pub fn new(link: L, settings: WorkerSettings) -> Self {
        let max_queue_size = settings.initial_max_queue_size.max(1);
        Self {
            link,
            buffer: LocalQueue::new(settings.discipline),
            max_queue_size,
            target_queue_size: target_queue_size(max_queue_size),
            report_interval: settings.report_interval,
            last_report: Instant::now(),
            finished: false,
            stats: WorkerQueueStats::default(),
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn target_queue_size(&self) -> usize {
        self.target_queue_size
    }

    pub fn stats(&self) -> &WorkerQueueStats {
        &self.stats
    }

    /// True once the master's termination broadcast has arrived.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn set_max_queue_size(&mut self, max: usize) {
        let max = max.max(1);
        if max != self.max_queue_size {
            debug!(max_queue_size = max, "max queue size updated");
        }
        self.max_queue_size = max;
        self.target_queue_size = target_queue_size(max);
    }

    /// Applies the newest pending size update and drops the ones it supersedes.
    fn poll_updates(&mut self) -> Result<(), QueueError> {
        let mut latest = None;
        while let Some(msg) = self.link.try_recv()? {
            match msg {
                ToWorker::UpdateMaxQueueSize(max) => latest = Some(max),
                ToWorker::PopJobs(batch) => {
                    return Err(ProtocolError::UnexpectedBatch { len: batch.len() }.into());
                }
            }
        }
        if let Some(max) = latest {
            self.set_max_queue_size(max);
        }
        Ok(())
    }

    fn maybe_report(&mut self) -> Result<(), QueueError> {
        if self.last_report.elapsed() >= self.report_interval {
            self.link.send(ToMaster::ReportQueueSize(self.buffer.len()))?;
            self.last_report = Instant::now();
            self.stats.reports_sent += 1;
        }
        Ok(())
    }

    /// Blocks for the master's answer to `WaitingForPop`.
    fn wait_for_batch(&mut self) -> Result<Option<Job>, QueueError> {
        self.link.send(ToMaster::WaitingForPop)?;
        loop {
            match self.link.recv()? {
                ToWorker::UpdateMaxQueueSize(max) => self.set_max_queue_size(max),
                ToWorker::PopJobs(batch) if batch.is_empty() => {
                    debug!("termination received");
                    self.finished = true;
                    return Ok(None);
                }
                ToWorker::PopJobs(batch) => {
                    debug!(jobs = batch.len(), "batch received");
                    self.stats.batches_received += 1;
                    self.stats.jobs_received += batch.len() as u64;
                    self.buffer.extend(batch);
                    return Ok(self.buffer.take());
                }
            }
        }
    }
}

impl<L: WorkerLink> WorkQueue for WorkerQueue<L> {
    fn pop_job(&mut self) -> Result<Option<Job>, QueueError> {
        if self.finished {
            return Ok(None);
        }
        self.poll_updates()?;
        self.maybe_report()?;
        match self.buffer.take() {
            Some(job) => Ok(Some(job)),
            None => self.wait_for_batch(),
        }
    }

    fn push_jobs(&mut self, jobs: Vec<Job>) -> Result<(), QueueError> {
        self.buffer.extend(jobs);
        let len = self.buffer.len();
        if len > self.max_queue_size {
            let surplus = self.buffer.split_oldest(len - self.target_queue_size);
            debug!(jobs = surplus.len(), "returning surplus to master");
            self.stats.jobs_pushed_back += surplus.len() as u64;
            self.link.send(ToMaster::PushJobs(surplus))?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }

    fn snapshot(&self) -> QueueSnapshot {
        self.buffer.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::machine::{Dir, Transition};
    use crate::transport::channel::{ChannelHub, cluster};
    use crate::transport::{ChannelEndpoint, MasterLink};

    fn jobs(n: usize) -> Vec<Job> {
        let root = Job::root(4, 4, None);
        (0..n)
            .map(|i| {
                let next = Transition::new((i % 4) as u8, Dir::Right, (i / 4 % 4) as u8);
                root.child(0, 0, next)
            })
            .map(|job| job.child(1, 1, Transition::HALT))
            .collect()
    }

    fn quiet(max: usize) -> WorkerSettings {
        WorkerSettings {
            initial_max_queue_size: max,
            report_interval: Duration::from_secs(3600),
            discipline: Discipline::DepthFirst,
        }
    }

    fn single(settings: WorkerSettings) -> (ChannelHub, WorkerQueue<ChannelEndpoint>) {
        let (hub, mut endpoints) = cluster(1);
        (hub, WorkerQueue::new(endpoints.remove(0), settings))
    }

    #[test]
    fn pops_locally_without_messaging() {
        let (hub, mut queue) = single(quiet(100));
        queue.push_jobs(jobs(2)).unwrap();
        assert!(queue.pop_job().unwrap().is_some());
        assert_eq!(hub.try_recv_any().unwrap(), None);
    }

    /// Plays the master: waits for the worker's request, then sends `replies`.
    fn answer(hub: ChannelHub, replies: Vec<ToWorker>) -> thread::JoinHandle<ChannelHub> {
        thread::spawn(move || {
            assert_eq!(hub.recv_any().unwrap(), (0, ToMaster::WaitingForPop));
            for reply in replies {
                hub.send_to(0, reply).unwrap();
            }
            hub
        })
    }

    #[test]
    fn empty_buffer_asks_master_and_blocks() {
        let (hub, mut queue) = single(quiet(100));
        let batch = jobs(3);
        let master = answer(hub, vec![ToWorker::PopJobs(batch.clone())]);
        assert_eq!(queue.pop_job().unwrap(), Some(batch[2].clone()));
        master.join().unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stats().jobs_received, 3);
    }

    #[test]
    fn empty_batch_is_termination() {
        let (hub, mut queue) = single(quiet(100));
        let master = answer(hub, vec![ToWorker::PopJobs(Vec::new())]);
        assert_eq!(queue.pop_job().unwrap(), None);
        let hub = master.join().unwrap();
        assert!(queue.is_finished());
        // No second request after termination.
        assert_eq!(queue.pop_job().unwrap(), None);
        assert_eq!(hub.try_recv_any().unwrap(), None);
    }

    #[test]
    fn overflow_returns_oldest_down_to_target() {
        let (hub, mut queue) = single(quiet(10));
        let input = jobs(12);
        queue.push_jobs(input.clone()).unwrap();
        assert_eq!(queue.len(), 7);
        assert_eq!(
            hub.try_recv_any().unwrap(),
            Some((0, ToMaster::PushJobs(input[..5].to_vec())))
        );
        assert_eq!(queue.stats().jobs_pushed_back, 5);
    }

    #[test]
    fn buffer_at_max_is_kept() {
        let (hub, mut queue) = single(quiet(10));
        queue.push_jobs(jobs(10)).unwrap();
        assert_eq!(queue.len(), 10);
        assert_eq!(hub.try_recv_any().unwrap(), None);
    }

    #[test]
    fn latest_update_wins() {
        let (hub, mut queue) = single(quiet(10));
        queue.push_jobs(jobs(1)).unwrap();
        hub.send_to(0, ToWorker::UpdateMaxQueueSize(8)).unwrap();
        hub.send_to(0, ToWorker::UpdateMaxQueueSize(40)).unwrap();
        queue.pop_job().unwrap();
        assert_eq!(queue.max_queue_size(), 40);
        assert_eq!(queue.target_queue_size(), 30);
        queue.push_jobs(jobs(16)).unwrap();
        assert_eq!(queue.len(), 16);
    }

    #[test]
    fn update_while_waiting_is_applied() {
        let (hub, mut queue) = single(quiet(10));
        let replies = vec![ToWorker::UpdateMaxQueueSize(20), ToWorker::PopJobs(jobs(1))];
        let master = answer(hub, replies);
        assert!(queue.pop_job().unwrap().is_some());
        master.join().unwrap();
        assert_eq!(queue.max_queue_size(), 20);
    }

    #[test]
    fn unsolicited_batch_is_a_protocol_error() {
        let (hub, mut queue) = single(quiet(10));
        queue.push_jobs(jobs(1)).unwrap();
        hub.send_to(0, ToWorker::PopJobs(jobs(2))).unwrap();
        let err = queue.pop_job().unwrap_err();
        assert!(matches!(
            err,
            QueueError::Protocol(ProtocolError::UnexpectedBatch { len: 2 })
        ));
    }

    #[test]
    fn reports_size_when_due() {
        let (hub, mut queue) = single(WorkerSettings {
            initial_max_queue_size: 100,
            report_interval: Duration::ZERO,
            discipline: Discipline::DepthFirst,
        });
        queue.push_jobs(jobs(4)).unwrap();
        queue.pop_job().unwrap();
        assert_eq!(hub.try_recv_any().unwrap(), Some((0, ToMaster::ReportQueueSize(4))));
        assert_eq!(queue.stats().reports_sent, 1);
    }
}
