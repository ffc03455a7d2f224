//! Wires queue, transport, evaluator and sink together for each execution mode.

use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{info, warn};

use crate::checkpoint::Checkpoint;
use crate::config::SearchConfig;
use crate::enumerator::{EnumSettings, EnumStats, Enumerator, EnumeratorContext, SearchParams};
use crate::error::{Peer, QueueError, SearchError, TransportError};
use crate::evaluator::DirectSimulator;
use crate::queue::{Discipline, LocalQueue, Master, MasterStats, WorkerQueue, WorkerSettings};
use crate::record::RecordSink;
use crate::transport::channel::cluster;
use crate::transport::{TcpEndpoint, TcpHub, WorkerLink};
use crate::ui::SearchProgress;

/// Single-process search, fresh from the root or resumed from `resume`.
pub fn run_single<S: RecordSink>(
    params: &SearchParams,
    settings: EnumSettings,
    discipline: Discipline,
    resume: Option<Checkpoint>,
    sink: S,
    progress: Option<&SearchProgress>,
) -> Result<EnumStats, SearchError> {
    let mut enumerator = match resume {
        Some(checkpoint) => {
            if checkpoint.params != *params {
                warn!("search options differ from the checkpoint; using the checkpoint's");
            }
            Enumerator::resume(checkpoint, settings, DirectSimulator, sink)
        }
        None => {
            params.validate()?;
            let ctx = EnumeratorContext::new(params.clone(), settings);
            let queue = LocalQueue::new(discipline);
            let mut enumerator = Enumerator::new(ctx, queue, DirectSimulator, sink);
            enumerator.seed()?;
            enumerator
        }
    };
    if let Some(progress) = progress {
        enumerator = enumerator.on_progress(move |stats, queued| progress.update(stats, queued));
    }
    enumerator.run()
}

/// Result of an in-process cluster run.
#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub stats: EnumStats,
    pub master: MasterStats,
}

/// Master on the calling thread, `workers` enumerating threads sharing `sink`.
pub fn run_cluster<S: RecordSink + Send>(
    params: &SearchParams,
    config: &SearchConfig,
    workers: usize,
    sink: S,
    progress: Option<&SearchProgress>,
) -> Result<ClusterSummary, SearchError> {
    params.validate()?;
    config.validate()?;
    if workers == 0 {
        return Err(SearchError::Config("a cluster needs at least one worker".into()));
    }
    let (hub, endpoints) = cluster(workers);
    let sink = Arc::new(Mutex::new(sink));
    info!(workers, states = params.num_states, symbols = params.num_symbols, "starting cluster");

    let (master, results) = thread::scope(|scope| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|endpoint| {
                let rank = endpoint.rank();
                let sink = Arc::clone(&sink);
                let settings = worker_enum_settings(config);
                let params = worker_params(params, rank);
                scope.spawn(move || {
                    let worker_settings = config.worker_settings();
                    run_worker_loop(
                        endpoint,
                        params,
                        settings,
                        worker_settings,
                        sink,
                        progress,
                        Some(rank),
                    )
                })
            })
            .collect();

        let master = Master::new(hub, config.master_settings(), vec![params.root_job()]).run();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(SearchError::Config("worker thread panicked".into())))
            })
            .collect();
        (master, results)
    });

    let mut stats = EnumStats::default();
    let mut first_error = None;
    for result in results {
        match result {
            Ok(worker_stats) => stats.merge(&worker_stats),
            // Workers only lose the master after the master itself failed.
            Err(err) if is_master_gone(&err) => {}
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    let master = master?;
    let mut sink = sink;
    sink.flush()?;
    Ok(ClusterSummary { stats, master })
}

/// Distributes the search to `workers` TCP workers and waits for termination.
pub fn run_master(
    params: &SearchParams,
    config: &SearchConfig,
    listen: impl ToSocketAddrs,
    workers: usize,
) -> Result<MasterStats, SearchError> {
    params.validate()?;
    config.validate()?;
    let hub = TcpHub::bind(listen, workers)?;
    Ok(Master::new(hub, config.master_settings(), vec![params.root_job()]).run()?)
}

/// Enumerates jobs from a TCP master until it broadcasts termination.
pub fn run_worker<S: RecordSink>(
    params: &SearchParams,
    config: &SearchConfig,
    connect: impl ToSocketAddrs,
    sink: S,
    progress: Option<&SearchProgress>,
) -> Result<EnumStats, SearchError> {
    config.validate()?;
    let endpoint = TcpEndpoint::connect(connect)?;
    run_worker_loop(
        endpoint,
        params.clone(),
        worker_enum_settings(config),
        config.worker_settings(),
        sink,
        progress,
        None,
    )
}

fn run_worker_loop<L: WorkerLink, S: RecordSink>(
    link: L,
    params: SearchParams,
    settings: EnumSettings,
    worker_settings: WorkerSettings,
    sink: S,
    progress: Option<&SearchProgress>,
    rank: Option<usize>,
) -> Result<EnumStats, SearchError> {
    let queue = WorkerQueue::new(link, worker_settings);
    let ctx = EnumeratorContext::new(params, settings);
    let mut enumerator = Enumerator::new(ctx, queue, DirectSimulator, sink);
    if let Some(progress) = progress {
        // Cluster threads share one spinner, which shows their totals.
        enumerator = enumerator.on_progress(move |stats, queued| match rank {
            Some(rank) => progress.update_worker(rank, stats, queued),
            None => progress.update(stats, queued),
        });
    }
    let stats = enumerator.run()?;
    let queue_stats = enumerator.queue().stats();
    info!(
        batches = queue_stats.batches_received,
        jobs_received = queue_stats.jobs_received,
        jobs_pushed_back = queue_stats.jobs_pushed_back,
        "worker finished"
    );
    Ok(stats)
}

/// Distributed workers never checkpoint and have no budget.
fn worker_enum_settings(config: &SearchConfig) -> EnumSettings {
    EnumSettings {
        limits: config.limits(),
        progress_interval: config.progress_interval,
        ..EnumSettings::default()
    }
}

/// Each worker shuffles with its own stream.
fn worker_params(params: &SearchParams, rank: usize) -> SearchParams {
    SearchParams {
        seed: params.seed.wrapping_add(rank as u64),
        ..params.clone()
    }
}

fn is_master_gone(err: &SearchError) -> bool {
    matches!(
        err,
        SearchError::Queue(QueueError::Transport(TransportError::Disconnected {
            peer: Peer::Master,
        }))
    )
}
