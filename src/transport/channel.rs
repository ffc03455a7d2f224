//! In-process transport: one crossbeam channel per direction and worker.
//!
//! Used by `cluster` mode, where each worker is a thread, and by tests.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use super::{Inbound, MasterLink, WorkerLink};
use crate::error::{Peer, TransportError};
use crate::protocol::{ToMaster, ToWorker};

type Envelope = (usize, Inbound<ToMaster>);

pub struct ChannelHub {
    inbox: Receiver<Envelope>,
    outboxes: Vec<Sender<ToWorker>>,
}

/// Worker end. Dropping it tells the master the worker is gone.
pub struct ChannelEndpoint {
    rank: usize,
    outbox: Sender<Envelope>,
    inbox: Receiver<ToWorker>,
}

/// Builds a master hub and `num_workers` connected endpoints.
pub fn cluster(num_workers: usize) -> (ChannelHub, Vec<ChannelEndpoint>) {
    let (to_master, inbox) = unbounded();
    let mut outboxes = Vec::with_capacity(num_workers);
    let mut endpoints = Vec::with_capacity(num_workers);
    for rank in 0..num_workers {
        let (to_worker, worker_inbox) = unbounded();
        outboxes.push(to_worker);
        endpoints.push(ChannelEndpoint {
            rank,
            outbox: to_master.clone(),
            inbox: worker_inbox,
        });
    }
    (ChannelHub { inbox, outboxes }, endpoints)
}

impl ChannelEndpoint {
    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        // The master may already be gone after a normal shutdown.
        let _ = self.outbox.send((self.rank, Inbound::Closed));
    }
}

impl WorkerLink for ChannelEndpoint {
    fn send(&self, msg: ToMaster) -> Result<(), TransportError> {
        self.outbox
            .send((self.rank, Inbound::Message(msg)))
            .map_err(|_| TransportError::Disconnected { peer: Peer::Master })
    }

    fn recv(&self) -> Result<ToWorker, TransportError> {
        self.inbox
            .recv()
            .map_err(|_| TransportError::Disconnected { peer: Peer::Master })
    }

    fn try_recv(&self) -> Result<Option<ToWorker>, TransportError> {
        match self.inbox.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TransportError::Disconnected { peer: Peer::Master })
            }
        }
    }
}

impl MasterLink for ChannelHub {
    fn num_workers(&self) -> usize {
        self.outboxes.len()
    }

    fn send_to(&self, worker: usize, msg: ToWorker) -> Result<(), TransportError> {
        self.outboxes[worker]
            .send(msg)
            .map_err(|_| TransportError::Disconnected {
                peer: Peer::Worker(worker),
            })
    }

    fn recv_any(&self) -> Result<(usize, ToMaster), TransportError> {
        let (rank, inbound) = self
            .inbox
            .recv()
            .map_err(|_| TransportError::Disconnected { peer: Peer::AllWorkers })?;
        Ok((rank, inbound.into_result(Peer::Worker(rank))?))
    }

    fn try_recv_any(&self) -> Result<Option<(usize, ToMaster)>, TransportError> {
        match self.inbox.try_recv() {
            Ok((rank, inbound)) => Ok(Some((rank, inbound.into_result(Peer::Worker(rank))?))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Disconnected {
                peer: Peer::AllWorkers,
            }),
        }
    }
}
