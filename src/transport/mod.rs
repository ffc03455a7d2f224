//! Tagged message passing between the master and its workers.
//!
//! The protocol needs exactly two blocking calls ([`WorkerLink::recv`] and
//! [`MasterLink::recv_any`]); everything else is fire-and-forget. Both
//! implementations deliver messages from one sender in the order sent.

pub mod channel;
pub mod tcp;

use crate::error::{Peer, TransportError};
use crate::protocol::{ToMaster, ToWorker};

pub use channel::{ChannelEndpoint, ChannelHub};
pub use tcp::{TcpEndpoint, TcpHub};

/// A worker's connection to the master.
pub trait WorkerLink {
    fn send(&self, msg: ToMaster) -> Result<(), TransportError>;

    /// Blocks until the master sends something.
    fn recv(&self) -> Result<ToWorker, TransportError>;

    fn try_recv(&self) -> Result<Option<ToWorker>, TransportError>;
}

/// The master's connections to all workers, addressed by rank `0..num_workers`.
pub trait MasterLink {
    fn num_workers(&self) -> usize;

    fn send_to(&self, worker: usize, msg: ToWorker) -> Result<(), TransportError>;

    /// Blocks until any worker sends something.
    fn recv_any(&self) -> Result<(usize, ToMaster), TransportError>;

    fn try_recv_any(&self) -> Result<Option<(usize, ToMaster)>, TransportError>;
}

/// What a receiving side hands to its owner: a message, or the end of the link.
#[derive(Debug)]
pub(crate) enum Inbound<T> {
    Message(T),
    Closed,
    Failed(TransportError),
}

impl<T> Inbound<T> {
    pub(crate) fn into_result(self, peer: Peer) -> Result<T, TransportError> {
        match self {
            Inbound::Message(msg) => Ok(msg),
            Inbound::Closed => Err(TransportError::Disconnected { peer }),
            Inbound::Failed(err) => Err(err),
        }
    }
}
