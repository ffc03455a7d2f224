//! One logical queue spread over a master and its workers.
//!
//! Workers evaluate; the master only holds surplus and decides when the
//! whole search is finished. See [`crate::protocol`] for the messages.

mod master;
mod worker;

pub use master::{Master, MasterSettings, MasterStats, MasterStatus};
pub use worker::{WorkerQueue, WorkerQueueStats, WorkerSettings};
