//! Messages exchanged between the master and its workers.
//!
//! One closed enum per direction, so a peer can only ever receive a message
//! it knows how to handle.

use serde::{Deserialize, Serialize};

use crate::machine::Job;

/// Bumped whenever the shape of a message changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Smallest batch the master hands to a waiting worker when it has enough.
pub const DEFAULT_MIN_BATCH: usize = 10;

/// Worker → master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToMaster {
    /// The worker's local buffer is empty and it is blocked until a batch arrives.
    WaitingForPop,
    /// Overflow returned to the global buffer.
    PushJobs(Vec<Job>),
    /// Current local buffer length, for load estimation only.
    ReportQueueSize(usize),
}

/// Master → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToWorker {
    /// Reply to `WaitingForPop`. An empty batch means the search is over.
    PopJobs(Vec<Job>),
    /// New `max_queue_size`; the worker derives its target from it.
    UpdateMaxQueueSize(usize),
}

/// Buffer size a worker drains down to once it exceeds `max_queue_size`.
pub fn target_queue_size(max_queue_size: usize) -> usize {
    (max_queue_size * 3 / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_three_quarters_of_max() {
        assert_eq!(target_queue_size(100), 75);
        assert_eq!(target_queue_size(10), 7);
        assert_eq!(target_queue_size(1), 1);
    }

    #[test]
    fn messages_are_tagged_by_variant() {
        let json = serde_json::to_string(&ToMaster::ReportQueueSize(12)).unwrap();
        assert_eq!(json, r#"{"ReportQueueSize":12}"#);
        let back: ToWorker = serde_json::from_str(r#"{"PopJobs":[]}"#).unwrap();
        assert_eq!(back, ToWorker::PopJobs(Vec::new()));
    }
}
