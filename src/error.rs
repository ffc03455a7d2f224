use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Evaluator failed on {table}: {source}")]
    Evaluator {
        table: String,
        #[source]
        source: EvalError,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Output file {0} already exists (use --force to overwrite)")]
    OutputExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures underneath the work queue. Both kinds are fatal to the run.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("worker {worker} sent WAITING_FOR_POP while already waiting")]
    DuplicateWait { worker: usize },

    #[error("received a POP_JOBS batch of {len} jobs while not waiting for one")]
    UnexpectedBatch { len: usize },

    #[error("worker {worker} disconnected while the search was still live")]
    WorkerLost { worker: usize },
}

/// The other end of a transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Master,
    Worker(usize),
    AllWorkers,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Master => write!(f, "master"),
            Peer::Worker(rank) => write!(f, "worker {rank}"),
            Peer::AllWorkers => write!(f, "all workers"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{peer} disconnected")]
    Disconnected { peer: Peer },

    #[error("failed to decode frame from {peer}: {message}")]
    Decode { peer: Peer, message: String },

    #[error("{peer} speaks protocol version {found}, expected {expected}")]
    VersionMismatch { peer: Peer, found: u32, expected: u32 },

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} is corrupt: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Internal failure of a machine evaluator, as opposed to a classification.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct EvalError(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableParseError {
    #[error("table has no rows")]
    Empty,

    #[error("row {row} has length {len}, expected {expected}")]
    RowLength { row: usize, len: usize, expected: usize },

    #[error("invalid cell {cell:?} in row {row}")]
    Cell { row: usize, cell: String },

    #[error("table has {0} rows, at most 25 states are supported")]
    TooManyStates(usize),

    #[error("table has {0} symbols, between 2 and 10 are supported")]
    UnsupportedSymbols(usize),
}

impl From<ProtocolError> for SearchError {
    fn from(err: ProtocolError) -> Self {
        SearchError::Queue(QueueError::Protocol(err))
    }
}

impl From<TransportError> for SearchError {
    fn from(err: TransportError) -> Self {
        SearchError::Queue(QueueError::Transport(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::DuplicateWait { worker: 3 };
        assert_eq!(
            err.to_string(),
            "worker 3 sent WAITING_FOR_POP while already waiting"
        );
    }

    #[test]
    fn protocol_error_lifts_into_search_error() {
        let err: SearchError = ProtocolError::WorkerLost { worker: 1 }.into();
        assert!(matches!(
            err,
            SearchError::Queue(QueueError::Protocol(ProtocolError::WorkerLost { worker: 1 }))
        ));
    }

    #[test]
    fn transport_error_names_the_peer() {
        let err = TransportError::Disconnected {
            peer: Peer::Worker(2),
        };
        assert_eq!(err.to_string(), "worker 2 disconnected");
        let err = TransportError::VersionMismatch {
            peer: Peer::Master,
            found: 2,
            expected: 1,
        };
        assert_eq!(err.to_string(), "master speaks protocol version 2, expected 1");
    }

    #[test]
    fn output_exists_mentions_force() {
        let err = SearchError::OutputExists(PathBuf::from("out.jsonl"));
        assert!(err.to_string().contains("--force"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
