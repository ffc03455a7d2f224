//! TCP transport: one connection per worker, newline-delimited JSON frames.
//!
//! Every frame carries the protocol version so that mismatched builds fail
//! on the first message instead of misreading each other. A reader thread
//! per connection forwards decoded frames into a crossbeam channel, which
//! gives the master its receive-from-any.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Inbound, MasterLink, WorkerLink};
use crate::error::{Peer, TransportError};
use crate::protocol::{PROTOCOL_VERSION, ToMaster, ToWorker};

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    body: T,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

fn write_frame<T: Serialize>(mut stream: &TcpStream, body: &T) -> Result<(), TransportError> {
    let mut line = serde_json::to_vec(&Envelope {
        version: PROTOCOL_VERSION,
        body,
    })?;
    line.push(b'\n');
    stream.write_all(&line)?;
    Ok(())
}

fn decode_frame<T: DeserializeOwned>(line: &str, peer: Peer) -> Result<T, TransportError> {
    let decode = |err: serde_json::Error| TransportError::Decode {
        peer,
        message: err.to_string(),
    };
    let header: Header = serde_json::from_str(line).map_err(decode)?;
    if header.version != PROTOCOL_VERSION {
        return Err(TransportError::VersionMismatch {
            peer,
            found: header.version,
            expected: PROTOCOL_VERSION,
        });
    }
    let envelope: Envelope<T> = serde_json::from_str(line).map_err(decode)?;
    Ok(envelope.body)
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}

fn on_write_error(err: TransportError, peer: Peer) -> TransportError {
    match err {
        TransportError::Io(io) if is_disconnect(&io) => TransportError::Disconnected { peer },
        other => other,
    }
}

/// Reads frames until EOF or the first bad frame. `forward` returns false
/// once nobody listens any more.
fn spawn_reader<T, F>(stream: TcpStream, peer: Peer, forward: F) -> std::io::Result<()>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Inbound<T>) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name(format!("tcp-reader-{peer}"))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                let inbound = match reader.read_line(&mut line) {
                    Ok(0) => Inbound::Closed,
                    Ok(_) => match decode_frame(line.trim_end(), peer) {
                        Ok(msg) => Inbound::Message(msg),
                        Err(err) => Inbound::Failed(err),
                    },
                    Err(err) if is_disconnect(&err) => Inbound::Closed,
                    Err(err) => Inbound::Failed(err.into()),
                };
                let last = !matches!(inbound, Inbound::Message(_));
                if !forward(inbound) || last {
                    debug!(%peer, "reader stopped");
                    return;
                }
            }
        })?;
    Ok(())
}

/// Master side of the TCP transport.
pub struct TcpHub {
    streams: Vec<TcpStream>,
    inbox: Receiver<(usize, Inbound<ToMaster>)>,
}

impl TcpHub {
    pub fn bind(addr: impl ToSocketAddrs, num_workers: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, num_workers, "listening for workers");
        Self::accept(&listener, num_workers)
    }

    /// Waits for `num_workers` connections. Ranks follow accept order.
    pub fn accept(listener: &TcpListener, num_workers: usize) -> Result<Self, TransportError> {
        let (tx, inbox) = unbounded();
        let mut streams = Vec::with_capacity(num_workers);
        for rank in 0..num_workers {
            let (stream, addr) = listener.accept()?;
            stream.set_nodelay(true)?;
            info!(rank, %addr, "worker connected");
            let tx: Sender<(usize, Inbound<ToMaster>)> = tx.clone();
            spawn_reader(stream.try_clone()?, Peer::Worker(rank), move |inbound| {
                tx.send((rank, inbound)).is_ok()
            })?;
            streams.push(stream);
        }
        Ok(Self { streams, inbox })
    }
}

impl Drop for TcpHub {
    fn drop(&mut self) {
        for stream in &self.streams {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl MasterLink for TcpHub {
    fn num_workers(&self) -> usize {
        self.streams.len()
    }

    fn send_to(&self, worker: usize, msg: ToWorker) -> Result<(), TransportError> {
        write_frame(&self.streams[worker], &msg)
            .map_err(|err| on_write_error(err, Peer::Worker(worker)))
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

/// Worker side of the TCP transport.
pub struct TcpEndpoint {
    stream: TcpStream,
    inbox: Receiver<Inbound<ToWorker>>,
}

impl TcpEndpoint {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        info!(master = %stream.peer_addr()?, "connected to master");
        let (tx, inbox) = unbounded();
        spawn_reader(stream.try_clone()?, Peer::Master, move |inbound| tx.send(inbound).is_ok())?;
        Ok(Self { stream, inbox })
    }
}

impl Drop for TcpEndpoint {
    fn drop(&mut self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            if err.kind() != ErrorKind::NotConnected {
                warn!(error = %err, "failed to shut down master connection");
            }
        }
    }
}

impl WorkerLink for TcpEndpoint {
    fn send(&self, msg: ToMaster) -> Result<(), TransportError> {
        write_frame(&self.stream, &msg).map_err(|err| on_write_error(err, Peer::Master))
    }

    fn recv(&self) -> Result<ToWorker, TransportError> {
        self.inbox
            .recv()
            .map_err(|_| TransportError::Disconnected { peer: Peer::Master })?
            .into_result(Peer::Master)
    }

    fn try_recv(&self) -> Result<Option<ToWorker>, TransportError> {
        match self.inbox.try_recv() {
            Ok(inbound) => inbound.into_result(Peer::Master).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TransportError::Disconnected { peer: Peer::Master })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Job;

    fn listener() -> (TcpListener, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn round_trip_over_loopback() {
        let (listener, addr) = listener();
        let worker = thread::spawn(move || {
            let endpoint = TcpEndpoint::connect(addr).unwrap();
            endpoint.send(ToMaster::WaitingForPop).unwrap();
            let reply = endpoint.recv().unwrap();
            endpoint.send(ToMaster::ReportQueueSize(3)).unwrap();
            reply
        });

        let hub = TcpHub::accept(&listener, 1).unwrap();
        assert_eq!(hub.recv_any().unwrap(), (0, ToMaster::WaitingForPop));
        let batch = vec![Job::root(2, 2, None).with_first_transition()];
        hub.send_to(0, ToWorker::PopJobs(batch.clone())).unwrap();
        assert_eq!(hub.recv_any().unwrap(), (0, ToMaster::ReportQueueSize(3)));
        assert_eq!(worker.join().unwrap(), ToWorker::PopJobs(batch));
    }

    #[test]
    fn closed_worker_is_reported() {
        let (listener, addr) = listener();
        let worker = thread::spawn(move || drop(TcpEndpoint::connect(addr).unwrap()));
        let hub = TcpHub::accept(&listener, 1).unwrap();
        worker.join().unwrap();
        assert!(matches!(
            hub.recv_any(),
            Err(TransportError::Disconnected {
                peer: Peer::Worker(0)
            })
        ));
    }

    #[test]
    fn rejects_other_protocol_versions() {
        let (listener, addr) = listener();
        let worker = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .write_all(b"{\"version\":99,\"body\":\"WaitingForPop\"}\n")
                .unwrap();
            stream
        });
        let hub = TcpHub::accept(&listener, 1).unwrap();
        let _stream = worker.join().unwrap();
        assert!(matches!(
            hub.recv_any(),
            Err(TransportError::VersionMismatch { found: 99, expected: 1, .. })
        ));
    }

    #[test]
    fn rejects_garbage_frames() {
        let (listener, addr) = listener();
        let worker = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"hello\n").unwrap();
            stream
        });
        let hub = TcpHub::accept(&listener, 1).unwrap();
        let _stream = worker.join().unwrap();
        assert!(matches!(hub.recv_any(), Err(TransportError::Decode { .. })));
    }
}
