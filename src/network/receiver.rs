use super::address::Endpoint;
use super::socket::DatagramSocket;
use crate::frame::DatagramRecord;
use crate::queue::FramedQueue;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace, warn};

/// What happened to one receive attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The datagram was framed into the queue
    Queued,
    /// The queue was full and the datagram was dropped
    Dropped,
    /// The datagram exceeded the maximum frame length and was dropped
    Oversized,
    /// The source address has no IPv4 representation
    Unsupported,
    /// The read failed or returned no data
    Error,
}

/// Receive counters, shared with the owning relay
#[derive(Debug, Default)]
pub struct ReceiverMetrics {
    received: AtomicU64,
    receive_errors: AtomicU64,
    oversized: AtomicU64,
    dropped: AtomicU64,
}

impl ReceiverMetrics {
    /// Datagrams read from the socket, whatever became of them
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Failed or empty reads
    pub fn receive_errors(&self) -> u64 {
        self.receive_errors.load(Ordering::Relaxed)
    }

    /// Datagrams longer than the maximum frame length
    pub fn oversized(&self) -> u64 {
        self.oversized.load(Ordering::Relaxed)
    }

    /// Datagrams dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Blocking receive loop feeding the framed queue
///
/// The receiver is the only writer to its queue. It never waits on the
/// consumer: a datagram that does not fit is dropped and the loop moves on.
pub struct SocketReceiver<S: DatagramSocket = UdpSocket> {
    socket: Arc<S>,
    queue: Arc<FramedQueue>,
    buffer: Vec<u8>,
    metrics: Arc<ReceiverMetrics>,
}

impl<S: DatagramSocket> SocketReceiver<S> {
    /// Creates a receiver reading from `socket` into `queue`
    pub fn new(socket: Arc<S>, queue: Arc<FramedQueue>) -> Self {
        // One spare byte tells an exactly-full datagram from a truncated one
        let buffer = vec![0; queue.max_frame_len() + 1];
        Self {
            socket,
            queue,
            buffer,
            metrics: Arc::new(ReceiverMetrics::default()),
        }
    }

    /// Counters updated by this receiver
    pub fn metrics(&self) -> Arc<ReceiverMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Waits for one datagram and queues it
    pub fn receive_one(&mut self) -> ReceiveOutcome {
        let (n, addr) = match self.socket.recv_from(&mut self.buffer) {
            Ok((0, addr)) => {
                self.metrics.receive_errors.fetch_add(1, Ordering::Relaxed);
                error!(%addr, "Received empty datagram");
                return ReceiveOutcome::Error;
            }
            Ok(received) => received,
            Err(e) => {
                self.metrics.receive_errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Failed to receive datagram");
                return ReceiveOutcome::Error;
            }
        };
        self.metrics.received.fetch_add(1, Ordering::Relaxed);

        let max = self.queue.max_frame_len();
        if n > max {
            self.metrics.oversized.fetch_add(1, Ordering::Relaxed);
            warn!(%addr, max, "Datagram exceeds maximum frame length, dropping");
            return ReceiveOutcome::Oversized;
        }

        let Some(source) = Endpoint::from_socket_addr(addr) else {
            warn!(%addr, "Datagram from non-IPv4 source, dropping");
            return ReceiveOutcome::Unsupported;
        };

        let payload = &self.buffer[..n];
        debug!(%source, size = n, "Received datagram");
        trace!(%source, preview = %String::from_utf8_lossy(payload), "Datagram payload");

        let record = DatagramRecord::new(payload.to_vec(), source.ip, source.port);
        if self.queue.enqueue(&record) {
            ReceiveOutcome::Queued
        } else {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            ReceiveOutcome::Dropped
        }
    }

    /// Receives forever
    ///
    /// There is no read timeout and no exit path: silence on the socket is not
    /// an error, and a failed read only skips that datagram.
    pub fn run(mut self) {
        debug!(max_frame_len = self.queue.max_frame_len(), "Socket receiver running");
        loop {
            self.receive_one();
        }
    }
}
