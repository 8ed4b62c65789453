use super::address::Endpoint;
use super::socket::DatagramSocket;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

/// Transmit counters
#[derive(Debug, Default)]
pub struct TransmitterMetrics {
    sent: AtomicU64,
    failures: AtomicU64,
}

impl TransmitterMetrics {
    /// Datagrams handed to the socket successfully
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Sends the socket rejected
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Fire-and-forget sender sharing the relay's socket
///
/// Sends bypass the queue entirely. A failed send is logged and counted,
/// never retried, and never reported to the caller.
pub struct Transmitter<S: DatagramSocket = UdpSocket> {
    socket: Arc<S>,
    metrics: Arc<TransmitterMetrics>,
}

impl<S: DatagramSocket> Transmitter<S> {
    /// Creates a transmitter over `socket`
    pub fn new(socket: Arc<S>) -> Self {
        Self {
            socket,
            metrics: Arc::new(TransmitterMetrics::default()),
        }
    }

    /// Sends `payload` to a host-order IPv4 address and port
    pub fn transmit(&self, payload: &[u8], destination_ip: u32, destination_port: u16) {
        let destination = Endpoint::new(destination_ip, destination_port);
        debug!(%destination, size = payload.len(), "Transmitting datagram");
        trace!(%destination, preview = %String::from_utf8_lossy(payload), "Datagram payload");

        match self.socket.send_to(payload, destination.to_socket_addr()) {
            Ok(_) => {
                self.metrics.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                error!(%destination, error = %e, "Failed to send datagram");
            }
        }
    }

    /// Counters shared by every clone of this transmitter
    pub fn metrics(&self) -> Arc<TransmitterMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl<S: DatagramSocket> Clone for Transmitter<S> {
    fn clone(&self) -> Self {
        Self {
            socket: Arc::clone(&self.socket),
            metrics: Arc::clone(&self.metrics),
        }
    }
}
