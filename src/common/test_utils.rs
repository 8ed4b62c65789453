use crate::frame::DatagramRecord;
use crate::observer::Observer;
use std::net::UdpSocket;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Observer that keeps a copy of every datagram it is handed
#[derive(Debug, Default)]
pub struct RecordingObserver {
    received: Mutex<Vec<DatagramRecord>>,
}

impl RecordingObserver {
    /// Records received so far, in delivery order
    pub fn records(&self) -> Vec<DatagramRecord> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of records received so far
    pub fn count(&self) -> usize {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Polls until at least `count` records arrived or `timeout` elapses
    ///
    /// Returns whatever was received by then.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> Vec<DatagramRecord> {
        let deadline = Instant::now() + timeout;
        while self.count() < count && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.records()
    }
}

impl Observer for RecordingObserver {
    fn on_datagram(&self, payload: &[u8], source_ip: u32, source_port: u16) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DatagramRecord::new(payload.to_vec(), source_ip, source_port));
    }
}

/// Finds a UDP port that is currently free on all interfaces
///
/// The probe socket is closed before returning, so the port can be handed to
/// a relay.
pub fn free_udp_port() -> std::io::Result<u16> {
    let probe = UdpSocket::bind("0.0.0.0:0")?;
    Ok(probe.local_addr()?.port())
}
