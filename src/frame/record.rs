use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// One datagram as it moves through the relay queue
///
/// Addresses are host-order integers at this boundary; conversion to network
/// order only happens at the socket edge.
#[derive(Clone, PartialEq, Eq)]
pub struct DatagramRecord {
    /// Datagram payload
    pub payload: Bytes,
    /// Source IPv4 address, host byte order
    pub source_ip: u32,
    /// Source UDP port, host byte order
    pub source_port: u16,
}

impl DatagramRecord {
    /// Creates a record from a payload and its source address
    pub fn new(payload: impl Into<Bytes>, source_ip: u32, source_port: u16) -> Self {
        Self {
            payload: payload.into(),
            source_ip,
            source_port,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Source address as a socket address
    pub fn source(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.source_ip), self.source_port)
    }
}

impl fmt::Debug for DatagramRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramRecord")
            .field("source", &self.source())
            .field("len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_is_host_order() {
        let record = DatagramRecord::new(&b"ping"[..], 0x7F00_0001, 9000);
        assert_eq!(record.source().to_string(), "127.0.0.1:9000");
        assert_eq!(record.len(), 4);
        assert!(!record.is_empty());
    }
}
