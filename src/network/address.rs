use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// IPv4 endpoint as host-order integers
///
/// This is the address representation at the relay boundary. Conversion to
/// network byte order happens only when talking to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// IPv4 address, host byte order
    pub ip: u32,
    /// UDP port, host byte order
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint from a host-order address and port
    pub const fn new(ip: u32, port: u16) -> Self {
        Self { ip, port }
    }

    /// Converts a socket address reported by the transport
    ///
    /// IPv4-mapped IPv6 addresses are unwrapped; other IPv6 addresses have no
    /// 32-bit representation and yield `None`.
    pub fn from_socket_addr(addr: SocketAddr) -> Option<Self> {
        match addr {
            SocketAddr::V4(v4) => Some(Self::from(v4)),
            SocketAddr::V6(v6) => {
                let ip = v6.ip().to_ipv4_mapped()?;
                Some(Self::from(SocketAddrV4::new(ip, v6.port())))
            }
        }
    }

    /// Socket address for the transport
    pub fn to_socket_addr(self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(self.ip), self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", Ipv4Addr::from(self.ip), self.port)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(u32::from(*addr.ip()), addr.port())
    }
}
