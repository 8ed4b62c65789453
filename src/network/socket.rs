//! Raw UDP socket setup
//!
//! The relay opens its socket at load time but binds it later, once the caller
//! picks a port. std::net::UdpSocket can only be created already bound, so the
//! socket is created with libc, wrapped into a std socket, and bound in place
//! when `bind` is called.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::io::{AsRawFd, FromRawFd};

/// Blocking datagram transport used by the receiver and the transmitter
///
/// Implemented for [`std::net::UdpSocket`]; tests substitute scripted sockets.
pub trait DatagramSocket: Send + Sync + 'static {
    /// Blocks until a datagram arrives, copying it into `buf`
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Sends one datagram to `addr`
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

impl DatagramSocket for UdpSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }

    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_DGRAM | libc::SOCK_CLOEXEC;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCKET_TYPE: libc::c_int = libc::SOCK_DGRAM;

/// Creates an unbound, blocking IPv4 UDP socket
pub fn open_udp_socket() -> io::Result<UdpSocket> {
    let fd = unsafe { libc::socket(libc::AF_INET, SOCKET_TYPE, libc::IPPROTO_UDP) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    // Safety: fd is a freshly created socket owned by nobody else
    let socket = unsafe { UdpSocket::from_raw_fd(fd) };
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Binds an open socket to `port` on all IPv4 interfaces
pub fn bind_ipv4(socket: &UdpSocket, port: u16) -> io::Result<()> {
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_port = port.to_be();
    addr.sin_addr = libc::in_addr {
        s_addr: libc::INADDR_ANY.to_be(),
    };
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        addr.sin_len = std::mem::size_of::<libc::sockaddr_in>() as u8;
    }

    let result = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
