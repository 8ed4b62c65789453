//! Socket edge of the relay: addressing, raw socket setup, the blocking
//! receive loop and the synchronous transmit path

pub mod address;
pub mod receiver;
pub mod socket;
pub mod transmitter;

pub use address::Endpoint;
pub use receiver::{ReceiveOutcome, ReceiverMetrics, SocketReceiver};
pub use socket::{DatagramSocket, bind_ipv4, open_udp_socket};
pub use transmitter::{Transmitter, TransmitterMetrics};
