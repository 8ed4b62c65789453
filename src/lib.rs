use crate::frame::FrameError;
use thiserror::Error;

/// Error types for the udprelay library
#[derive(Error, Debug)]
pub enum RelayError {
    /// Socket creation or bind failures
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// The receiver thread could not be started
    #[error("Failed to start receiver thread: {0}")]
    Thread(std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The relay is already bound to another local port
    #[error("Already bound to port {bound}, cannot bind port {requested}")]
    AlreadyBound { bound: u16, requested: u16 },

    /// The observer registry has no free slots
    #[error("Observer registry is full ({capacity} observers)")]
    RegistryFull { capacity: usize },

    /// Record framing errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Result type for the udprelay library
pub type Result<T> = std::result::Result<T, RelayError>;

pub mod common;
pub mod frame;
pub mod network;
pub mod observer;
pub mod queue;
pub mod relay;

// Re-export main types for convenience
pub use frame::{DatagramRecord, RecordCodec};
pub use network::{DatagramSocket, SocketReceiver, Transmitter};
pub use observer::{Observer, ObserverRegistry};
pub use queue::{Dequeued, FramedQueue, QueueCapacity};
pub use relay::{DispatchMode, Dispatcher, Relay, RelayConfig, RelayMetrics};
