use crate::frame::RecordCodec;
use crate::queue::QueueCapacity;
use crate::{RelayError, Result};

/// Largest payload a single UDP datagram over Ethernet usually carries
pub const DEFAULT_MAX_FRAME_LEN: usize = 1500;

/// Default number of observer slots
pub const DEFAULT_MAX_OBSERVERS: usize = 16;

/// How the dispatch step gets driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// A task on the current tokio runtime runs a step whenever records are buffered
    #[default]
    Scheduled,
    /// The caller invokes [`Relay::dispatch`](super::Relay::dispatch) itself
    Manual,
}

/// Load-time configuration of a relay
///
/// Capacities are fixed for the lifetime of the relay.
///
/// # Examples
///
/// ```
/// use udprelay::{DispatchMode, QueueCapacity, RelayConfig};
///
/// let config = RelayConfig::new(512, QueueCapacity::Records(32))
///     .with_max_observers(4)
///     .with_dispatch(DispatchMode::Manual);
///
/// assert_eq!(config.max_frame_len, 512);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum payload length of a relayed datagram
    pub max_frame_len: usize,
    /// Capacity of the framed queue
    pub queue_capacity: QueueCapacity,
    /// Capacity of the observer registry
    pub max_observers: usize,
    /// Dispatch driver
    pub dispatch: DispatchMode,
}

impl RelayConfig {
    /// Creates a configuration with the given frame and queue limits
    pub fn new(max_frame_len: usize, queue_capacity: QueueCapacity) -> Self {
        Self {
            max_frame_len,
            queue_capacity,
            max_observers: DEFAULT_MAX_OBSERVERS,
            dispatch: DispatchMode::default(),
        }
    }

    /// Set the maximum payload length
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, queue_capacity: QueueCapacity) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the number of observer slots
    pub fn with_max_observers(mut self, max_observers: usize) -> Self {
        self.max_observers = max_observers;
        self
    }

    /// Set how dispatch is driven
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Checks that the limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_frame_len == 0 || self.max_frame_len > u16::MAX as usize {
            return Err(RelayError::Config(format!(
                "max_frame_len must be between 1 and {}, got {}",
                u16::MAX,
                self.max_frame_len
            )));
        }

        let capacity = self.queue_capacity.byte_limit(self.max_frame_len);
        let largest = RecordCodec::encoded_len(self.max_frame_len);
        if capacity < largest || self.queue_capacity.record_limit() == Some(0) {
            return Err(RelayError::Config(format!(
                "queue capacity of {capacity} bytes cannot hold one {largest}-byte record"
            )));
        }

        if self.max_observers == 0 {
            return Err(RelayError::Config(
                "max_observers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN, QueueCapacity::default())
    }
}
