use crate::frame::RecordCodec;

/// Fixed capacity of a [`FramedQueue`](super::FramedQueue)
///
/// # Examples
///
/// ```
/// use udprelay::QueueCapacity;
///
/// // Room for two maximum-size frames of 100 bytes, and never more than two records
/// let capacity = QueueCapacity::Records(2);
/// assert_eq!(capacity.record_limit(), Some(2));
/// assert_eq!(capacity.byte_limit(100), 2 * (12 + 100));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCapacity {
    /// Total encoded bytes (headers included)
    Bytes(usize),
    /// Number of records, each budgeted at the maximum frame length
    Records(usize),
}

impl QueueCapacity {
    /// Byte budget of the ring for the given maximum payload length
    pub fn byte_limit(self, max_frame_len: usize) -> usize {
        match self {
            QueueCapacity::Bytes(bytes) => bytes,
            QueueCapacity::Records(records) => {
                records.saturating_mul(RecordCodec::encoded_len(max_frame_len))
            }
        }
    }

    /// Maximum number of buffered records, if limited by count
    pub fn record_limit(self) -> Option<usize> {
        match self {
            QueueCapacity::Bytes(_) => None,
            QueueCapacity::Records(records) => Some(records),
        }
    }
}

impl Default for QueueCapacity {
    fn default() -> Self {
        QueueCapacity::Bytes(64 * 1024)
    }
}
