use super::QueueCapacity;
use crate::frame::{DatagramRecord, RecordCodec};
use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Result of a single [`FramedQueue::pop`]
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    /// No bytes buffered
    Empty,
    /// A complete, well-formed record
    Record(DatagramRecord),
    /// The head of the buffer was malformed and `discarded` bytes were dropped
    Corrupted { discarded: usize },
}

/// Counters describing queue activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    pub enqueued: u64,
    pub overflow_drops: u64,
    pub oversized_drops: u64,
    pub corrupted_spans: u64,
    pub discarded_bytes: u64,
    pub buffered_records: usize,
    pub buffered_bytes: usize,
}

struct Ring {
    buf: BytesMut,
    records: usize,
}

/// Bounded FIFO of framed datagram records
///
/// One producer (the socket receiver) and one consumer (the dispatcher) may
/// use the queue concurrently. Every write checks capacity and encodes the
/// whole record under the same lock, so a reader never sees a partial record.
/// When the queue is full the incoming record is dropped and buffered records
/// are left untouched.
///
/// # Examples
///
/// ```
/// use udprelay::{DatagramRecord, FramedQueue, QueueCapacity};
///
/// let queue = FramedQueue::new(QueueCapacity::Records(1), 64);
/// assert!(queue.enqueue(&DatagramRecord::new(&b"first"[..], 0x7F00_0001, 4000)));
/// assert!(!queue.enqueue(&DatagramRecord::new(&b"second"[..], 0x7F00_0001, 4000)));
///
/// let record = queue.try_dequeue().unwrap();
/// assert_eq!(&record.payload[..], b"first");
/// assert!(queue.try_dequeue().is_none());
/// ```
pub struct FramedQueue {
    ring: Mutex<Ring>,
    codec: RecordCodec,
    capacity_bytes: usize,
    max_records: Option<usize>,
    ready: Notify,
    enqueued: AtomicU64,
    overflow_drops: AtomicU64,
    oversized_drops: AtomicU64,
    corrupted_spans: AtomicU64,
    discarded_bytes: AtomicU64,
}

impl FramedQueue {
    /// Creates a queue with a fixed capacity, allocated up front
    pub fn new(capacity: QueueCapacity, max_frame_len: usize) -> Self {
        let codec = RecordCodec::new(max_frame_len);
        let capacity_bytes = capacity.byte_limit(codec.max_frame_len());
        Self {
            ring: Mutex::new(Ring {
                buf: BytesMut::with_capacity(capacity_bytes),
                records: 0,
            }),
            codec,
            capacity_bytes,
            max_records: capacity.record_limit(),
            ready: Notify::new(),
            enqueued: AtomicU64::new(0),
            overflow_drops: AtomicU64::new(0),
            oversized_drops: AtomicU64::new(0),
            corrupted_spans: AtomicU64::new(0),
            discarded_bytes: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record, or drops it if it does not fit
    ///
    /// Returns false when the record was dropped. Never blocks on the consumer
    /// and never evicts buffered records.
    pub fn enqueue(&self, record: &DatagramRecord) -> bool {
        let needed = RecordCodec::encoded_len(record.len());
        let mut codec = self.codec;

        let outcome = {
            let mut ring = self.lock();
            let records_full = self.max_records.is_some_and(|max| ring.records >= max);
            if records_full || ring.buf.len() + needed > self.capacity_bytes {
                Err(None)
            } else {
                match codec.encode(record, &mut ring.buf) {
                    Ok(()) => {
                        ring.records += 1;
                        Ok(())
                    }
                    Err(e) => Err(Some(e)),
                }
            }
        };

        match outcome {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.ready.notify_one();
                true
            }
            Err(None) => {
                self.overflow_drops.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source = %record.source(),
                    size = record.len(),
                    "Queue full, dropping datagram"
                );
                false
            }
            Err(Some(e)) => {
                self.oversized_drops.fetch_add(1, Ordering::Relaxed);
                warn!(source = %record.source(), error = %e, "Rejecting datagram");
                false
            }
        }
    }

    /// Removes the record at the head of the queue
    ///
    /// Never blocks. A malformed head (bad magic, impossible length, truncated
    /// tail) is discarded up to the next record boundary candidate and
    /// reported as [`Dequeued::Corrupted`]; its bytes are never returned.
    pub fn pop(&self) -> Dequeued {
        let mut codec = self.codec;
        let (error, discarded) = {
            let mut ring = self.lock();
            if ring.buf.is_empty() {
                return Dequeued::Empty;
            }
            match codec.decode(&mut ring.buf) {
                Ok(Some(record)) => {
                    ring.records = ring.records.saturating_sub(1);
                    return Dequeued::Record(record);
                }
                Ok(None) => (None, Self::discard_head(&mut ring)),
                Err(e) => (Some(e), Self::discard_head(&mut ring)),
            }
        };

        self.corrupted_spans.fetch_add(1, Ordering::Relaxed);
        self.discarded_bytes
            .fetch_add(discarded as u64, Ordering::Relaxed);
        match error {
            Some(e) => warn!(discarded, error = %e, "Discarding corrupted record"),
            None => warn!(discarded, "Discarding truncated record"),
        }
        Dequeued::Corrupted { discarded }
    }

    fn discard_head(ring: &mut Ring) -> usize {
        let discarded = RecordCodec::resync(&mut ring.buf);
        ring.records = if ring.buf.is_empty() {
            0
        } else {
            ring.records.saturating_sub(1)
        };
        debug!(discarded, remaining = ring.buf.len(), "Resynchronized queue");
        discarded
    }

    /// Non-blocking dequeue of the next well-formed record
    pub fn try_dequeue(&self) -> Option<DatagramRecord> {
        match self.pop() {
            Dequeued::Record(record) => Some(record),
            Dequeued::Empty | Dequeued::Corrupted { .. } => None,
        }
    }

    /// Waits until at least one byte is buffered
    pub async fn readable(&self) {
        loop {
            let notified = self.ready.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Number of buffered records
    pub fn len(&self) -> usize {
        self.lock().records
    }

    /// Returns true if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    /// Encoded bytes currently buffered
    pub fn buffered_bytes(&self) -> usize {
        self.lock().buf.len()
    }

    /// Fixed byte capacity
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Maximum payload length accepted by [`FramedQueue::enqueue`]
    pub fn max_frame_len(&self) -> usize {
        self.codec.max_frame_len()
    }

    /// Snapshot of the queue counters
    pub fn metrics(&self) -> QueueMetrics {
        let (buffered_records, buffered_bytes) = {
            let ring = self.lock();
            (ring.records, ring.buf.len())
        };
        QueueMetrics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            oversized_drops: self.oversized_drops.load(Ordering::Relaxed),
            corrupted_spans: self.corrupted_spans.load(Ordering::Relaxed),
            discarded_bytes: self.discarded_bytes.load(Ordering::Relaxed),
            buffered_records,
            buffered_bytes,
        }
    }

    /// Gives tests direct access to the raw ring to simulate corruption
    #[cfg(test)]
    pub(crate) fn with_raw_buffer<R>(&self, f: impl FnOnce(&mut BytesMut) -> R) -> R {
        f(&mut self.lock().buf)
    }
}

impl std::fmt::Debug for FramedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedQueue")
            .field("capacity_bytes", &self.capacity_bytes)
            .field("max_records", &self.max_records)
            .field("buffered_bytes", &self.buffered_bytes())
            .finish()
    }
}
