/// Snapshot of everything a relay has counted since load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayMetrics {
    /// Datagrams read from the socket
    pub received: u64,
    /// Failed or empty socket reads
    pub receive_errors: u64,
    /// Datagrams dropped for exceeding the maximum frame length
    pub oversized: u64,
    /// Datagrams dropped because the queue was full
    pub overflow_drops: u64,
    /// Malformed spans removed from the queue
    pub corrupted_spans: u64,
    /// Bytes removed with those spans
    pub discarded_bytes: u64,
    /// Records fanned out to observers
    pub dispatched: u64,
    /// Observer invocations that panicked
    pub observer_faults: u64,
    /// Datagrams sent
    pub transmitted: u64,
    /// Sends the socket rejected
    pub transmit_failures: u64,
    /// Records waiting in the queue
    pub buffered_records: usize,
}
