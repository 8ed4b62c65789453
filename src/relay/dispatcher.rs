use crate::observer::ObserverRegistry;
use crate::queue::{Dequeued, FramedQueue};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// What a single dispatch step did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Records fanned out to observers
    pub delivered: usize,
    /// Bytes discarded because the queue head was malformed
    pub discarded: usize,
    /// Observer invocations that panicked
    pub faults: usize,
}

/// Cooperative step moving records from the queue to the observers
///
/// A step drains at most the records buffered when it starts, so its cost is
/// bounded even while the receiver keeps producing. It never blocks.
pub struct Dispatcher {
    queue: Arc<FramedQueue>,
    registry: Arc<ObserverRegistry>,
    dispatched: AtomicU64,
    observer_faults: AtomicU64,
}

impl Dispatcher {
    /// Creates a dispatcher draining `queue` into `registry`
    pub fn new(queue: Arc<FramedQueue>, registry: Arc<ObserverRegistry>) -> Self {
        Self {
            queue,
            registry,
            dispatched: AtomicU64::new(0),
            observer_faults: AtomicU64::new(0),
        }
    }

    /// Runs one dispatch step
    ///
    /// Stops early at a malformed record: its span is discarded and nothing
    /// further is delivered in this step.
    pub fn dispatch(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        // A resync may leave bytes the record count no longer accounts for,
        // so always look at least once
        let budget = self.queue.len().max(1);

        for _ in 0..budget {
            match self.queue.pop() {
                Dequeued::Empty => break,
                Dequeued::Record(record) => {
                    trace!(source = %record.source(), size = record.len(), "Dispatching record");
                    report.faults += self.registry.notify_all(&record);
                    report.delivered += 1;
                }
                Dequeued::Corrupted { discarded } => {
                    report.discarded = discarded;
                    break;
                }
            }
        }

        if report.delivered > 0 {
            self.dispatched
                .fetch_add(report.delivered as u64, Ordering::Relaxed);
            debug!(
                delivered = report.delivered,
                observers = self.registry.len(),
                "Dispatch step complete"
            );
        }
        if report.faults > 0 {
            self.observer_faults
                .fetch_add(report.faults as u64, Ordering::Relaxed);
        }
        report
    }

    /// Drives dispatch steps whenever records are buffered, forever
    ///
    /// Yields to the scheduler after every step.
    pub async fn run(&self) {
        loop {
            self.queue.readable().await;
            self.dispatch();
            tokio::task::yield_now().await;
        }
    }

    /// Spawns [`Dispatcher::run`] on the given runtime
    pub fn spawn(self: Arc<Self>, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(async move { self.run().await })
    }

    /// Records delivered to observers so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Observer invocations that panicked so far
    pub fn observer_faults(&self) -> u64 {
        self.observer_faults.load(Ordering::Relaxed)
    }
}
