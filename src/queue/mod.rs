//! Bounded hand-off buffer between the socket receiver and the dispatcher

pub mod capacity;
pub mod framed_queue;

pub use capacity::QueueCapacity;
pub use framed_queue::{Dequeued, FramedQueue, QueueMetrics};
