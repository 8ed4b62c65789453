//! Registered consumers of dispatched datagrams

pub mod registry;

pub use registry::{Observer, ObserverRegistry};
