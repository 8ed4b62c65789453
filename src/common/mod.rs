//! Helpers shared by unit tests, integration tests and benches

pub mod test_utils;

pub use test_utils::{RecordingObserver, free_udp_port};
