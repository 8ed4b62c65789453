//! The relay context: load, bind, observer registration, dispatch and
//! transmit, wired over one socket, one queue and one registry

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod metrics;

pub use config::{DispatchMode, RelayConfig};
pub use context::Relay;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use metrics::RelayMetrics;
