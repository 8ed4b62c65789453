use super::config::{DispatchMode, RelayConfig};
use super::dispatcher::{DispatchReport, Dispatcher};
use super::metrics::RelayMetrics;
use crate::network::{ReceiverMetrics, SocketReceiver, Transmitter, bind_ipv4, open_udp_socket};
use crate::observer::{Observer, ObserverRegistry};
use crate::queue::FramedQueue;
use crate::{RelayError, Result};
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, Thread};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// One socket, one queue, one observer registry
///
/// A relay is created by [`Relay::load`], which is the only way to obtain
/// one, so no other operation can run before loading. Independent relays can
/// coexist in the same process.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use udprelay::{Relay, RelayConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let relay = Relay::load(RelayConfig::default())?;
///     relay.bind(5000)?;
///
///     let replies = relay.transmitter();
///     relay.register_observer(Arc::new(move |payload: &[u8], ip: u32, port: u16| {
///         replies.transmit(payload, ip, port);
///     }))?;
///
///     tokio::signal::ctrl_c().await?;
///     Ok(())
/// }
/// ```
pub struct Relay {
    config: RelayConfig,
    socket: Arc<UdpSocket>,
    queue: Arc<FramedQueue>,
    registry: Arc<ObserverRegistry>,
    dispatcher: Arc<Dispatcher>,
    transmitter: Transmitter,
    receiver_metrics: Arc<ReceiverMetrics>,
    local_port: Arc<OnceLock<u16>>,
    bind_guard: Mutex<()>,
    receiver_thread: Thread,
    dispatch_task: Option<JoinHandle<()>>,
}

impl Relay {
    /// Allocates the queue and registry, opens the socket, and starts the
    /// receiver thread and the dispatch hook
    ///
    /// The receiver stays parked until [`Relay::bind`] succeeds. With
    /// [`DispatchMode::Scheduled`] this must be called from within a tokio
    /// runtime.
    pub fn load(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let runtime = match config.dispatch {
            DispatchMode::Scheduled => Some(Handle::try_current().map_err(|e| {
                RelayError::Config(format!("scheduled dispatch requires a tokio runtime: {e}"))
            })?),
            DispatchMode::Manual => None,
        };

        let queue = Arc::new(FramedQueue::new(config.queue_capacity, config.max_frame_len));
        let registry = Arc::new(ObserverRegistry::new(config.max_observers));

        let socket = Arc::new(open_udp_socket().map_err(|e| {
            error!(error = %e, "Load failed, could not create socket");
            RelayError::Socket(e)
        })?);
        info!("Socket created");

        let receiver = SocketReceiver::new(Arc::clone(&socket), Arc::clone(&queue));
        let receiver_metrics = receiver.metrics();
        let local_port = Arc::new(OnceLock::new());

        let receiver_thread = {
            let bound = Arc::clone(&local_port);
            thread::Builder::new()
                .name("udprelay-rx".to_string())
                .spawn(move || {
                    while bound.get().is_none() {
                        thread::park();
                    }
                    receiver.run()
                })
                .map_err(|e| {
                    error!(error = %e, "Load failed, could not start receiver thread");
                    RelayError::Thread(e)
                })?
                .thread()
                .clone()
        };

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&queue), Arc::clone(&registry)));
        let dispatch_task = runtime.map(|handle| Arc::clone(&dispatcher).spawn(&handle));

        info!(
            max_frame_len = config.max_frame_len,
            capacity_bytes = queue.capacity_bytes(),
            max_observers = config.max_observers,
            dispatch = ?config.dispatch,
            "Relay loaded"
        );

        Ok(Self {
            transmitter: Transmitter::new(Arc::clone(&socket)),
            config,
            socket,
            queue,
            registry,
            dispatcher,
            receiver_metrics,
            local_port,
            bind_guard: Mutex::new(()),
            receiver_thread,
            dispatch_task,
        })
    }

    /// Binds the socket to a local port on all IPv4 interfaces
    ///
    /// The first successful call fixes the port for the lifetime of the relay.
    /// Asking for the same port again succeeds without effect; asking for a
    /// different one fails and leaves the binding unchanged.
    pub fn bind(&self, port: u16) -> Result<()> {
        let _guard = self.bind_guard.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(&bound) = self.local_port.get() {
            if bound == port {
                return Ok(());
            }
            error!(bound, requested = port, "Already bound, cannot bind another port");
            return Err(RelayError::AlreadyBound {
                bound,
                requested: port,
            });
        }

        bind_ipv4(&self.socket, port).map_err(|e| {
            error!(port, error = %e, "Socket unable to bind");
            RelayError::Socket(e)
        })?;

        let _ = self.local_port.set(port);
        self.receiver_thread.unpark();
        info!(port, "Socket bound");
        Ok(())
    }

    /// Registers an observer for every dispatched datagram
    ///
    /// Registering an observer that is already present succeeds without
    /// adding a second entry.
    pub fn register_observer(&self, observer: Arc<dyn Observer>) -> Result<()> {
        self.registry.register(observer)
    }

    /// Removes a previously registered observer
    pub fn unregister_observer(&self, observer: &Arc<dyn Observer>) -> bool {
        self.registry.unregister(observer)
    }

    /// Sends a datagram to a host-order IPv4 address and port
    ///
    /// Fire-and-forget: failures are logged, never returned.
    pub fn transmit(&self, payload: &[u8], destination_ip: u32, destination_port: u16) {
        self.transmitter
            .transmit(payload, destination_ip, destination_port);
    }

    /// A transmitter sharing this relay's socket
    pub fn transmitter(&self) -> Transmitter {
        self.transmitter.clone()
    }

    /// Runs one dispatch step on the caller's context
    ///
    /// This is what the scheduled hook runs; with [`DispatchMode::Manual`]
    /// the caller drives it.
    pub fn dispatch(&self) -> DispatchReport {
        self.dispatcher.dispatch()
    }

    /// The port passed to the first successful [`Relay::bind`]
    pub fn local_port(&self) -> Option<u16> {
        self.local_port.get().copied()
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The framed queue between receiver and dispatcher
    pub fn queue(&self) -> &FramedQueue {
        &self.queue
    }

    /// Configuration the relay was loaded with
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Snapshot of the relay counters
    pub fn metrics(&self) -> RelayMetrics {
        let queue = self.queue.metrics();
        let transmitter = self.transmitter.metrics();
        RelayMetrics {
            received: self.receiver_metrics.received(),
            receive_errors: self.receiver_metrics.receive_errors(),
            oversized: self.receiver_metrics.oversized() + queue.oversized_drops,
            overflow_drops: queue.overflow_drops,
            corrupted_spans: queue.corrupted_spans,
            discarded_bytes: queue.discarded_bytes,
            dispatched: self.dispatcher.dispatched(),
            observer_faults: self.dispatcher.observer_faults(),
            transmitted: transmitter.sent(),
            transmit_failures: transmitter.failures(),
            buffered_records: queue.buffered_records,
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("local_port", &self.local_port())
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .finish()
    }
}
