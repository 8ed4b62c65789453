use crate::frame::DatagramRecord;
use crate::{RelayError, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, warn};

/// Consumer of dispatched datagrams
///
/// Implemented for any `Fn(&[u8], u32, u16)` closure, so plain functions and
/// closures can be registered directly.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use udprelay::{Observer, ObserverRegistry};
///
/// let registry = ObserverRegistry::new(4);
/// let observer: Arc<dyn Observer> = Arc::new(|payload: &[u8], ip: u32, port: u16| {
///     println!("{} bytes from {ip:#010x}:{port}", payload.len());
/// });
///
/// registry.register(Arc::clone(&observer)).unwrap();
/// registry.register(observer).unwrap(); // already present, no duplicate
/// assert_eq!(registry.len(), 1);
/// ```
pub trait Observer: Send + Sync {
    /// Called once per dispatched record with its payload and source address
    fn on_datagram(&self, payload: &[u8], source_ip: u32, source_port: u16);
}

impl<F> Observer for F
where
    F: Fn(&[u8], u32, u16) + Send + Sync,
{
    fn on_datagram(&self, payload: &[u8], source_ip: u32, source_port: u16) {
        self(payload, source_ip, source_port)
    }
}

/// Observers compare by the address of their shared allocation
fn same_observer(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Fixed-capacity, append-ordered set of observers
pub struct ObserverRegistry {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
    capacity: usize,
}

impl ObserverRegistry {
    /// Creates a registry with room for `capacity` observers
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: RwLock::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Adds an observer, ignoring it if it is already registered
    ///
    /// Fails only when the registry is full.
    pub fn register(&self, observer: Arc<dyn Observer>) -> Result<()> {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if observers.iter().any(|o| same_observer(o, &observer)) {
            debug!("Observer already registered");
            return Ok(());
        }
        if observers.len() >= self.capacity {
            error!(capacity = self.capacity, "Register observer failed, registry is full");
            return Err(RelayError::RegistryFull {
                capacity: self.capacity,
            });
        }

        observers.push(observer);
        debug!(observers = observers.len(), "Observer registered");
        Ok(())
    }

    /// Removes an observer by identity, returning whether it was present
    pub fn unregister(&self, observer: &Arc<dyn Observer>) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        before != observers.len()
    }

    /// Returns true if the observer is registered
    pub fn contains(&self, observer: &Arc<dyn Observer>) -> bool {
        self.snapshot().iter().any(|o| same_observer(o, observer))
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no observers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of observers
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Invokes every observer with the record, in registration order
    ///
    /// The registry lock is not held while observers run, so an observer may
    /// register or unregister others. A panicking observer is logged and
    /// skipped; the remaining observers still run. Returns the number of
    /// observers that panicked.
    pub fn notify_all(&self, record: &DatagramRecord) -> usize {
        let mut faults = 0;
        for (index, observer) in self.snapshot().iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                observer.on_datagram(&record.payload, record.source_ip, record.source_port)
            }));
            if result.is_err() {
                faults += 1;
                warn!(
                    observer = index,
                    source = %record.source(),
                    "Observer panicked while handling datagram"
                );
            }
        }
        faults
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RecordingObserver;

    struct PanickingObserver;

    impl Observer for PanickingObserver {
        fn on_datagram(&self, _payload: &[u8], _source_ip: u32, _source_port: u16) {
            panic!("observer failure");
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ObserverRegistry::new(4);
        let recorder = Arc::new(RecordingObserver::default());
        let observer: Arc<dyn Observer> = recorder.clone();

        registry.register(Arc::clone(&observer)).unwrap();
        registry.register(Arc::clone(&observer)).unwrap();
        assert_eq!(registry.len(), 1);

        registry.notify_all(&DatagramRecord::new(&b"once"[..], 1, 1));
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn test_registry_capacity() {
        let registry = ObserverRegistry::new(2);
        for _ in 0..2 {
            registry
                .register(Arc::new(RecordingObserver::default()))
                .unwrap();
        }

        let result = registry.register(Arc::new(RecordingObserver::default()));
        assert!(matches!(result, Err(RelayError::RegistryFull { capacity: 2 })));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_notify_in_registration_order() {
        let registry = ObserverRegistry::new(4);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = Arc::clone(&order);
            registry
                .register(Arc::new(move |_: &[u8], _: u32, _: u16| {
                    order.lock().unwrap().push(id);
                }))
                .unwrap();
        }

        registry.notify_all(&DatagramRecord::new(&b"x"[..], 1, 1));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_fan_out() {
        let registry = ObserverRegistry::new(4);
        let before = Arc::new(RecordingObserver::default());
        let after = Arc::new(RecordingObserver::default());

        registry.register(before.clone()).unwrap();
        registry.register(Arc::new(PanickingObserver)).unwrap();
        registry.register(after.clone()).unwrap();

        let faults = registry.notify_all(&DatagramRecord::new(&b"data"[..], 7, 7));
        assert_eq!(faults, 1);
        assert_eq!(before.count(), 1);
        assert_eq!(after.count(), 1);
    }

    #[test]
    fn test_unregister_by_identity() {
        let registry = ObserverRegistry::new(4);
        let kept: Arc<dyn Observer> = Arc::new(RecordingObserver::default());
        let removed: Arc<dyn Observer> = Arc::new(RecordingObserver::default());

        registry.register(Arc::clone(&kept)).unwrap();
        registry.register(Arc::clone(&removed)).unwrap();

        assert!(registry.unregister(&removed));
        assert!(!registry.unregister(&removed));
        assert!(registry.contains(&kept));
        assert!(!registry.contains(&removed));
        assert_eq!(registry.len(), 1);
    }
}
