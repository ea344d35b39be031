use super::transaction::Emission;
use super::{BusSubscription, Detach};
use crate::sync::{lock, read, write};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, trace, warn};

type Listener<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct BusInner<V> {
    name: String,
    next_id: AtomicUsize,
    listeners: RwLock<Vec<(usize, Listener<V>)>>,
    // Forwarding links from other buses into this one. Dropping them (with
    // this bus) detaches the forwarding listener from the source.
    plugs: Mutex<Vec<BusSubscription>>,
}

impl<V> Detach for BusInner<V> {
    fn detach(&self, listener_id: usize) {
        write(&self.listeners).retain(|(id, _)| *id != listener_id);
    }
}

/// A named, shared, push-based channel.
///
/// Cloning a `Bus` yields another handle to the same channel; use
/// [`Bus::ptr_eq`] to compare identity.
///
/// # Examples
///
/// ```
/// use busbind::Bus;
/// use std::sync::{Arc, Mutex};
///
/// let bus = Bus::new("clicks");
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
///
/// let _guard = bus.subscribe(move |v: &i32| seen_clone.lock().unwrap().push(*v));
/// bus.push(1);
/// bus.push(2);
///
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// ```
pub struct Bus<V> {
    inner: Arc<BusInner<V>>,
}

impl<V: Clone + Send + Sync + 'static> Bus<V> {
    /// Create a new bus with no listeners.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name: name.into(),
                next_id: AtomicUsize::new(0),
                listeners: RwLock::new(Vec::new()),
                plugs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The name this bus was created with.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Emit a value to every current listener, in subscription order.
    ///
    /// Values are not buffered: listeners attached later never see it.
    pub fn push(&self, value: V) {
        let listeners: Vec<Listener<V>> = read(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        trace!(bus = %self.inner.name, listeners = listeners.len(), "push");

        let _emission = Emission::begin();
        for listener in listeners {
            listener(&value);
        }
    }

    /// Attach a listener that is called with every value pushed from now on.
    pub fn subscribe<F>(&self, listener: F) -> BusSubscription
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        let listener_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        write(&self.inner.listeners).push((listener_id, Arc::new(listener)));

        let bus: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        BusSubscription::new(listener_id, bus)
    }

    /// Forward every value later pushed on `source` into this bus.
    ///
    /// The link lasts as long as both buses exist.
    pub fn plug(&self, source: &Bus<V>) {
        if self.ptr_eq(source) {
            warn!(bus = %self.inner.name, "ignoring attempt to plug a bus into itself");
            return;
        }

        let target = Arc::downgrade(&self.inner);
        let guard = source.subscribe(move |value: &V| {
            if let Some(inner) = target.upgrade() {
                Bus { inner }.push(value.clone());
            }
        });
        let mut plugs = lock(&self.inner.plugs);
        plugs.retain(BusSubscription::is_attached);
        plugs.push(guard);
        drop(plugs);

        debug!(source = %source.inner.name, target = %self.inner.name, "plugged bus");
    }

    /// Number of listeners currently attached, forwarding links included.
    pub fn subscriber_count(&self) -> usize {
        read(&self.inner.listeners).len()
    }
}

impl<V> Bus<V> {
    /// Returns true if both handles refer to the same channel.
    pub fn ptr_eq(&self, other: &Bus<V>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<V> Clone for Bus<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Bus<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.inner.name)
            .field("listeners", &read(&self.inner.listeners).len())
            .finish()
    }
}
