use crate::bus::Bus;
use crate::sync::lock;
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A registry handing out exactly one [`Bus`] per name.
///
/// The first lookup of a name creates its bus; every later lookup returns a
/// handle to the same bus, so producers pushing by name and consumers
/// watching by name always meet. Clones of a registry share the same table.
///
/// # Examples
///
/// ```
/// use busbind::Registry;
///
/// let registry: Registry<i32> = Registry::new();
/// let a = registry.stream("INC");
/// let b = registry.stream("INC");
/// assert!(a.ptr_eq(&b));
/// ```
pub struct Registry<V> {
    buses: Arc<Mutex<IndexMap<String, Bus<V>>>>,
}

impl<V: Clone + Send + Sync + 'static> Registry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            buses: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// Get the bus for `name`, creating it on first access.
    pub fn stream(&self, name: &str) -> Bus<V> {
        let mut buses = lock(&self.buses);
        if let Some(bus) = buses.get(name) {
            return bus.clone();
        }

        let bus = Bus::new(name);
        buses.insert(name.to_string(), bus.clone());
        debug!(bus = name, total = buses.len(), "created bus");
        bus
    }

    /// Push a value onto the bus for `name`.
    ///
    /// Nothing happens beyond creating the bus if no one is listening.
    pub fn push(&self, name: &str, value: V) {
        self.stream(name).push(value);
    }

    /// Forward every value later emitted on `source` into the bus for `name`.
    pub fn plug(&self, name: &str, source: &Bus<V>) {
        self.stream(name).plug(source);
    }

    /// Returns true if a bus for `name` has been created.
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.buses).contains_key(name)
    }

    /// Number of buses created so far.
    pub fn len(&self) -> usize {
        lock(&self.buses).len()
    }

    /// Returns true if no bus has been created yet.
    pub fn is_empty(&self) -> bool {
        lock(&self.buses).is_empty()
    }

    /// Names of all buses, in creation order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.buses).keys().cloned().collect()
    }

    /// Forget every bus.
    ///
    /// Existing `Bus` handles keep working, but later lookups by name create
    /// fresh buses.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *lock(&self.buses));
        debug!(buses = dropped.len(), "cleared registry");
    }
}

impl<V: Clone + Send + Sync + 'static> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for Registry<V> {
    fn clone(&self) -> Self {
        Self {
            buses: Arc::clone(&self.buses),
        }
    }
}

impl<V> fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("buses", &lock(&self.buses).keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_is_idempotent() {
        let registry: Registry<i32> = Registry::new();
        let first = registry.stream("INC");
        let second = registry.stream("INC");
        let other = registry.stream("DEC");

        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&other));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["INC".to_string(), "DEC".to_string()]);
    }

    #[test]
    fn clones_share_buses() {
        let registry: Registry<i32> = Registry::new();
        let clone = registry.clone();

        assert!(registry.stream("A").ptr_eq(&clone.stream("A")));
        assert_eq!(clone.len(), 1);
    }

    #[test]
    fn separate_registries_are_isolated() {
        let a: Registry<i32> = Registry::new();
        let b: Registry<i32> = Registry::new();

        assert!(!a.stream("A").ptr_eq(&b.stream("A")));
    }

    #[test]
    fn push_creates_bus_and_delivers() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        registry.push("nobody", 1);
        assert!(registry.contains("nobody"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _guard = registry
            .stream("A")
            .subscribe(move |v: &i32| seen_clone.lock().unwrap().push(*v));

        registry.push("A", 4);
        registry.push("A", 5);

        assert_eq!(*seen.lock().unwrap(), vec![4, 5]);
    }

    #[test]
    fn plug_by_name() {
        let registry = Registry::new();
        let source = Bus::new("external");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _guard = registry
            .stream("A")
            .subscribe(move |v: &i32| seen_clone.lock().unwrap().push(*v));

        registry.plug("A", &source);
        source.push(9);

        assert_eq!(*seen.lock().unwrap(), vec![9]);
    }

    #[test]
    fn clear_forgets_buses() {
        let registry: Registry<i32> = Registry::new();
        let before = registry.stream("A");
        registry.clear();

        assert!(registry.is_empty());
        assert!(!before.ptr_eq(&registry.stream("A")));
    }
}
