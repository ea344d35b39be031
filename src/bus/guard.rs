use std::fmt;
use std::sync::Weak;

/// Something a listener can be detached from.
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, listener_id: usize);
}

/// RAII guard for a bus listener.
///
/// The listener stays attached until the guard is dropped. The guard only
/// holds a weak reference, so it never keeps the bus alive.
#[must_use = "dropping a BusSubscription detaches the listener"]
pub struct BusSubscription {
    listener_id: usize,
    bus: Weak<dyn Detach>,
}

impl BusSubscription {
    pub(crate) fn new(listener_id: usize, bus: Weak<dyn Detach>) -> Self {
        Self { listener_id, bus }
    }

    /// Returns true while the bus this listener is attached to still exists.
    pub fn is_attached(&self) -> bool {
        self.bus.strong_count() > 0
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(self.listener_id);
        }
    }
}

impl fmt::Debug for BusSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSubscription")
            .field("listener_id", &self.listener_id)
            .field("attached", &self.is_attached())
            .finish()
    }
}
