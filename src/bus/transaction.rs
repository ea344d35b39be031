//! Emission transactions.
//!
//! Every value pushed from outside a listener opens a root emission on the
//! current thread. Pushes made by listeners while it is open (plug
//! forwarding, for instance) belong to the same emission. Consumers that
//! need to see everything one root push caused before reacting defer
//! themselves with [`defer`] and are flushed when the root push returns.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Something that collects deliveries and acts on them after a root push.
pub(crate) trait Flush: Send + Sync {
    fn flush(&self);
}

static NEXT_EMISSION: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
struct Transaction {
    depth: usize,
    emission: u64,
    deferred: Vec<Weak<dyn Flush>>,
}

thread_local! {
    static TRANSACTION: RefCell<Transaction> = RefCell::new(Transaction::default());
}

/// Scope of one push. Dropping the outermost scope flushes deferred consumers.
pub(crate) struct Emission(());

impl Emission {
    pub(crate) fn begin() -> Self {
        TRANSACTION.with(|t| {
            let mut t = t.borrow_mut();
            if t.depth == 0 {
                t.emission = NEXT_EMISSION.fetch_add(1, Ordering::SeqCst);
            }
            t.depth += 1;
        });
        Emission(())
    }
}

impl Drop for Emission {
    fn drop(&mut self) {
        let deferred = TRANSACTION.with(|t| {
            let mut t = t.borrow_mut();
            t.depth -= 1;
            if t.depth == 0 {
                std::mem::take(&mut t.deferred)
            } else {
                Vec::new()
            }
        });

        // A listener panicked; consumers pick their batch up on the next flush.
        if std::thread::panicking() {
            return;
        }

        for target in deferred {
            if let Some(target) = target.upgrade() {
                target.flush();
            }
        }
    }
}

/// Schedule `target` to be flushed when the current root push returns.
///
/// Returns the id of the open root emission, or `None` when no push is in
/// progress on this thread.
pub(crate) fn defer(target: Weak<dyn Flush>) -> Option<u64> {
    TRANSACTION.with(|t| {
        let mut t = t.borrow_mut();
        if t.depth == 0 {
            return None;
        }
        if !t.deferred.iter().any(|queued| queued.ptr_eq(&target)) {
            t.deferred.push(target);
        }
        Some(t.emission)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Counter(Mutex<usize>);

    impl Flush for Counter {
        fn flush(&self) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn defer_outside_emission_is_refused() {
        let counter: Arc<dyn Flush> = Arc::new(Counter(Mutex::new(0)));
        assert_eq!(defer(Arc::downgrade(&counter)), None);
    }

    #[test]
    fn nested_emissions_flush_once_at_root() {
        let counter = Arc::new(Counter(Mutex::new(0)));
        let target: Arc<dyn Flush> = counter.clone();

        let root = Emission::begin();
        let first = defer(Arc::downgrade(&target));
        {
            let _nested = Emission::begin();
            assert_eq!(defer(Arc::downgrade(&target)), first);
        }
        assert_eq!(*counter.0.lock().unwrap(), 0);
        drop(root);

        assert_eq!(*counter.0.lock().unwrap(), 1);
    }

    #[test]
    fn each_root_gets_a_new_id() {
        let counter: Arc<dyn Flush> = Arc::new(Counter(Mutex::new(0)));

        let first = {
            let _root = Emission::begin();
            defer(Arc::downgrade(&counter))
        };
        let second = {
            let _root = Emission::begin();
            defer(Arc::downgrade(&counter))
        };

        assert!(first.unwrap() < second.unwrap());
    }
}
