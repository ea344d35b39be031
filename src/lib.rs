//! # busbind
//!
//! Bind named action buses to reducers and drive a render callback from the
//! resulting state.
//!
//! ## Buses and the registry
//!
//! - `Bus<V>` - A push-based channel shared by producers and consumers
//! - `Registry<V>` - Hands out exactly one bus per name, created on first use
//!
//! ## Stores
//!
//! - `Store<S, V>` - A reducer per action name plus an initial state
//! - `Subscription<S>` - A live fold of every action bus into one state,
//!   rendering after each update until it is dropped or a reducer fails
//!
//! ```
//! use busbind::{Registry, Store};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = Registry::new();
//! let store = Store::builder(&registry, 0)
//!     .reducer("INC", |count: &i32, by: &i32| count + by)
//!     .reducer("RESET", |_: &i32, _: &i32| 0)
//!     .build()
//!     .unwrap();
//!
//! let last = Arc::new(Mutex::new(None));
//! let sink = last.clone();
//! let _subscription = store.subscribe(move |count: &i32| *sink.lock().unwrap() = Some(*count));
//!
//! registry.push("INC", 2);
//! assert_eq!(*last.lock().unwrap(), Some(2));
//!
//! registry.push("RESET", 0);
//! assert_eq!(*last.lock().unwrap(), Some(0));
//! ```

pub mod bus;
pub mod error;
pub mod registry;
pub mod store;
mod sync;

// Re-export main types for convenience
pub use bus::{Bus, BusSubscription};
pub use error::{BoxError, Error, Result};
pub use registry::Registry;
pub use store::{
    bind, Reducer, Store, StoreBuilder, StoreOptions, Subscription, SubscriptionStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let registry = Registry::new();
        let store = Store::builder(&registry, 0)
            .reducer("SET", |_: &i32, v: &i32| *v)
            .build()
            .unwrap();
        let subscription = store.subscribe(|_| {});
        assert_eq!(subscription.state(), 0);
        registry.push("SET", 42);
        assert_eq!(subscription.state(), 42);
    }
}
