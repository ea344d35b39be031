//! Reducer tables bound to registry buses.
//!
//! A [`Store`] pairs each action name with a [`Reducer`]. Subscribing to a
//! store folds every value pushed on those actions' buses into one running
//! state and hands each new state to a render callback.

mod reducer;
mod store;
mod subscription;

pub use reducer::Reducer;
pub use store::{bind, Store, StoreBuilder, StoreOptions};
pub use subscription::{Subscription, SubscriptionStatus};
