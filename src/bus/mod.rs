//! Named push-based channels.
//!
//! A [`Bus`] carries values of one type to every listener attached to it.
//! Listeners are detached by dropping the [`BusSubscription`] returned from
//! [`Bus::subscribe`]. Everything a push triggers, including forwarding
//! through plugged buses, happens inside one emission so consumers can order
//! simultaneous deliveries before acting on them.

mod bus;
mod guard;
mod transaction;

pub use bus::Bus;
pub use guard::BusSubscription;
pub(crate) use guard::Detach;
pub(crate) use transaction::{defer, Flush};
