//! Name-keyed cache of buses.

mod registry;

pub use registry::Registry;
