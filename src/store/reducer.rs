use crate::error::{BoxError, Error, Result};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type ReduceFn<S, V> = dyn Fn(&S, &V) -> std::result::Result<S, BoxError> + Send + Sync;

/// State transition applied when a value arrives on an action's bus.
///
/// Reducers receive the current state and the pushed value and return the
/// next state. They are expected to be pure.
pub struct Reducer<S, V> {
    apply: Arc<ReduceFn<S, V>>,
}

impl<S: 'static, V: 'static> Reducer<S, V> {
    /// Wrap an infallible reducer.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&S, &V) -> S + Send + Sync + 'static,
    {
        Self {
            apply: Arc::new(move |state: &S, value: &V| Ok(f(state, value))),
        }
    }

    /// Wrap a reducer that can reject a value.
    ///
    /// An `Err` terminates the subscription that invoked it.
    pub fn try_new<F>(f: F) -> Self
    where
        F: Fn(&S, &V) -> std::result::Result<S, BoxError> + Send + Sync + 'static,
    {
        Self { apply: Arc::new(f) }
    }
}

impl<S, V> Reducer<S, V> {
    /// Run the reducer, turning both errors and panics into [`Error`].
    pub(crate) fn apply(&self, action: &str, state: &S, value: &V) -> Result<S> {
        match catch_unwind(AssertUnwindSafe(|| (self.apply)(state, value))) {
            Ok(Ok(next)) => Ok(next),
            Ok(Err(err)) => Err(Error::ReducerFailed {
                action: action.to_string(),
                message: err.to_string(),
            }),
            Err(payload) => Err(Error::from_panic(action, payload)),
        }
    }
}

impl<S, V> Clone for Reducer<S, V> {
    fn clone(&self) -> Self {
        Self {
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<S, V> fmt::Debug for Reducer<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reducer")
    }
}
