use super::reducer::Reducer;
use crate::bus::{defer, BusSubscription, Flush};
use crate::error::Error;
use crate::sync::lock;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, trace};

pub(crate) type Render<S> = Box<dyn Fn(&S) + Send + Sync>;
pub(crate) type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;

/// Lifecycle of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Watching its buses and rendering updates.
    Active,
    /// A reducer failed; see [`Subscription::error`].
    Failed,
    /// Disposed by its owner.
    Released,
}

pub(crate) struct Binding<S, V> {
    pub(crate) action: String,
    pub(crate) reducer: Reducer<S, V>,
}

struct Accumulator<S, V> {
    state: S,
    // Deliveries of open root emissions: (emission, binding index, value).
    pending: Vec<(u64, usize, V)>,
    queue: VecDeque<(usize, V)>,
    draining: bool,
    status: SubscriptionStatus,
    error: Option<Error>,
    guards: Vec<BusSubscription>,
}

/// Fan-in of every bound bus into one serialized state update queue.
///
/// Bus listeners only collect. When the root push that caused a delivery
/// returns, its batch is ordered by binding registration order and appended
/// to the queue, so actions emitted by the same push are applied in the
/// order their reducers were registered. Whoever finds the queue idle drains
/// it, so at most one caller applies reducers at a time and updates that
/// arrive during a drain (from render, a reducer or another thread) are
/// applied in order by that caller.
pub(crate) struct Pipeline<S, V> {
    bindings: Vec<Binding<S, V>>,
    render: Render<S>,
    on_error: Option<ErrorHandler>,
    cell: Mutex<Accumulator<S, V>>,
}

impl<S, V> Pipeline<S, V>
where
    S: Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        bindings: Vec<Binding<S, V>>,
        initial: S,
        render: Render<S>,
        on_error: Option<ErrorHandler>,
    ) -> Self {
        Self {
            bindings,
            render,
            on_error,
            cell: Mutex::new(Accumulator {
                state: initial,
                pending: Vec::new(),
                queue: VecDeque::new(),
                draining: false,
                status: SubscriptionStatus::Active,
                error: None,
                guards: Vec::new(),
            }),
        }
    }

    pub(crate) fn bindings(&self) -> &[Binding<S, V>] {
        &self.bindings
    }

    pub(crate) fn render(&self, state: &S) {
        (self.render)(state);
    }

    /// Hand over the listener guards once every bus is watched.
    pub(crate) fn attach(&self, guards: Vec<BusSubscription>) {
        let mut cell = lock(&self.cell);
        if cell.status == SubscriptionStatus::Active {
            cell.guards = guards;
        }
    }

    /// Entry point for bus listeners.
    pub(crate) fn deliver(this: &Weak<Self>, index: usize, value: V) {
        let Some(pipeline) = this.upgrade() else {
            return;
        };

        let target: Weak<dyn Flush> = this.clone();
        match defer(target) {
            Some(emission) => {
                let mut cell = lock(&pipeline.cell);
                if cell.status == SubscriptionStatus::Active {
                    cell.pending.push((emission, index, value));
                }
            }
            None => pipeline.enqueue(vec![(index, value)]),
        }
    }

    fn enqueue(&self, items: Vec<(usize, V)>) {
        {
            let mut cell = lock(&self.cell);
            if cell.status != SubscriptionStatus::Active {
                return;
            }
            cell.queue.extend(items);
            if cell.draining || cell.queue.is_empty() {
                return;
            }
            cell.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let (index, value, current) = {
                let mut cell = lock(&self.cell);
                if cell.status != SubscriptionStatus::Active {
                    cell.queue.clear();
                    cell.draining = false;
                    return;
                }
                match cell.queue.pop_front() {
                    Some((index, value)) => (index, value, cell.state.clone()),
                    None => {
                        cell.draining = false;
                        return;
                    }
                }
            };

            let binding = &self.bindings[index];
            let next = match binding.reducer.apply(&binding.action, &current, &value) {
                Ok(next) => next,
                Err(err) => {
                    self.fail(err);
                    return;
                }
            };

            {
                let mut cell = lock(&self.cell);
                if cell.status != SubscriptionStatus::Active {
                    cell.queue.clear();
                    cell.draining = false;
                    return;
                }
                cell.state = next.clone();
            }
            trace!(action = %binding.action, "applied update");

            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (self.render)(&next))) {
                lock(&self.cell).draining = false;
                resume_unwind(payload);
            }
        }
    }

    fn fail(&self, err: Error) {
        error!(error = %err, "reducer failed, terminating subscription");

        let guards = {
            let mut cell = lock(&self.cell);
            cell.status = SubscriptionStatus::Failed;
            cell.pending.clear();
            cell.queue.clear();
            cell.draining = false;
            cell.error = Some(err.clone());
            std::mem::take(&mut cell.guards)
        };
        drop(guards);

        if let Some(on_error) = &self.on_error {
            on_error(&err);
        }
    }
}

impl<S, V> Flush for Pipeline<S, V>
where
    S: Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn flush(&self) {
        let mut batch = {
            let mut cell = lock(&self.cell);
            if cell.status != SubscriptionStatus::Active {
                cell.pending.clear();
                return;
            }
            std::mem::take(&mut cell.pending)
        };
        batch.sort_by_key(|(emission, index, _)| (*emission, *index));
        self.enqueue(
            batch
                .into_iter()
                .map(|(_, index, value)| (index, value))
                .collect(),
        );
    }
}

/// Type-erased view of a pipeline, so subscriptions need not name the value type.
trait Accumulate<S>: Send + Sync {
    fn state(&self) -> S;
    fn status(&self) -> SubscriptionStatus;
    fn error(&self) -> Option<Error>;
    fn release(&self);
}

impl<S, V> Accumulate<S> for Pipeline<S, V>
where
    S: Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn state(&self) -> S {
        lock(&self.cell).state.clone()
    }

    fn status(&self) -> SubscriptionStatus {
        lock(&self.cell).status
    }

    fn error(&self) -> Option<Error> {
        lock(&self.cell).error.clone()
    }

    fn release(&self) {
        let guards = {
            let mut cell = lock(&self.cell);
            if cell.status == SubscriptionStatus::Active {
                cell.status = SubscriptionStatus::Released;
            }
            cell.pending.clear();
            cell.queue.clear();
            std::mem::take(&mut cell.guards)
        };
        if !guards.is_empty() {
            debug!(buses = guards.len(), "released subscription");
        }
    }
}

/// Handle to a live state binding created by [`Store::subscribe`].
///
/// Dropping the handle (or calling [`Subscription::dispose`]) detaches it
/// from every bus. No reducer or render call happens afterwards.
///
/// [`Store::subscribe`]: crate::Store::subscribe
#[must_use = "dropping a Subscription stops it"]
pub struct Subscription<S> {
    pipeline: Arc<dyn Accumulate<S>>,
}

impl<S: Clone + Send + 'static> Subscription<S> {
    pub(crate) fn new<V>(pipeline: Arc<Pipeline<S, V>>) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        Self { pipeline }
    }

    /// Snapshot of the current accumulated state.
    pub fn state(&self) -> S {
        self.pipeline.state()
    }

    /// Whether the subscription is active, failed or released.
    pub fn status(&self) -> SubscriptionStatus {
        self.pipeline.status()
    }

    /// Returns true while updates are still applied and rendered.
    pub fn is_active(&self) -> bool {
        self.status() == SubscriptionStatus::Active
    }

    /// The reducer error that terminated this subscription, if any.
    pub fn error(&self) -> Option<Error> {
        self.pipeline.error()
    }

    /// Stop watching all buses.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        self.pipeline.release();
    }
}

impl<S: Clone + Send + 'static> fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("status", &self.status())
            .finish()
    }
}
