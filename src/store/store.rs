use super::reducer::Reducer;
use super::subscription::{Binding, ErrorHandler, Pipeline, Render, Subscription};
use crate::bus::Bus;
use crate::error::{BoxError, Error, Result};
use crate::registry::Registry;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Options recognised by [`Store`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Invoke render once with the initial state when subscribing.
    ///
    /// Off by default: render only fires for updates.
    pub render_initial: bool,
}

struct StoreInner<S, V> {
    registry: Registry<V>,
    reducers: IndexMap<String, Reducer<S, V>>,
    initial: S,
    options: StoreOptions,
}

/// A reducer table and initial state bound to a [`Registry`].
///
/// Each action name in the table watches the registry bus of the same name.
/// Every call to [`Store::subscribe`] starts an independent accumulation from
/// the initial state.
///
/// # Examples
///
/// ```
/// use busbind::{Registry, Store};
/// use std::sync::{Arc, Mutex};
///
/// let registry = Registry::new();
/// let store = Store::builder(&registry, 0)
///     .reducer("INC", |state: &i32, value: &i32| state + value)
///     .build()
///     .unwrap();
///
/// let rendered = Arc::new(Mutex::new(Vec::new()));
/// let sink = rendered.clone();
/// let subscription = store.subscribe(move |state: &i32| sink.lock().unwrap().push(*state));
///
/// store.push("INC", 5);
/// store.push("INC", 3);
///
/// assert_eq!(*rendered.lock().unwrap(), vec![5, 8]);
/// assert_eq!(subscription.state(), 8);
/// ```
pub struct Store<S, V> {
    inner: Arc<StoreInner<S, V>>,
}

impl<S, V> Store<S, V>
where
    S: Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start building a store whose actions live on `registry`.
    pub fn builder(registry: &Registry<V>, initial: S) -> StoreBuilder<S, V> {
        StoreBuilder {
            registry: registry.clone(),
            initial,
            reducers: IndexMap::new(),
            options: StoreOptions::default(),
            error: None,
        }
    }

    /// Build a store from a list of declared action types and a lookup that
    /// supplies the reducer for each.
    ///
    /// Every declared type must have a reducer.
    pub fn from_action_types<I, N, G>(
        registry: &Registry<V>,
        initial: S,
        action_types: I,
        mut get_reducer: G,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
        G: FnMut(&str) -> Option<Reducer<S, V>>,
    {
        let mut builder = Self::builder(registry, initial);
        for action in action_types {
            let action = action.into();
            if action.is_empty() {
                return Err(Error::EmptyActionName);
            }
            let reducer = get_reducer(&action).ok_or_else(|| Error::MissingReducer {
                action: action.clone(),
            })?;
            builder = builder.with_reducer(action, reducer);
        }
        builder.build()
    }

    /// Push a value onto the registry bus for `name`.
    pub fn push(&self, name: &str, value: V) {
        self.inner.registry.push(name, value);
    }

    /// Forward `source` into the registry bus for `name`.
    pub fn plug(&self, name: &str, source: &Bus<V>) {
        self.inner.registry.plug(name, source);
    }

    /// The registry bus for `name`.
    pub fn stream(&self, name: &str) -> Bus<V> {
        self.inner.registry.stream(name)
    }

    /// The registry this store's actions live on.
    pub fn registry(&self) -> &Registry<V> {
        &self.inner.registry
    }

    /// Action names in registration order.
    pub fn action_types(&self) -> impl Iterator<Item = &str> {
        self.inner.reducers.keys().map(String::as_str)
    }

    /// The state every subscription starts from.
    pub fn initial_state(&self) -> &S {
        &self.inner.initial
    }

    /// Options the store was built with.
    pub fn options(&self) -> StoreOptions {
        self.inner.options
    }

    /// Start folding pushed actions into state, calling `render` after each
    /// update.
    ///
    /// A reducer failure stops the subscription; inspect it with
    /// [`Subscription::error`] or use [`Store::subscribe_with`].
    pub fn subscribe<F>(&self, render: F) -> Subscription<S>
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.bind(Box::new(render), None)
    }

    /// Like [`Store::subscribe`], additionally calling `on_error` once if a
    /// reducer fails.
    pub fn subscribe_with<F, E>(&self, render: F, on_error: E) -> Subscription<S>
    where
        F: Fn(&S) + Send + Sync + 'static,
        E: Fn(&Error) + Send + Sync + 'static,
    {
        self.bind(Box::new(render), Some(Box::new(on_error)))
    }

    fn bind(&self, render: Render<S>, on_error: Option<ErrorHandler>) -> Subscription<S> {
        let bindings = self
            .inner
            .reducers
            .iter()
            .map(|(action, reducer)| Binding {
                action: action.clone(),
                reducer: reducer.clone(),
            })
            .collect();
        let pipeline = Arc::new(Pipeline::new(
            bindings,
            self.inner.initial.clone(),
            render,
            on_error,
        ));

        if self.inner.options.render_initial {
            pipeline.render(&self.inner.initial);
        }

        let guards = pipeline
            .bindings()
            .iter()
            .enumerate()
            .map(|(index, binding)| {
                let weak = Arc::downgrade(&pipeline);
                self.inner
                    .registry
                    .stream(&binding.action)
                    .subscribe(move |value: &V| Pipeline::deliver(&weak, index, value.clone()))
            })
            .collect();
        pipeline.attach(guards);

        debug!(actions = self.inner.reducers.len(), "subscribed store");
        Subscription::new(pipeline)
    }
}

impl<S, V> Clone for Store<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, V> fmt::Debug for Store<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("actions", &self.inner.reducers.keys().collect::<Vec<_>>())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Builder for [`Store`].
///
/// Registration problems are remembered and reported by [`StoreBuilder::build`].
pub struct StoreBuilder<S, V> {
    registry: Registry<V>,
    initial: S,
    reducers: IndexMap<String, Reducer<S, V>>,
    options: StoreOptions,
    error: Option<Error>,
}

impl<S, V> StoreBuilder<S, V>
where
    S: Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Register an infallible reducer for `action`.
    pub fn reducer<F>(self, action: impl Into<String>, f: F) -> Self
    where
        F: Fn(&S, &V) -> S + Send + Sync + 'static,
    {
        self.with_reducer(action, Reducer::new(f))
    }

    /// Register a fallible reducer for `action`.
    pub fn try_reducer<F>(self, action: impl Into<String>, f: F) -> Self
    where
        F: Fn(&S, &V) -> std::result::Result<S, BoxError> + Send + Sync + 'static,
    {
        self.with_reducer(action, Reducer::try_new(f))
    }

    /// Register an already wrapped reducer for `action`.
    pub fn with_reducer(mut self, action: impl Into<String>, reducer: Reducer<S, V>) -> Self {
        if self.error.is_some() {
            return self;
        }

        let action = action.into();
        if action.is_empty() {
            self.error = Some(Error::EmptyActionName);
        } else if self.reducers.contains_key(&action) {
            self.error = Some(Error::DuplicateAction { action });
        } else {
            self.reducers.insert(action, reducer);
        }
        self
    }

    /// Render the initial state on subscribe (see [`StoreOptions`]).
    pub fn render_initial(mut self, render_initial: bool) -> Self {
        self.options.render_initial = render_initial;
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Finish the store, reporting the first registration error.
    pub fn build(self) -> Result<Store<S, V>> {
        if let Some(err) = self.error {
            return Err(err);
        }

        Ok(Store {
            inner: Arc::new(StoreInner {
                registry: self.registry,
                reducers: self.reducers,
                initial: self.initial,
                options: self.options,
            }),
        })
    }
}

/// Bind declared action types to reducers on `registry` and start rendering.
///
/// Shorthand for [`Store::from_action_types`] followed by
/// [`Store::subscribe`].
pub fn bind<S, V, I, N, G, F>(
    registry: &Registry<V>,
    initial: S,
    action_types: I,
    get_reducer: G,
    render: F,
) -> Result<Subscription<S>>
where
    S: Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = N>,
    N: Into<String>,
    G: FnMut(&str) -> Option<Reducer<S, V>>,
    F: Fn(&S) + Send + Sync + 'static,
{
    let store = Store::from_action_types(registry, initial, action_types, get_reducer)?;
    Ok(store.subscribe(render))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SubscriptionStatus;
    use std::sync::Mutex;

    fn sink<T: Clone + Send + 'static>(
    ) -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |v: &T| seen_clone.lock().unwrap().push(v.clone()))
    }

    #[test]
    fn duplicate_action_is_rejected() {
        let registry: Registry<i32> = Registry::new();
        let err = Store::builder(&registry, 0)
            .reducer("INC", |s: &i32, v: &i32| s + v)
            .reducer("INC", |s: &i32, v: &i32| s - v)
            .build()
            .unwrap_err();

        assert_eq!(
            err,
            Error::DuplicateAction {
                action: "INC".to_string()
            }
        );
    }

    #[test]
    fn empty_action_is_rejected() {
        let registry: Registry<i32> = Registry::new();
        let err = Store::builder(&registry, 0)
            .reducer("", |s: &i32, _: &i32| *s)
            .build()
            .unwrap_err();

        assert_eq!(err, Error::EmptyActionName);
    }

    #[test]
    fn first_registration_error_wins() {
        let registry: Registry<i32> = Registry::new();
        let err = Store::builder(&registry, 0)
            .reducer("", |s: &i32, _: &i32| *s)
            .reducer("A", |s: &i32, _: &i32| *s)
            .reducer("A", |s: &i32, _: &i32| *s)
            .build()
            .unwrap_err();

        assert_eq!(err, Error::EmptyActionName);
    }

    #[test]
    fn action_types_keep_registration_order() {
        let registry: Registry<i32> = Registry::new();
        let store = Store::builder(&registry, 0)
            .reducer("B", |s: &i32, _: &i32| *s)
            .reducer("A", |s: &i32, _: &i32| *s)
            .build()
            .unwrap();

        assert_eq!(store.action_types().collect::<Vec<_>>(), vec!["B", "A"]);
        assert_eq!(*store.initial_state(), 0);
    }

    #[test]
    fn from_action_types_requires_every_reducer() {
        let registry: Registry<i32> = Registry::new();
        let err = Store::from_action_types(&registry, 0, ["INC", "DEC"], |action| {
            (action == "INC").then(|| Reducer::new(|s: &i32, v: &i32| s + v))
        })
        .unwrap_err();

        assert_eq!(
            err,
            Error::MissingReducer {
                action: "DEC".to_string()
            }
        );
    }

    #[test]
    fn bind_wires_declared_actions() {
        let registry = Registry::new();
        let (seen, render) = sink::<i32>();
        let subscription = bind(
            &registry,
            10,
            vec!["INC".to_string(), "DEC".to_string()],
            |action| match action {
                "INC" => Some(Reducer::new(|s: &i32, v: &i32| s + v)),
                "DEC" => Some(Reducer::new(|s: &i32, v: &i32| s - v)),
                _ => None,
            },
            render,
        )
        .unwrap();

        registry.push("INC", 5);
        registry.push("DEC", 2);

        assert_eq!(*seen.lock().unwrap(), vec![15, 13]);
        assert_eq!(subscription.state(), 13);
    }

    #[test]
    fn render_initial_emits_seed_first() {
        let registry = Registry::new();
        let store = Store::builder(&registry, 1)
            .reducer("MUL", |s: &i32, v: &i32| s * v)
            .render_initial(true)
            .build()
            .unwrap();
        let (seen, render) = sink::<i32>();

        let _subscription = store.subscribe(render);
        assert_eq!(*seen.lock().unwrap(), vec![1]);

        store.push("MUL", 4);
        assert_eq!(*seen.lock().unwrap(), vec![1, 4]);
    }

    #[test]
    fn default_skips_initial_render() {
        let registry = Registry::new();
        let store = Store::builder(&registry, 1)
            .reducer("MUL", |s: &i32, v: &i32| s * v)
            .build()
            .unwrap();
        assert!(!store.options().render_initial);
        let (seen, render) = sink::<i32>();

        let _subscription = store.subscribe(render);
        assert!(seen.lock().unwrap().is_empty());

        store.push("MUL", 4);
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }

    #[test]
    fn failing_reducer_reports_once_and_stops() {
        let registry = Registry::new();
        let store = Store::builder(&registry, 0)
            .try_reducer("SET", |_: &i32, v: &i32| {
                if *v < 0 {
                    Err(format!("rejected {v}").into())
                } else {
                    Ok(*v)
                }
            })
            .build()
            .unwrap();
        let (rendered, render) = sink::<i32>();
        let (errors, on_error) = sink::<Error>();

        let subscription = store.subscribe_with(render, on_error);
        store.push("SET", 3);
        store.push("SET", -1);
        store.push("SET", 7);

        assert_eq!(*rendered.lock().unwrap(), vec![3]);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(subscription.status(), SubscriptionStatus::Failed);
        assert_eq!(subscription.state(), 3);
        assert_eq!(
            subscription.error(),
            Some(Error::ReducerFailed {
                action: "SET".to_string(),
                message: "rejected -1".to_string(),
            })
        );
        assert_eq!(store.stream("SET").subscriber_count(), 0);
    }

    #[test]
    fn dispose_detaches_from_buses() {
        let registry = Registry::new();
        let store = Store::builder(&registry, 0)
            .reducer("A", |s: &i32, v: &i32| s + v)
            .reducer("B", |s: &i32, v: &i32| s - v)
            .build()
            .unwrap();
        let (seen, render) = sink::<i32>();

        let subscription = store.subscribe(render);
        assert_eq!(store.stream("A").subscriber_count(), 1);
        assert_eq!(store.stream("B").subscriber_count(), 1);

        store.push("A", 1);
        subscription.dispose();
        store.push("A", 1);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(store.stream("A").subscriber_count(), 0);
        assert_eq!(store.stream("B").subscriber_count(), 0);
    }
}
