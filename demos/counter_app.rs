//! Counter application wiring action buses to reducers
//!
//! Run with `RUST_LOG=busbind=trace` to see bus traffic.

use busbind::{Bus, Registry, Store, Subscription};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct CounterState {
    count: i32,
    step: i32,
    history: Vec<i32>,
}

impl CounterState {
    fn new() -> Self {
        Self {
            count: 0,
            step: 1,
            history: vec![0],
        }
    }

    fn record(mut self, count: i32) -> Self {
        self.count = count;
        self.history.push(count);
        self
    }
}

fn counter_store(registry: &Registry<i32>) -> busbind::Result<Store<CounterState, i32>> {
    Store::builder(registry, CounterState::new())
        .reducer("INCREMENT", |state: &CounterState, _: &i32| {
            state.clone().record(state.count + state.step)
        })
        .reducer("DECREMENT", |state: &CounterState, _: &i32| {
            state.clone().record(state.count - state.step)
        })
        .reducer("SET_STEP", |state: &CounterState, step: &i32| CounterState {
            step: *step,
            ..state.clone()
        })
        .reducer("RESET", |state: &CounterState, _: &i32| state.clone().record(0))
        .try_reducer("SET", |state: &CounterState, value: &i32| {
            if value.abs() > 1_000 {
                return Err(format!("{value} is out of range").into());
            }
            Ok(state.clone().record(*value))
        })
        .render_initial(true)
        .build()
}

fn main() -> busbind::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Counter Application ===\n");

    let registry = Registry::new();
    let store = counter_store(&registry)?;

    println!("1. Subscribing (initial state is rendered)");
    let subscription: Subscription<CounterState> = store.subscribe_with(
        |state| println!("   [State] Count: {}, Step: {}", state.count, state.step),
        |err| println!("   [Error] {err}"),
    );

    println!("\n2. Incrementing...");
    for _ in 0..3 {
        registry.push("INCREMENT", 0);
    }

    println!("\n3. Changing step size to 5");
    registry.push("SET_STEP", 5);

    println!("\n4. Decrementing through a plugged button bus...");
    let minus_button = Bus::new("minus-button");
    registry.plug("DECREMENT", &minus_button);
    for _ in 0..2 {
        minus_button.push(0);
    }

    println!("\n5. Pushing to an action nobody handles (no render)");
    registry.push("UNDO", 0);

    println!("\n6. Resetting...");
    registry.push("RESET", 0);

    println!("\n7. History:");
    println!("   {:?}", subscription.state().history);

    println!("\n8. Setting an out of range value");
    registry.push("SET", 5_000);
    println!("   Subscription status: {:?}", subscription.status());

    println!("\n9. Further pushes are ignored");
    registry.push("INCREMENT", 0);
    println!("   Final count: {}", subscription.state().count);

    println!("\n✓ Counter application complete!");
    Ok(())
}
