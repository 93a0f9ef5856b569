//! Observers: the stand-in for a UI component that re-renders.
//!
//! An observer is a closure run under tracking. Every `use_*` read it performs
//! subscribes it to the selected value; when any of those values change the
//! observer is queued and re-run once the write that caused it has finished
//! notifying. Re-running first drops the subscriptions of the previous run.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::effects::Dispose;
use crate::engine::{Equality, ReactiveStore, Selector, SubscribeOptions};
use crate::value::Value;

pub type ObserverId = usize;

thread_local! {
    static CURRENT_OBSERVER: RefCell<Option<ObserverId>> = const { RefCell::new(None) };
    static GRAPH: RefCell<ObserverGraph> = RefCell::new(ObserverGraph::default());
}

#[derive(Default)]
struct ObserverGraph {
    next_observer: ObserverId,
    observers: HashMap<ObserverId, Rc<dyn Fn()>>,
    // observer_id -> subscriptions made during its last run
    subscriptions: HashMap<ObserverId, Vec<Dispose>>,
    pending: VecDeque<ObserverId>,
    runs: HashMap<ObserverId, usize>,
    flushing: bool,
}

impl ObserverGraph {
    fn take_subscriptions(&mut self, obs: ObserverId) -> Vec<Dispose> {
        self.subscriptions.remove(&obs).unwrap_or_default()
    }
}

pub fn current_observer() -> Option<ObserverId> {
    CURRENT_OBSERVER.with(|co| *co.borrow())
}

fn register_subscription(obs: ObserverId, dispose: Dispose) {
    GRAPH.with(|g| {
        g.borrow_mut()
            .subscriptions
            .entry(obs)
            .or_default()
            .push(dispose)
    });
}

fn schedule(obs: ObserverId) {
    GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        if g.observers.contains_key(&obs) && !g.pending.contains(&obs) {
            g.pending.push_back(obs);
        }
    });
}

/// Re-runs every queued observer. Nested calls (a write made from inside a
/// re-run) are absorbed by the outer flush.
pub fn flush() {
    let start = GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        if g.flushing || g.pending.is_empty() {
            false
        } else {
            g.flushing = true;
            true
        }
    });
    if !start {
        return;
    }

    // reset even if an observer body unwinds
    struct EndFlush;
    impl Drop for EndFlush {
        fn drop(&mut self) {
            GRAPH.with(|g| g.borrow_mut().flushing = false);
        }
    }
    let _end = EndFlush;

    while let Some(obs) = GRAPH.with(|g| g.borrow_mut().pending.pop_front()) {
        run_observer_now(obs);
    }
}

pub fn run_observer_now(id: ObserverId) {
    let (f, stale) = GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let f = g.observers.get(&id).cloned();
        (f, g.take_subscriptions(id))
    });
    // clear previous deps before recompute
    for d in stale {
        d.run();
    }
    let Some(f) = f else {
        return;
    };

    struct Restore(Option<ObserverId>);
    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT_OBSERVER.with(|co| *co.borrow_mut() = self.0);
        }
    }
    let prev = CURRENT_OBSERVER.with(|co| co.replace(Some(id)));
    let _restore = Restore(prev);
    GRAPH.with(|g| *g.borrow_mut().runs.entry(id).or_default() += 1);
    f();
}

/// Remove an observer and drop all of its subscriptions.
pub fn remove_observer(id: ObserverId) {
    let stale = GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        g.observers.remove(&id);
        g.runs.remove(&id);
        g.pending.retain(|o| *o != id);
        g.take_subscriptions(id)
    });
    for d in stale {
        d.run();
    }
}

/// Handle to a running observer. Dropping it stops tracking.
pub struct Observer {
    id: ObserverId,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Number of times the observer body has run, including the first.
    pub fn runs(&self) -> usize {
        GRAPH.with(|g| g.borrow().runs.get(&self.id).copied().unwrap_or(0))
    }

    pub fn dispose(self) {}
}

impl Drop for Observer {
    fn drop(&mut self) {
        remove_observer(self.id);
    }
}

/// Runs `f` now under tracking and again whenever anything it `use`d changes.
pub fn observe(f: impl Fn() + 'static) -> Observer {
    let id = GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let id = g.next_observer;
        g.next_observer += 1;
        g.observers.insert(id, Rc::new(f));
        id
    });
    run_observer_now(id);
    Observer { id }
}

/// Hook primitive: selects from `store` and, inside an observer, subscribes
/// it to the selection under `equality`.
pub fn use_store(store: &ReactiveStore, selector: Selector, equality: Equality) -> Value {
    let value = selector(&store.get_state());
    match current_observer() {
        Some(obs) => {
            let dispose = store.subscribe(
                selector,
                Rc::new(move |_: &Value, _: &Value| schedule(obs)),
                SubscribeOptions {
                    fire_immediately: false,
                    equality,
                },
            );
            register_subscription(obs, dispose);
        }
        None => log::trace!("[{}] use outside of an observer; reading once", store.name()),
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn observer_reruns_when_used_value_changes() {
        let store = ReactiveStore::new(Value::from(serde_json::json!({ "a": 1, "b": 1 })));
        let seen = Rc::new(Cell::new(0i64));
        let obs = observe({
            let store = store.clone();
            let seen = seen.clone();
            move || {
                let a = use_store(
                    &store,
                    Rc::new(|s: &Value| s.resolve(&"a".into())),
                    Equality::Shallow,
                );
                seen.set(a.as_i64().unwrap_or_default());
            }
        });
        assert_eq!(obs.runs(), 1);

        store.set_state(Value::from(serde_json::json!({ "b": 2 })), false, None);
        assert_eq!(obs.runs(), 1);

        store.set_state(Value::from(serde_json::json!({ "a": 7 })), false, None);
        assert_eq!(obs.runs(), 2);
        assert_eq!(seen.get(), 7);
        // one live subscription: the previous run's was dropped
        assert_eq!(store.listener_count(), 1);

        drop(obs);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn panicking_observer_does_not_stall_later_flushes() {
        let store = ReactiveStore::new(Value::from(serde_json::json!({ "a": 1, "b": 1 })));
        let select = |key: &'static str| -> Selector { Rc::new(move |s: &Value| s.resolve(&key.into())) };

        let _fragile = observe({
            let store = store.clone();
            move || {
                let a = use_store(&store, select("a"), Equality::Shallow);
                if a.as_i64() == Some(2) {
                    panic!("observer failed");
                }
            }
        });
        let steady = observe({
            let store = store.clone();
            move || {
                let _ = use_store(&store, select("b"), Equality::Shallow);
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.set_state(Value::from(serde_json::json!({ "a": 2 })), false, None);
        }));
        assert!(result.is_err());

        store.set_state(Value::from(serde_json::json!({ "b": 5 })), false, None);
        assert_eq!(steady.runs(), 2);
    }
}
