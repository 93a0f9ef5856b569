//! The reactive store every accessor is backed by.
//!
//! `ReactiveStore` is deliberately small: it owns the current [`Value`], a set
//! of selector-based listeners, and nothing else. Path semantics, drafts and
//! extensions live above it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use slotmap::{SlotMap, new_key_type};

use crate::effects::Dispose;
use crate::options::StoreFlags;
use crate::reactive;
use crate::value::Value;

new_key_type! {
    pub struct ListenerKey;
}

pub type Selector = Rc<dyn Fn(&Value) -> Value>;
pub type Listener = Rc<dyn Fn(&Value, &Value)>;

/// How a listener decides that its selected value changed.
#[derive(Clone, Default)]
pub enum Equality {
    /// Entries compared by identity, one level deep.
    #[default]
    Shallow,
    /// Identity only.
    Strict,
    Custom(Rc<dyn Fn(&Value, &Value) -> bool>),
}

impl Equality {
    pub fn custom(f: impl Fn(&Value, &Value) -> bool + 'static) -> Self {
        Equality::Custom(Rc::new(f))
    }

    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        match self {
            Equality::Shallow => a.shallow_eq(b),
            Equality::Strict => a.same(b),
            Equality::Custom(f) => f(a, b),
        }
    }
}

impl fmt::Debug for Equality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equality::Shallow => f.write_str("Shallow"),
            Equality::Strict => f.write_str("Strict"),
            Equality::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    pub fire_immediately: bool,
    pub equality: Equality,
}

struct Entry {
    selector: Selector,
    listener: Listener,
    equality: Equality,
    last: RefCell<Value>,
    active: Cell<bool>,
}

struct Inner {
    state: RefCell<Value>,
    listeners: RefCell<SlotMap<ListenerKey, Rc<Entry>>>,
    flags: StoreFlags,
    name: Rc<str>,
}

/// Single-owner state cell with selector subscriptions.
#[derive(Clone)]
pub struct ReactiveStore(Rc<Inner>);

impl ReactiveStore {
    pub fn new(initial: Value) -> Self {
        Self::with_flags("store", initial, StoreFlags::default())
    }

    pub fn with_flags(name: impl Into<Rc<str>>, initial: Value, flags: StoreFlags) -> Self {
        Self(Rc::new(Inner {
            state: RefCell::new(initial),
            listeners: RefCell::new(SlotMap::with_key()),
            flags,
            name: name.into(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn get_state(&self) -> Value {
        self.0.state.borrow().clone()
    }

    /// Commits `next` and then notifies listeners. With `replace == false`
    /// objects are shallow-merged into the current state.
    pub fn set_state(&self, next: Value, replace: bool, label: Option<&str>) {
        {
            let mut state = self.0.state.borrow_mut();
            let committed = if replace { next } else { state.merged(&next) };
            *state = committed;
        }
        if self.0.flags.contains(StoreFlags::LABEL_ACTIONS) {
            log::debug!("[{}] {}", self.0.name, label.unwrap_or("setState"));
        }
        self.notify();
        reactive::flush();
    }

    fn notify(&self) {
        let entries: Vec<Rc<Entry>> = self.0.listeners.borrow().values().cloned().collect();
        for entry in entries {
            if !entry.active.get() {
                continue;
            }
            let state = self.get_state();
            let selected = (entry.selector)(&state);
            let changed = !entry.equality.equals(&entry.last.borrow(), &selected);
            if changed {
                let prev = entry.last.replace(selected.clone());
                (entry.listener)(&selected, &prev);
            }
        }
    }

    /// Calls `listener(next, prev)` whenever `selector(state)` changes.
    pub fn subscribe(
        &self,
        selector: Selector,
        listener: Listener,
        options: SubscribeOptions,
    ) -> Dispose {
        let current = selector(&self.get_state());
        let entry = Rc::new(Entry {
            selector,
            listener: listener.clone(),
            equality: options.equality,
            last: RefCell::new(current.clone()),
            active: Cell::new(true),
        });
        let key = self.0.listeners.borrow_mut().insert(entry.clone());
        if options.fire_immediately {
            listener(&current, &current);
        }

        let weak: Weak<Inner> = Rc::downgrade(&self.0);
        Dispose::new(move || {
            entry.active.set(false);
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().remove(key);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.0.listeners.borrow().len()
    }

    pub fn ptr_eq(&self, other: &ReactiveStore) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
