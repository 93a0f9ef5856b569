//! # Path accessors
//!
//! `store.at(path)` gives the five operations for whatever lives at `path`:
//!
//! - `get` reads without subscribing.
//! - `use_value` reads and, inside an [`observe`](crate::observe) body,
//!   subscribes the observer to the value.
//! - `set` / `update` / `set_with` write through the mutation engine.
//! - `on_change` subscribes a listener.
//! - `assign` shallow-merges into an object.
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let s = store(json!({ "parent": { "count": 2 } })).create();
//! s.at("parent.count").set(5);
//! assert_eq!(s.get().to_json(), json!({ "parent": { "count": 5 } }));
//! assert_eq!(s.at("parent").at("count").get(), Value::from(5));
//! ```

use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::computed::ComputedAccessor;
use crate::effects::Dispose;
use crate::engine::{Equality, Listener, Selector, SubscribeOptions};
use crate::error::{Result, StoreError};
use crate::mutation::{self, Committed, Mutation};
use crate::path::Path;
use crate::reactive;
use crate::store::{Member, Store};
use crate::value::Value;

/// What an `on_change` listener depends on.
#[derive(Clone, Default)]
pub enum Deps {
    /// The value at the accessor's path.
    #[default]
    Path,
    /// The values of these top-level keys, as an array.
    Keys(Vec<String>),
    /// Any projection of the full state.
    Select(Selector),
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deps::Path => f.write_str("Path"),
            Deps::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            Deps::Select(_) => f.write_str("Select(..)"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OnChangeOptions {
    pub deps: Deps,
    pub fire_immediately: bool,
    pub equality: Equality,
}

impl OnChangeOptions {
    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            deps: Deps::Keys(keys.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn select(f: impl Fn(&Value) -> Value + 'static) -> Self {
        Self {
            deps: Deps::Select(Rc::new(f)),
            ..Self::default()
        }
    }

    pub fn immediate(mut self) -> Self {
        self.fire_immediately = true;
        self
    }

    pub fn equality(mut self, equality: Equality) -> Self {
        self.equality = equality;
        self
    }
}

/// The accessor surface for one path of one store instance.
#[derive(Clone)]
pub struct PathAccessor {
    store: Store,
    path: Path,
}

impl PathAccessor {
    pub(crate) fn new(store: Store, path: Path) -> Self {
        Self { store, path }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descends further; `path` is relative to this accessor.
    pub fn at(&self, path: impl Into<Path>) -> PathAccessor {
        PathAccessor::new(self.store.clone(), self.path.join(&path.into()))
    }

    pub fn parent(&self) -> Option<PathAccessor> {
        let (parent, _) = self.path.split_last()?;
        Some(PathAccessor::new(self.store.clone(), parent))
    }

    fn selector(&self) -> Selector {
        let path = self.path.clone();
        Rc::new(move |state: &Value| state.resolve(&path))
    }

    // reads

    pub fn get(&self) -> Value {
        self.store.engine().get_state().resolve(&self.path)
    }

    pub fn get_with<R>(&self, selector: impl FnOnce(&Value) -> R) -> R {
        selector(&self.get())
    }

    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(self.get().deserialize_into()?)
    }

    pub fn exists(&self) -> bool {
        self.store.engine().get_state().contains(&self.path)
    }

    pub fn use_value(&self) -> Value {
        reactive::use_store(self.store.engine(), self.selector(), Equality::Shallow)
    }

    pub fn use_with(
        &self,
        selector: impl Fn(&Value) -> Value + 'static,
        equality: Equality,
    ) -> Value {
        let path = self.path.clone();
        reactive::use_store(
            self.store.engine(),
            Rc::new(move |state: &Value| selector(&state.resolve(&path))),
            equality,
        )
    }

    pub fn use_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(self.use_value().deserialize_into()?)
    }

    // writes

    pub fn apply(&self, mutation: Mutation) -> Committed {
        mutation::commit(
            self.store.engine(),
            self.store.options().flags,
            &self.path,
            mutation,
        )
    }

    pub fn set(&self, value: impl Into<Value>) -> Committed {
        self.apply(Mutation::Replace(value.into()))
    }

    pub fn set_serde<T: Serialize + ?Sized>(&self, value: &T) -> Result<Committed> {
        Ok(self.set(Value::from_serde(value)?))
    }

    /// Draft-style write: mutate the value in place.
    pub fn update(&self, f: impl FnOnce(&mut Value) + 'static) -> Committed {
        self.apply(Mutation::draft(f))
    }

    /// Receive-and-return write.
    pub fn set_with(&self, f: impl FnOnce(&Value) -> Value + 'static) -> Committed {
        self.apply(Mutation::map(f))
    }

    /// Shallow-merges `partial` into the object here. Anything that is not
    /// object-on-object is a plain `set`.
    pub fn assign(&self, partial: impl Into<Value>) -> Committed {
        let partial = partial.into();
        let patch = match (&self.get(), &partial) {
            (Value::Object(_), Value::Object(patch)) => Some(patch.clone()),
            _ => None,
        };
        match patch {
            Some(patch) => self.update(move |draft| {
                if let Value::Object(map) = draft {
                    let map = Rc::make_mut(map);
                    for (k, v) in patch.iter() {
                        map.insert(k.clone(), v.clone());
                    }
                }
            }),
            None => self.set(partial),
        }
    }

    // subscriptions

    /// Calls `listener(next, prev)` when the dependency changes.
    pub fn on_change(
        &self,
        listener: impl Fn(&Value, &Value) + 'static,
        options: OnChangeOptions,
    ) -> Dispose {
        self.on_change_rc(Rc::new(listener), options)
    }

    pub(crate) fn on_change_rc(&self, listener: Listener, options: OnChangeOptions) -> Dispose {
        let selector: Selector = match options.deps {
            Deps::Path => self.selector(),
            Deps::Keys(keys) => Rc::new(move |state: &Value| {
                Value::array(
                    keys.iter()
                        .map(|k| state.as_object().and_then(|m| m.get(k)).cloned().unwrap_or_default()),
                )
            }),
            Deps::Select(f) => f,
        };
        self.store.engine().subscribe(
            selector,
            listener,
            SubscribeOptions {
                fire_immediately: options.fire_immediately,
                equality: options.equality,
            },
        )
    }

    // members attached to this node

    pub fn member(&self, name: &str) -> Option<Member> {
        self.store.member_at(&self.path, name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.member(name) {
            Some(Member::Action(action)) => action(self, args),
            Some(_) => Err(StoreError::NotCallable {
                name: name.to_string(),
                path: self.path.to_string(),
            }),
            None => Err(StoreError::UnknownMember {
                name: name.to_string(),
                path: self.path.to_string(),
            }),
        }
    }

    pub fn computed(&self, name: &str) -> Result<ComputedAccessor> {
        match self.member(name) {
            Some(Member::Computed(def)) => Ok(ComputedAccessor::new(self.clone(), name, def)),
            _ => Err(StoreError::UnknownMember {
                name: name.to_string(),
                path: self.path.to_string(),
            }),
        }
    }
}

impl fmt::Debug for PathAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathAccessor")
            .field("store", &self.store.name())
            .field("path", &self.path.to_string())
            .finish()
    }
}
