//! # Computed properties
//!
//! A computed property is a read function over the store, optionally paired
//! with a write function. It is evaluated on every access; nothing is cached.
//!
//! The read function gets a [`Reader`] that knows whether the caller is a
//! plain `get` or a subscribing `use_value`, so one function serves both:
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let s = store(json!({ "count": 2 }))
//!     .computed(|_| {
//!         [("doubled", Computed::new(|read, _| {
//!             Value::from(read.at("count").as_i64().unwrap_or(0) * 2)
//!         }))]
//!     })
//!     .create();
//!
//! s.at("count").set(-4);
//! assert_eq!(s.computed("doubled").unwrap().get(), Value::from(-8));
//! ```

use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;

use crate::accessor::PathAccessor;
use crate::error::{Result, StoreError};
use crate::path::Path;
use crate::value::Value;

/// How reads inside a computed body behave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Plain reads, no subscriptions.
    Get,
    /// Reads subscribe the running observer.
    Subscribe,
}

/// Read handle given to computed bodies.
pub struct Reader<'a> {
    scope: &'a PathAccessor,
    mode: ReadMode,
}

impl<'a> Reader<'a> {
    pub fn new(scope: &'a PathAccessor, mode: ReadMode) -> Self {
        Self { scope, mode }
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// The node the computed property is attached to.
    pub fn scope(&self) -> &PathAccessor {
        self.scope
    }

    /// Reads `path` relative to the owning node.
    pub fn at(&self, path: impl Into<Path>) -> Value {
        let accessor = self.scope.at(path);
        match self.mode {
            ReadMode::Get => accessor.get(),
            ReadMode::Subscribe => accessor.use_value(),
        }
    }

    pub fn at_as<T: DeserializeOwned>(&self, path: impl Into<Path>) -> Result<T> {
        Ok(self.at(path).deserialize_into()?)
    }

    /// Reads the whole owning node.
    pub fn get(&self) -> Value {
        self.at(Path::root())
    }

    /// Evaluates another computed property on the same node, in this mode.
    pub fn computed(&self, name: &str, input: impl Into<Value>) -> Result<Value> {
        let other = self.scope.computed(name)?;
        Ok(other.read(self.mode, &input.into()))
    }
}

pub type ReadFn = Rc<dyn Fn(&Reader<'_>, &Value) -> Value>;
pub type WriteFn = Rc<dyn Fn(&PathAccessor, Value) -> Result<()>>;

#[derive(Clone)]
pub struct Computed {
    read: ReadFn,
    write: Option<WriteFn>,
}

impl Computed {
    /// `read(reader, input)`; `input` is `Null` for unparameterized reads.
    pub fn new(read: impl Fn(&Reader<'_>, &Value) -> Value + 'static) -> Self {
        Self {
            read: Rc::new(read),
            write: None,
        }
    }

    pub fn with_write(
        mut self,
        write: impl Fn(&PathAccessor, Value) -> Result<()> + 'static,
    ) -> Self {
        self.write = Some(Rc::new(write));
        self
    }

    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// `get` / `use_value` / `set` for one computed property.
#[derive(Clone)]
pub struct ComputedAccessor {
    scope: PathAccessor,
    name: String,
    def: Computed,
}

impl ComputedAccessor {
    pub(crate) fn new(scope: PathAccessor, name: &str, def: Computed) -> Self {
        Self {
            scope,
            name: name.to_string(),
            def,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_writable(&self) -> bool {
        self.def.is_writable()
    }

    pub fn read(&self, mode: ReadMode, input: &Value) -> Value {
        (self.def.read)(&Reader::new(&self.scope, mode), input)
    }

    pub fn get(&self) -> Value {
        self.read(ReadMode::Get, &Value::Null)
    }

    /// Parameterized read.
    pub fn get_for(&self, input: impl Into<Value>) -> Value {
        self.read(ReadMode::Get, &input.into())
    }

    pub fn get_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(self.get().deserialize_into()?)
    }

    pub fn use_value(&self) -> Value {
        self.read(ReadMode::Subscribe, &Value::Null)
    }

    pub fn use_for(&self, input: impl Into<Value>) -> Value {
        self.read(ReadMode::Subscribe, &input.into())
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        match &self.def.write {
            Some(write) => write(&self.scope, value.into()),
            None => {
                log::warn!("computed `{}` is read-only", self.name);
                Err(StoreError::ReadOnlyComputed {
                    name: self.name.clone(),
                })
            }
        }
    }
}

impl fmt::Debug for ComputedAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedAccessor")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}
