//! The single write path. Every `set`, `assign` and computed write ends up in
//! [`commit`], which turns a [`Mutation`] aimed at a path into exactly one
//! `set_state` call on the engine (or none, if nothing changed).

use std::fmt;

use crate::engine::ReactiveStore;
use crate::options::StoreFlags;
use crate::path::Path;
use crate::value::Value;

/// What to do with the value at a path.
pub enum Mutation {
    /// Replace it.
    Replace(Value),
    /// Mutate a draft in place. Containers are copied lazily, so only the
    /// nodes the closure touches are reallocated.
    Draft(Box<dyn FnOnce(&mut Value)>),
    /// Receive the current value and return the next one.
    Map(Box<dyn FnOnce(&Value) -> Value>),
}

impl Mutation {
    pub fn replace(value: impl Into<Value>) -> Self {
        Mutation::Replace(value.into())
    }

    pub fn draft(f: impl FnOnce(&mut Value) + 'static) -> Self {
        Mutation::Draft(Box::new(f))
    }

    pub fn map(f: impl FnOnce(&Value) -> Value + 'static) -> Self {
        Mutation::Map(Box::new(f))
    }

    fn op(&self) -> &'static str {
        match self {
            Mutation::Replace(_) => "set",
            Mutation::Draft(_) => "update",
            Mutation::Map(_) => "setWith",
        }
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            Mutation::Draft(_) => f.write_str("Draft(..)"),
            Mutation::Map(_) => f.write_str("Map(..)"),
        }
    }
}

impl From<Value> for Mutation {
    fn from(value: Value) -> Self {
        Mutation::Replace(value)
    }
}

/// Runs `f` against a draft of `base`. Untouched containers keep their
/// identity in the result.
pub fn produce(base: &Value, f: impl FnOnce(&mut Value)) -> Value {
    let mut draft = base.clone();
    f(&mut draft);
    draft
}

/// Outcome of a [`commit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Committed {
    Written,
    /// The new value was identical to the old one; nothing was written.
    Unchanged,
}

pub(crate) fn commit(
    engine: &ReactiveStore,
    flags: StoreFlags,
    path: &Path,
    mutation: Mutation,
) -> Committed {
    let label = format!("{path}/{}", mutation.op());
    let state = engine.get_state();
    let current = state.lookup(path);
    let existed = current.is_some();
    let current = current.cloned().unwrap_or_default();

    let next = match mutation {
        Mutation::Replace(value) => value,
        Mutation::Map(f) => f(&current),
        Mutation::Draft(f) if current.is_draftable() => produce(&current, f),
        Mutation::Draft(f) => {
            // scalars and host objects: receive, then hand back
            let mut owned = current.clone();
            f(&mut owned);
            owned
        }
    };

    if next.same(&current) {
        log::trace!("[{}] {label} skipped: unchanged", engine.name());
        return Committed::Unchanged;
    }
    if !existed && !path.is_root() && flags.contains(StoreFlags::WARN_UNKNOWN_PATHS) {
        log::warn!("[{}] writing to `{path}`, which did not exist", engine.name());
    }

    let next_state = state.with_path(path, next);
    engine.set_state(next_state, true, Some(&label));
    Committed::Written
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_on_root_object_keeps_untouched_children() {
        let engine = ReactiveStore::new(Value::from(json!({ "a": { "n": 1 }, "b": { "n": 2 } })));
        let before = engine.get_state();
        let outcome = commit(
            &engine,
            StoreFlags::empty(),
            &Path::root(),
            Mutation::draft(|d| *d.pointer_mut(&Path::parse("a.n")) = Value::from(5)),
        );
        assert_eq!(outcome, Committed::Written);
        let after = engine.get_state();
        assert!(after.resolve(&Path::parse("b")).same(&before.resolve(&Path::parse("b"))));
        assert_eq!(after.resolve(&Path::parse("a.n")), Value::from(5));
    }

    #[test]
    fn draft_on_primitive_root_receives_and_returns() {
        let engine = ReactiveStore::new(Value::from(10));
        commit(
            &engine,
            StoreFlags::empty(),
            &Path::root(),
            Mutation::draft(|d| {
                let n = d.as_i64().unwrap_or_default();
                *d = Value::from(n * 3);
            }),
        );
        assert_eq!(engine.get_state(), Value::from(30));
    }

    #[test]
    fn identical_value_is_not_written() {
        let engine = ReactiveStore::new(Value::from(json!({ "a": 1 })));
        let before = engine.get_state();
        let outcome = commit(
            &engine,
            StoreFlags::empty(),
            &Path::parse("a"),
            Mutation::replace(1),
        );
        assert_eq!(outcome, Committed::Unchanged);
        assert!(engine.get_state().same(&before));
    }

    #[test]
    fn untouched_draft_is_a_noop() {
        let engine = ReactiveStore::new(Value::from(json!({ "list": [1, 2] })));
        let outcome = commit(
            &engine,
            StoreFlags::empty(),
            &Path::parse("list"),
            Mutation::draft(|_| {}),
        );
        assert_eq!(outcome, Committed::Unchanged);
    }
}
