use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::accessor::PathAccessor;
use crate::computed::{Computed, ComputedAccessor};
use crate::effects::{Dispose, EffectRegistry, Effects};
use crate::engine::ReactiveStore;
use crate::error::Result;
use crate::mutation::Committed;
use crate::options::StoreOptions;
use crate::path::Path;
use crate::router::PathRouter;
use crate::value::Value;

/// Actions receive the accessor of the node they were attached to at call
/// time, so they never hold on to the store themselves.
pub type Action = Rc<dyn Fn(&PathAccessor, &[Value]) -> Result<Value>>;

/// Something an extension added to a node.
#[derive(Clone)]
pub enum Member {
    Action(Action),
    Value(Value),
    Computed(Computed),
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Action(_) => f.write_str("Action(..)"),
            Member::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Member::Computed(c) => fmt::Debug::fmt(c, f),
        }
    }
}

/// Record of named members produced by one extension builder.
#[derive(Clone, Default)]
pub struct Extension {
    members: Vec<(String, Member)>,
}

impl Extension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(
        self,
        name: impl Into<String>,
        f: impl Fn(&PathAccessor, &[Value]) -> Result<Value> + 'static,
    ) -> Self {
        self.member(name, Member::Action(Rc::new(f)))
    }

    pub fn value(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.member(name, Member::Value(value.into()))
    }

    pub fn computed(self, name: impl Into<String>, computed: Computed) -> Self {
        self.member(name, Member::Computed(computed))
    }

    pub fn member(mut self, name: impl Into<String>, member: Member) -> Self {
        self.members.push((name.into(), member));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(n, _)| n.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, Computed)> for Extension {
    fn from_iter<I: IntoIterator<Item = (K, Computed)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Extension::new(), |ext, (name, c)| ext.computed(name, c))
    }
}

pub(crate) struct StoreInner {
    engine: ReactiveStore,
    options: StoreOptions,
    members: RefCell<BTreeMap<Path, BTreeMap<String, Member>>>,
    effects: EffectRegistry,
    persistence: RefCell<Option<Dispose>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.effects.unsubscribe_all();
        if let Some(d) = self.persistence.get_mut().take() {
            d.run();
        }
    }
}

/// A materialized store instance. Cloning shares the instance.
#[derive(Clone)]
pub struct Store(Rc<StoreInner>);

impl Store {
    pub(crate) fn new(engine: ReactiveStore, options: StoreOptions) -> Self {
        Self(Rc::new(StoreInner {
            engine,
            options,
            members: RefCell::new(BTreeMap::new()),
            effects: EffectRegistry::default(),
            persistence: RefCell::new(None),
        }))
    }

    pub fn name(&self) -> &str {
        self.0.engine.name()
    }

    pub fn engine(&self) -> &ReactiveStore {
        &self.0.engine
    }

    pub fn options(&self) -> &StoreOptions {
        &self.0.options
    }

    pub fn root(&self) -> PathAccessor {
        PathAccessor::new(self.clone(), Path::root())
    }

    pub fn at(&self, path: impl Into<Path>) -> PathAccessor {
        PathAccessor::new(self.clone(), path.into())
    }

    /// Dynamic entry point: resolve properties and accessor calls by name.
    pub fn router(&self) -> PathRouter {
        PathRouter::new(self.clone())
    }

    pub fn get(&self) -> Value {
        self.0.engine.get_state()
    }

    pub fn set(&self, value: impl Into<Value>) -> Committed {
        self.root().set(value)
    }

    pub fn assign(&self, partial: impl Into<Value>) -> Committed {
        self.root().assign(partial)
    }

    /// Calls a root-level action.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.root().call(name, args)
    }

    pub fn computed(&self, name: &str) -> Result<ComputedAccessor> {
        self.root().computed(name)
    }

    pub fn member(&self, name: &str) -> Option<Member> {
        self.member_at(&Path::root(), name)
    }

    pub fn member_at(&self, path: &Path, name: &str) -> Option<Member> {
        self.0
            .members
            .borrow()
            .get(path)
            .and_then(|m| m.get(name))
            .cloned()
    }

    pub fn member_names_at(&self, path: &Path) -> Vec<String> {
        self.0
            .members
            .borrow()
            .get(path)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn install(&self, path: &Path, extension: Extension) {
        let mut members = self.0.members.borrow_mut();
        let node = members.entry(path.clone()).or_default();
        for (name, member) in extension.members {
            if node.insert(name.clone(), member).is_some() {
                log::debug!("[{}] `{name}` at `{path}` redefined", self.name());
            }
        }
    }

    pub(crate) fn register_effects(&self, path: &Path, effects: Effects) {
        self.0.effects.register(path, effects);
    }

    pub(crate) fn attach_persistence(&self, dispose: Dispose) {
        *self.0.persistence.borrow_mut() = Some(dispose);
    }

    pub fn subscribe_to_effects(&self) {
        self.0.effects.subscribe_all(&self.root());
    }

    pub fn unsubscribe_from_effects(&self) {
        self.0.effects.unsubscribe_all();
    }

    pub fn active_effects(&self) -> Vec<String> {
        self.0.effects.active_names()
    }

    pub fn effect_names(&self) -> Vec<String> {
        self.0.effects.names()
    }

    /// Drops the persisted copy of this store, if persistence is on.
    pub fn clear_persisted(&self) {
        if let Some(storage) = self.0.options.storage.as_ref().filter(|_| self.0.options.persists()) {
            storage.remove_item(self.0.options.display_name());
        }
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("state", &self.get())
            .finish()
    }
}

