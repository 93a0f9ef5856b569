//! # Store definitions
//!
//! `store(initial)` starts an immutable [`StoreBuilder`]. Each chain call
//! returns a new builder with one more extension layer; nothing runs until
//! [`create`](StoreBuilder::create), which materializes a fresh [`Store`] by
//! applying the layers in order. The same builder can be materialized any
//! number of times (a global instance, one per provider, one per test).
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let counter = store(json!({ "count": 0 })).actions(|_| {
//!     Extension::new().action("inc", |s, _| {
//!         let n = s.at("count").get().as_i64().unwrap_or(0);
//!         s.at("count").set(n + 1);
//!         Ok(Value::Null)
//!     })
//! });
//!
//! let s = counter.create();
//! for _ in 0..3 {
//!     s.call("inc", &[]).unwrap();
//! }
//! assert_eq!(s.at("count").get(), Value::from(3));
//! ```

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::accessor::PathAccessor;
use crate::computed::Computed;
use crate::effects::Effects;
use crate::engine::ReactiveStore;
use crate::options::{StoreFlags, StoreOptions};
use crate::path::Path;
use crate::persist::{self, StateStorage};
use crate::store::{Extension, Store};
use crate::value::Value;

type ExtensionFn = Rc<dyn Fn(&PathAccessor) -> Extension>;
type EffectsFn = Rc<dyn Fn(&PathAccessor) -> Effects>;

#[derive(Clone)]
enum LayerKind {
    Members(ExtensionFn),
    Effects(EffectsFn),
}

#[derive(Clone)]
struct Layer {
    path: Path,
    kind: LayerKind,
}

/// Everything needed to materialize a store.
#[derive(Clone, Default)]
pub struct StoreDefinition {
    initial: Option<Value>,
    layers: Vec<Layer>,
    options: StoreOptions,
}

impl StoreDefinition {
    /// `None` for deferred stores.
    pub fn initial_state(&self) -> Option<&Value> {
        self.initial.as_ref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("initial", &self.initial)
            .field("layers", &self.layers.len())
            .field("options", &self.options)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct StoreBuilder {
    def: Rc<StoreDefinition>,
}

pub fn store(initial: impl Into<Value>) -> StoreBuilder {
    StoreBuilder::from_definition(StoreDefinition {
        initial: Some(initial.into()),
        ..StoreDefinition::default()
    })
}

/// A store whose initial state is supplied at `create_with` time.
pub fn store_deferred() -> StoreBuilder {
    StoreBuilder::from_definition(StoreDefinition::default())
}

impl StoreBuilder {
    fn from_definition(def: StoreDefinition) -> Self {
        Self { def: Rc::new(def) }
    }

    fn map_definition(&self, f: impl FnOnce(&mut StoreDefinition)) -> Self {
        let mut def = StoreDefinition::clone(&self.def);
        f(&mut def);
        Self::from_definition(def)
    }

    fn layered(&self, path: Path, kind: LayerKind) -> Self {
        self.map_definition(|def| def.layers.push(Layer { path, kind }))
    }

    pub fn definition(&self) -> &StoreDefinition {
        &self.def
    }

    /// Adds members to the root. The builder sees every member added by
    /// earlier layers.
    pub fn extend(&self, f: impl Fn(&PathAccessor) -> Extension + 'static) -> Self {
        self.layered(Path::root(), LayerKind::Members(Rc::new(f)))
    }

    pub fn actions(&self, f: impl Fn(&PathAccessor) -> Extension + 'static) -> Self {
        self.extend(f)
    }

    /// Adds members to the node at `path`.
    pub fn extend_at(
        &self,
        path: impl Into<Path>,
        f: impl Fn(&PathAccessor) -> Extension + 'static,
    ) -> Self {
        self.layered(path.into(), LayerKind::Members(Rc::new(f)))
    }

    pub fn computed<F, I, K>(&self, f: F) -> Self
    where
        F: Fn(&PathAccessor) -> I + 'static,
        I: IntoIterator<Item = (K, Computed)>,
        K: Into<String>,
    {
        self.computed_at(Path::root(), f)
    }

    pub fn computed_at<F, I, K>(&self, path: impl Into<Path>, f: F) -> Self
    where
        F: Fn(&PathAccessor) -> I + 'static,
        I: IntoIterator<Item = (K, Computed)>,
        K: Into<String>,
    {
        self.extend_at(path, move |s| f(s).into_iter().collect())
    }

    pub fn effects(&self, f: impl Fn(&PathAccessor) -> Effects + 'static) -> Self {
        self.layered(Path::root(), LayerKind::Effects(Rc::new(f)))
    }

    pub fn options(&self, options: StoreOptions) -> Self {
        self.map_definition(|def| def.options = options)
    }

    pub fn name(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.map_definition(|def| def.options.name = Some(name))
    }

    pub fn flags(&self, flags: StoreFlags) -> Self {
        self.map_definition(|def| def.options.flags = flags)
    }

    /// Hydrate from and write through to `storage`, keyed by the store name.
    pub fn persist(&self, storage: Rc<dyn StateStorage>) -> Self {
        self.map_definition(|def| {
            def.options.flags |= StoreFlags::PERSIST;
            def.options.storage = Some(storage);
        })
    }

    pub fn create(&self) -> Store {
        materialize(&self.def, None)
    }

    /// Materializes with `overrides` shallow-merged over the initial state.
    pub fn create_with(&self, overrides: impl Into<Value>) -> Store {
        materialize(&self.def, Some(overrides.into()))
    }
}

pub(crate) fn materialize(def: &StoreDefinition, overrides: Option<Value>) -> Store {
    let initial = match (&def.initial, overrides) {
        (Some(initial), Some(overrides)) => initial.merged(&overrides),
        (Some(initial), None) => initial.clone(),
        (None, Some(overrides)) => overrides,
        (None, None) => Value::Null,
    };
    let initial = persist::hydrate(&def.options, initial);
    let engine = ReactiveStore::with_flags(def.options.display_name(), initial, def.options.flags);
    let store = Store::new(engine, def.options.clone());

    for layer in &def.layers {
        let scope = store.at(&layer.path);
        match &layer.kind {
            LayerKind::Members(f) => store.install(&layer.path, f(&scope)),
            LayerKind::Effects(f) => store.register_effects(&layer.path, f(&scope)),
        }
    }
    if let Some(dispose) = persist::write_through(&def.options, store.engine()) {
        store.attach_persistence(dispose);
    }
    log::debug!(
        "[{}] materialized with {} layer(s)",
        store.name(),
        def.layers.len()
    );
    store
}

/// Process-wide instance, materialized on first access. Effects are
/// subscribed once, at that point.
pub struct GlobalStore {
    builder: StoreBuilder,
    instance: OnceCell<Store>,
}

impl GlobalStore {
    pub fn new(builder: StoreBuilder) -> Self {
        Self {
            builder,
            instance: OnceCell::new(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.instance.get().is_some()
    }

    pub fn instance(&self) -> &Store {
        self.instance.get_or_init(|| {
            let store = self.builder.create();
            store.subscribe_to_effects();
            store
        })
    }

    pub fn builder(&self) -> &StoreBuilder {
        &self.builder
    }

    pub fn at(&self, path: impl Into<Path>) -> PathAccessor {
        self.instance().at(path)
    }
}
