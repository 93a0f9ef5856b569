use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::accessor::PathAccessor;
use crate::path::Path;

/// Cleanup handle returned by every subscription.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// A handle with nothing to clean up.
    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.0.borrow().is_none()
    }
}

impl fmt::Debug for Dispose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispose")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Runs `f()` immediately and ties its `Dispose` to the current scope, if any.
pub fn effect<F>(f: F) -> Dispose
where
    F: FnOnce() -> Dispose,
{
    let d = f();
    if let Some(scope) = crate::scope::current_scope() {
        let d2 = d.clone();
        scope.add_disposer(move || d2.run());
    }
    d
}

pub type EffectFactory = Rc<dyn Fn(&PathAccessor) -> Dispose>;

/// Named effect factories returned from a `.effects(..)` builder.
#[derive(Clone, Default)]
pub struct Effects {
    entries: Vec<(String, EffectFactory)>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effect(
        mut self,
        name: impl Into<String>,
        factory: impl Fn(&PathAccessor) -> Dispose + 'static,
    ) -> Self {
        self.entries.push((name.into(), Rc::new(factory)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Registered {
    name: String,
    path: Path,
    factory: EffectFactory,
}

/// Effect lifecycle for one store instance. Factories run on
/// [`subscribe_all`](EffectRegistry::subscribe_all) and their cleanups on
/// [`unsubscribe_all`](EffectRegistry::unsubscribe_all); both are safe to
/// repeat.
#[derive(Default)]
pub(crate) struct EffectRegistry {
    factories: RefCell<Vec<Registered>>,
    active: RefCell<Vec<(String, Dispose)>>,
}

impl EffectRegistry {
    pub(crate) fn register(&self, path: &Path, effects: Effects) {
        let mut factories = self.factories.borrow_mut();
        for (name, factory) in effects.entries {
            if let Some(existing) = factories.iter_mut().find(|r| r.name == name) {
                log::debug!("effect `{name}` redefined");
                existing.path = path.clone();
                existing.factory = factory;
            } else {
                factories.push(Registered {
                    name,
                    path: path.clone(),
                    factory,
                });
            }
        }
    }

    pub(crate) fn subscribe_all(&self, root: &PathAccessor) {
        let pending: Vec<(String, Path, EffectFactory)> = {
            let active = self.active.borrow();
            self.factories
                .borrow()
                .iter()
                .filter(|r| !active.iter().any(|(name, _)| *name == r.name))
                .map(|r| (r.name.clone(), r.path.clone(), r.factory.clone()))
                .collect()
        };
        for (name, path, factory) in pending {
            log::debug!("[{}] subscribing effect `{name}`", root.store().name());
            let dispose = factory(&root.at(path));
            self.active.borrow_mut().push((name, dispose));
        }
    }

    pub(crate) fn unsubscribe_all(&self) {
        let active = std::mem::take(&mut *self.active.borrow_mut());
        for (name, dispose) in active {
            log::debug!("unsubscribing effect `{name}`");
            dispose.run();
        }
    }

    pub(crate) fn active_names(&self) -> Vec<String> {
        self.active
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.factories
            .borrow()
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }
}
