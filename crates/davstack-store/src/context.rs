//! # Scoped stores
//!
//! A [`StoreContext`] binds a store definition to a provider. Every mounted
//! [`Provider`] owns its own instance (state, computed values, effects), and
//! code running inside [`Provider::run`] finds the innermost one with
//! [`StoreContext::use_store`]:
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let counter = create_store_context(store(json!({ "count": 0 })));
//!
//! let a = counter.mount_with(json!({ "count": 1 }));
//! let b = counter.mount_with(json!({ "count": 10 }));
//!
//! a.run(|| counter.use_store().unwrap().at("count").set(2));
//! b.run(|| {
//!     let s = counter.use_store().unwrap();
//!     assert_eq!(s.at("count").get(), Value::from(10));
//! });
//! assert!(counter.use_store().is_err());
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::builder::StoreBuilder;
use crate::error::{Result, StoreError};
use crate::scope::Scope;
use crate::store::Store;
use crate::value::Value;

type ContextId = usize;

thread_local! {
    static PROVIDER_STACK: RefCell<Vec<(ContextId, Store)>> = const { RefCell::new(Vec::new()) };
}

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(0);

fn with_provider_frame<R>(id: ContextId, store: Store, f: impl FnOnce() -> R) -> R {
    // Non-panicking frame guard (ensures pop on unwind)
    struct Guard;
    impl Drop for Guard {
        fn drop(&mut self) {
            PROVIDER_STACK.with(|st| {
                st.borrow_mut().pop();
            });
        }
    }
    PROVIDER_STACK.with(|st| st.borrow_mut().push((id, store)));
    let _guard = Guard;
    f()
}

pub struct StoreContext {
    id: ContextId,
    name: Rc<str>,
    builder: StoreBuilder,
}

pub fn create_store_context(builder: StoreBuilder) -> StoreContext {
    StoreContext::new(builder)
}

impl StoreContext {
    pub fn new(builder: StoreBuilder) -> Self {
        let name: Rc<str> = builder.definition().options().display_name().into();
        Self {
            id: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            name,
            builder,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn builder(&self) -> &StoreBuilder {
        &self.builder
    }

    pub fn mount(&self) -> Provider {
        self.mount_instance(self.builder.create())
    }

    /// Mounts with instance-specific initial state merged over the default.
    pub fn mount_with(&self, overrides: impl Into<Value>) -> Provider {
        self.mount_instance(self.builder.create_with(overrides))
    }

    fn mount_instance(&self, store: Store) -> Provider {
        let scope = Scope::new();
        store.subscribe_to_effects();
        scope.add_disposer({
            let store = store.clone();
            move || store.unsubscribe_from_effects()
        });
        log::debug!("[{}] provider mounted", self.name);
        Provider {
            context: self.id,
            name: self.name.clone(),
            store,
            scope: Some(scope),
        }
    }

    /// Mounts a provider and runs `children` inside it once.
    pub fn provide<R>(&self, overrides: Option<Value>, children: impl FnOnce() -> R) -> (Provider, R) {
        let provider = match overrides {
            Some(overrides) => self.mount_with(overrides),
            None => self.mount(),
        };
        let out = provider.run(children);
        (provider, out)
    }

    /// The innermost mounted instance of this context.
    pub fn use_store(&self) -> Result<Store> {
        self.try_use_store()
            .ok_or_else(|| StoreError::MissingProvider {
                context: self.name.to_string(),
            })
    }

    pub fn try_use_store(&self) -> Option<Store> {
        PROVIDER_STACK.with(|st| {
            st.borrow()
                .iter()
                .rev()
                .find(|(id, _)| *id == self.id)
                .map(|(_, store)| store.clone())
        })
    }
}

/// A mounted instance. Unmounting (or dropping) unsubscribes its effects.
pub struct Provider {
    context: ContextId,
    name: Rc<str>,
    store: Store,
    scope: Option<Scope>,
}

impl Provider {
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_mounted(&self) -> bool {
        self.scope.is_some()
    }

    /// Runs `children` with this instance visible to `use_store`. Effects
    /// created through [`effect`](crate::effect) inside are cleaned up on
    /// unmount.
    pub fn run<R>(&self, children: impl FnOnce() -> R) -> R {
        with_provider_frame(self.context, self.store.clone(), || match &self.scope {
            Some(scope) => scope.run(children),
            None => children(),
        })
    }

    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(scope) = self.scope.take() {
            log::debug!("[{}] provider unmounted", self.name);
            scope.dispose();
        }
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.teardown();
    }
}
