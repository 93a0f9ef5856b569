use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::persist::StateStorage;

bitflags! {
    /// Behaviour switches for a store instance.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StoreFlags: u8 {
        /// Log every write with a `path/op` label at `debug`.
        const LABEL_ACTIONS = 1 << 0;
        /// Warn when a write creates containers that did not exist.
        const WARN_UNKNOWN_PATHS = 1 << 1;
        /// Hydrate from and write through to the configured storage.
        const PERSIST = 1 << 2;
    }
}

impl Default for StoreFlags {
    fn default() -> Self {
        StoreFlags::LABEL_ACTIONS
    }
}

#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Used for log labels and as the persistence key.
    pub name: Option<String>,
    pub flags: StoreFlags,
    pub storage: Option<Rc<dyn StateStorage>>,
}

impl StoreOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("store")
    }

    pub fn persists(&self) -> bool {
        self.flags.contains(StoreFlags::PERSIST) && self.storage.is_some()
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("storage", &self.storage.is_some())
            .finish()
    }
}
