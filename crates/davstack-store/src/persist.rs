//! Optional persistence hook. Only the adapter interface lives here; backends
//! (local storage, files, ...) are supplied by the caller.

use std::rc::Rc;

use crate::effects::Dispose;
use crate::engine::{Equality, ReactiveStore, SubscribeOptions};
use crate::options::StoreOptions;
use crate::value::Value;

/// Key/value string storage, shaped like web storage.
pub trait StateStorage {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
}

/// Overlays previously persisted state (if any) on `initial`.
pub(crate) fn hydrate(options: &StoreOptions, initial: Value) -> Value {
    let Some(storage) = options.storage.as_ref().filter(|_| options.persists()) else {
        return initial;
    };
    let key = options.display_name();
    match storage.get_item(key) {
        Some(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(json) => {
                log::debug!("[{key}] hydrated from storage");
                initial.merged(&Value::from_json(json))
            }
            Err(e) => {
                log::warn!("[{key}] ignoring unreadable persisted state: {e}");
                initial
            }
        },
        None => initial,
    }
}

/// Writes the whole state to storage after every change.
pub(crate) fn write_through(options: &StoreOptions, engine: &ReactiveStore) -> Option<Dispose> {
    let storage = options.storage.clone().filter(|_| options.persists())?;
    let key: Rc<str> = options.display_name().into();
    Some(engine.subscribe(
        Rc::new(Value::clone),
        Rc::new(move |state: &Value, _: &Value| {
            storage.set_item(&key, &state.to_string());
        }),
        SubscribeOptions {
            fire_immediately: false,
            equality: Equality::Strict,
        },
    ))
}
