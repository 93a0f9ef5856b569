//! # Stores, Paths, and Accessors
//!
//! Davstack keeps application state in one tree per store and hands out an
//! accessor for any location in it. There are four main pieces:
//!
//! - `store(initial)`: an immutable builder that layers actions, computed
//!   properties and effects over an initial state.
//! - `Store`: a materialized instance; `store.at("a.b")` is a
//!   `PathAccessor` with `get` / `set` / `use_value` / `on_change` / `assign`.
//! - `observe`: a tracked closure standing in for a UI component; `use_*`
//!   reads inside it re-run it on change.
//! - `StoreContext`: providers that give each mounted subtree its own
//!   instance.
//!
//! ## Accessors
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let todos = store(json!({ "filter": "all", "items": [] })).create();
//!
//! todos.at("items").update(|items| {
//!     *items.pointer_mut(&Path::parse("0")) = Value::from("write docs");
//! });
//! todos.at("filter").set("open");
//!
//! assert_eq!(todos.at("items.0").get(), Value::from("write docs"));
//! assert_eq!(todos.at("filter").get_as::<String>().unwrap(), "open");
//! ```
//!
//! Writes never touch subtrees off the written path: after
//! `todos.at("filter").set(..)` the `items` array is the same allocation as
//! before (`Value::same`).
//!
//! ## Extensions
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let counter = store(json!({ "count": 0 }))
//!     .actions(|_| {
//!         Extension::new().action("inc", |s, _| {
//!             s.at("count").set_with(|n| Value::from(n.as_i64().unwrap_or(0) + 1));
//!             Ok(Value::Null)
//!         })
//!     })
//!     .computed(|_| {
//!         [("doubled", Computed::new(|read, _| {
//!             Value::from(read.at("count").as_i64().unwrap_or(0) * 2)
//!         }))]
//!     })
//!     .create();
//!
//! counter.call("inc", &[]).unwrap();
//! assert_eq!(counter.computed("doubled").unwrap().get(), Value::from(2));
//! ```
//!
//! ## Observers
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let s = store(json!({ "count": 0, "other": 0 })).create();
//! let renders = Rc::new(Cell::new(0));
//!
//! let view = observe({
//!     let s = s.clone();
//!     let renders = renders.clone();
//!     move || {
//!         let _ = s.at("count").use_value();
//!         renders.set(renders.get() + 1);
//!     }
//! });
//!
//! s.at("other").set(1); // not used by the observer
//! s.at("count").set(1);
//! assert_eq!(renders.get(), 2);
//! drop(view);
//! ```

pub mod accessor;
pub mod builder;
pub mod computed;
pub mod context;
pub mod effects;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod options;
pub mod path;
pub mod persist;
pub mod prelude;
pub mod reactive;
pub mod router;
pub mod scope;
pub mod store;
pub mod tests;
pub mod value;

pub use accessor::*;
pub use builder::*;
pub use computed::*;
pub use context::*;
pub use effects::*;
pub use engine::{Equality, ReactiveStore, SubscribeOptions};
pub use error::*;
pub use mutation::{Committed, Mutation, produce};
pub use options::*;
pub use path::*;
pub use persist::StateStorage;
pub use reactive::{Observer, observe, use_store};
pub use router::*;
pub use scope::*;
pub use store::*;
pub use value::*;
