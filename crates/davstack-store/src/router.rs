//! Name-based access to a store.
//!
//! [`PathAccessor`] is the typed way in. `PathRouter` is the dynamic one: it
//! accumulates property names and, when invoked, treats the final name as the
//! operation. Useful when paths arrive as strings (bindings, scripting, a
//! devtools console):
//!
//! ```rust
//! use davstack_store::*;
//! use serde_json::json;
//!
//! let s = store(json!({ "parent": { "count": 2 } })).create();
//! s.router().route("parent.count.set").invoke(Args::new().arg(5)).unwrap();
//! let got = s.router().route("parent.count.get").invoke(Args::new()).unwrap();
//! assert_eq!(got.into_value(), Some(Value::from(5)));
//! ```

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use crate::accessor::{OnChangeOptions, PathAccessor};
use crate::computed::ComputedAccessor;
use crate::effects::Dispose;
use crate::engine::Listener;
use crate::error::{Result, StoreError};
use crate::mutation::Committed;
use crate::path::{Path, Segment};
use crate::store::{Member, Store};
use crate::value::Value;

/// The operations every path supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessorOp {
    Get,
    Set,
    Use,
    OnChange,
    Assign,
}

impl AccessorOp {
    pub const ALL: [AccessorOp; 5] = [
        AccessorOp::Get,
        AccessorOp::Set,
        AccessorOp::Use,
        AccessorOp::OnChange,
        AccessorOp::Assign,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccessorOp::Get => "get",
            AccessorOp::Set => "set",
            AccessorOp::Use => "use",
            AccessorOp::OnChange => "onChange",
            AccessorOp::Assign => "assign",
        }
    }
}

impl fmt::Display for AccessorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessorOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "get" => Ok(AccessorOp::Get),
            "set" => Ok(AccessorOp::Set),
            "use" => Ok(AccessorOp::Use),
            "onChange" | "on_change" => Ok(AccessorOp::OnChange),
            "assign" => Ok(AccessorOp::Assign),
            other => Err(StoreError::UnrecognizedOperation {
                op: other.to_string(),
                path: String::new(),
            }),
        }
    }
}

/// Names that never resolve to an extension member, so object-protocol lookups
/// cannot be shadowed.
const RESERVED_KEYS: &[&str] = &[
    "constructor",
    "toString",
    "toJSON",
    "valueOf",
    "hasOwnProperty",
    "__proto__",
    "$$typeof",
];

/// Arguments of a routed call.
#[derive(Clone, Default)]
pub struct Args {
    values: Vec<Value>,
    listener: Option<Listener>,
    on_change: OnChangeOptions,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn listener(mut self, f: impl Fn(&Value, &Value) + 'static) -> Self {
        self.listener = Some(Rc::new(f));
        self
    }

    pub fn on_change_options(mut self, options: OnChangeOptions) -> Self {
        self.on_change = options;
        self
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn first(&self, op: AccessorOp) -> Result<Value> {
        self.values
            .first()
            .cloned()
            .ok_or_else(|| StoreError::InvalidArguments {
                op: op.to_string(),
                reason: "expected a value".into(),
            })
    }
}

/// Result of a routed call.
#[derive(Debug)]
pub enum Outcome {
    Value(Value),
    Committed(Committed),
    Subscription(Dispose),
    Done,
}

impl Outcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_subscription(self) -> Option<Dispose> {
        match self {
            Outcome::Subscription(d) => Some(d),
            _ => None,
        }
    }
}

/// What a property name resolves to.
#[derive(Debug)]
pub enum Property {
    /// An action or value attached to the current node.
    Member(Member),
    /// A deeper route.
    Route(PathRouter),
    /// Deliberately unresolvable (`then`).
    Absent,
}

#[derive(Clone)]
pub struct PathRouter {
    store: Store,
    path: Path,
}

impl PathRouter {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            path: Path::root(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Property lookup. Actions and plain values win over routing, except for
    /// the reserved protocol names; computed members route on so that
    /// `.prop("get")` reaches them. `then` never resolves.
    pub fn prop(&self, key: &str) -> Property {
        if key == "then" {
            return Property::Absent;
        }
        if !RESERVED_KEYS.contains(&key) {
            match self.store.member_at(&self.path, key) {
                Some(Member::Computed(_)) | None => {}
                Some(member) => return Property::Member(member),
            }
        }
        Property::Route(self.key(key))
    }

    /// Always extends the path. Canonical numbers become indices, as in
    /// [`Path::parse`].
    pub fn key(&self, key: &str) -> PathRouter {
        PathRouter {
            store: self.store.clone(),
            path: self.path.child(Segment::from(key)),
        }
    }

    pub fn index(&self, index: usize) -> PathRouter {
        PathRouter {
            store: self.store.clone(),
            path: self.path.child(Segment::Index(index)),
        }
    }

    /// Extends the path by a dotted expression.
    pub fn route(&self, dotted: &str) -> PathRouter {
        PathRouter {
            store: self.store.clone(),
            path: self.path.join(&Path::parse(dotted)),
        }
    }

    /// Calls the route. The last segment names the operation (or an action
    /// attached to the node before it); everything before it is the path.
    pub fn invoke(&self, args: Args) -> Result<Outcome> {
        let Some((target, last)) = self.path.split_last() else {
            return Err(self.unrecognized("", &self.path));
        };
        let name = last.to_string();

        match name.parse::<AccessorOp>() {
            Ok(op) => match self.computed_at(&target) {
                Some(computed) => invoke_computed(&computed, op, args),
                None => invoke_path(&self.store.at(target), op, args),
            },
            Err(_) => match self.store.member_at(&target, &name) {
                Some(Member::Action(action)) => {
                    action(&self.store.at(target), &args.values).map(Outcome::Value)
                }
                Some(Member::Value(v)) => Ok(Outcome::Value(v)),
                Some(Member::Computed(_)) => Err(StoreError::NotCallable {
                    name,
                    path: target.to_string(),
                }),
                None => Err(self.unrecognized(&name, &target)),
            },
        }
    }

    fn computed_at(&self, target: &Path) -> Option<ComputedAccessor> {
        let (owner, last) = target.split_last()?;
        let name = last.as_key()?;
        self.store.at(owner).computed(name).ok()
    }

    fn unrecognized(&self, op: &str, path: &Path) -> StoreError {
        log::error!(
            "[{}] `{op}` at `{path}` is not one of {:?} or a member",
            self.store.name(),
            AccessorOp::ALL.map(AccessorOp::as_str)
        );
        StoreError::UnrecognizedOperation {
            op: op.to_string(),
            path: path.to_string(),
        }
    }
}

impl fmt::Debug for PathRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRouter")
            .field("store", &self.store.name())
            .field("path", &self.path.to_string())
            .finish()
    }
}

fn invoke_path(accessor: &PathAccessor, op: AccessorOp, args: Args) -> Result<Outcome> {
    Ok(match op {
        AccessorOp::Get => Outcome::Value(accessor.get()),
        AccessorOp::Use => Outcome::Value(accessor.use_value()),
        AccessorOp::Set => Outcome::Committed(accessor.set(args.first(op)?)),
        AccessorOp::Assign => Outcome::Committed(accessor.assign(args.first(op)?)),
        AccessorOp::OnChange => {
            let listener = args.listener.ok_or_else(|| StoreError::InvalidArguments {
                op: op.to_string(),
                reason: "expected a listener".into(),
            })?;
            Outcome::Subscription(accessor.on_change_rc(listener, args.on_change))
        }
    })
}

fn invoke_computed(computed: &ComputedAccessor, op: AccessorOp, args: Args) -> Result<Outcome> {
    let input = args.values.first().cloned().unwrap_or_default();
    match op {
        AccessorOp::Get => Ok(Outcome::Value(computed.get_for(input))),
        AccessorOp::Use => Ok(Outcome::Value(computed.use_for(input))),
        AccessorOp::Set => computed.set(args.first(op)?).map(|()| Outcome::Done),
        AccessorOp::OnChange | AccessorOp::Assign => Err(StoreError::InvalidArguments {
            op: op.to_string(),
            reason: format!("not supported on computed `{}`", computed.name()),
        }),
    }
}
