//! # The state tree
//!
//! Every store holds a single [`Value`]. Containers (`Array`, `Object`) keep
//! their children behind `Rc`, so cloning a tree is cheap and writes go through
//! `Rc::make_mut`: only the nodes on the written path are copied, every other
//! subtree keeps its identity.
//!
//! ```rust
//! use davstack_store::{Path, Value};
//! use serde_json::json;
//!
//! let before = Value::from(json!({ "a": { "x": 1 }, "b": { "y": 2 } }));
//! let after = before.with_path(&Path::parse("a.x"), Value::from(5));
//!
//! assert_eq!(after.resolve(&Path::parse("a.x")), Value::from(5));
//! // `b` was not touched, so it is still the same allocation.
//! assert!(after.resolve(&Path::parse("b")).same(&before.resolve(&Path::parse("b"))));
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};

use crate::path::{Path, Segment, canonical_index};

pub type Map = BTreeMap<String, Value>;

/// JSON-like state value with shared containers.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),
    /// Opaque host object (media element, handle, ...). Never drafted.
    Host(HostValue),
}

/// Shared, type-erased host object.
#[derive(Clone)]
pub struct HostValue(Rc<dyn Any>);

impl HostValue {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Host({:p})", Rc::as_ptr(&self.0))
    }
}

impl Value {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn host<T: Any>(value: T) -> Self {
        Value::Host(HostValue::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Plain containers can be mutated through a draft; scalars and host
    /// objects are always replaced.
    pub fn is_draftable(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            // 2^63 itself is out of range, hence the exclusive upper bound
            Value::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_host<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Host(h) => h.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Identity comparison: scalars by value, containers and host objects by
    /// allocation.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// One level deep: entries are compared with [`Value::same`].
    pub fn shallow_eq(&self, other: &Value) -> bool {
        if self.same(other) {
            return true;
        }
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.same(other)))
            }
            _ => false,
        }
    }

    pub fn child(&self, segment: &Segment) -> Option<&Value> {
        match (self, segment) {
            (Value::Object(map), Segment::Key(k)) => map.get(k),
            (Value::Object(map), Segment::Index(i)) => map.get(&i.to_string()),
            (Value::Array(items), Segment::Index(i)) => items.get(*i),
            (Value::Array(items), Segment::Key(k)) => canonical_index(k).and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Walks `path` by sequential descent. `None` when any step is missing.
    pub fn lookup(&self, path: &Path) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Like [`Value::lookup`] but missing locations read as `Null`.
    pub fn resolve(&self, path: &Path) -> Value {
        self.lookup(path).cloned().unwrap_or_default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lookup(path).is_some()
    }

    /// Mutable access to the node at `path`, creating intermediate containers
    /// as needed. Every container on the way is unshared with `Rc::make_mut`.
    pub fn pointer_mut(&mut self, path: &Path) -> &mut Value {
        let mut node = self;
        for segment in path.segments() {
            node = node.child_mut(segment);
        }
        node
    }

    fn child_mut(&mut self, segment: &Segment) -> &mut Value {
        match segment {
            Segment::Key(key) => {
                if matches!(self, Value::Array(_))
                    && let Some(index) = canonical_index(key)
                {
                    return self.child_mut(&Segment::Index(index));
                }
                if !matches!(self, Value::Object(_)) {
                    *self = Value::Object(Rc::default());
                }
                match self {
                    Value::Object(map) => Rc::make_mut(map).entry(key.clone()).or_default(),
                    _ => unreachable!("node coerced to an object"),
                }
            }
            Segment::Index(index) => {
                if !matches!(self, Value::Array(_) | Value::Object(_)) {
                    *self = Value::Array(Rc::default());
                }
                match self {
                    Value::Array(items) => {
                        let items = Rc::make_mut(items);
                        if items.len() <= *index {
                            items.resize(*index + 1, Value::Null);
                        }
                        &mut items[*index]
                    }
                    Value::Object(map) => Rc::make_mut(map).entry(index.to_string()).or_default(),
                    _ => unreachable!("node coerced to an array"),
                }
            }
        }
    }

    /// New tree with `value` at `path`. Subtrees off the path are shared.
    pub fn with_path(&self, path: &Path, value: Value) -> Value {
        if path.is_root() {
            return value;
        }
        let mut next = self.clone();
        *next.pointer_mut(path) = value;
        next
    }

    /// Shallow merge of two objects; anything else yields `partial`.
    pub fn merged(&self, partial: &Value) -> Value {
        match (self, partial) {
            (Value::Object(base), Value::Object(patch)) => {
                let mut map = Map::clone(base);
                for (k, v) in patch.iter() {
                    map.insert(k.clone(), v.clone());
                }
                Value::Object(Rc::new(map))
            }
            _ => partial.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Host(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from_json))
            }
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from_json(v))))
            }
        }
    }

    pub fn from_serde<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Value::from_json)
    }

    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Host(h) => h.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(i: $t) -> Self {
                Value::Int(i as i64)
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float(f as f64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(Rc::new(map))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or_default()
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}
