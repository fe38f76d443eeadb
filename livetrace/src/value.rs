use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

/// A live value handed to the engine by a runtime adapter.
///
/// Composites are `Arc`-shared with interior mutability so adapters can
/// mirror whatever object graph the host runtime holds, including cyclic
/// ones. Arc pointer identity doubles as object identity for cycle
/// detection during capture.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Arc<RwLock<Vec<Value>>>),
    Map(Arc<RwLock<IndexMap<String, Value>>>),
    Object(Arc<ObjectValue>),
    Opaque { type_name: String, repr: String },
}

/// A named-field value, the adapter-side stand-in for a host object
/// reachable through reflection.
pub struct ObjectValue {
    pub type_name: String,
    pub fields: RwLock<IndexMap<String, Value>>,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(RwLock::new(items)))
    }

    pub fn map(entries: IndexMap<String, Value>) -> Value {
        Value::Map(Arc::new(RwLock::new(entries)))
    }

    pub fn object(type_name: &str, fields: IndexMap<String, Value>) -> Value {
        Value::Object(Arc::new(ObjectValue {
            type_name: type_name.to_owned(),
            fields: RwLock::new(fields),
        }))
    }

    pub fn opaque(type_name: &str, repr: &str) -> Value {
        Value::Opaque {
            type_name: type_name.to_owned(),
            repr: repr.to_owned(),
        }
    }

    /// Pointer identity of a composite, used for cycle detection.
    /// Primitives and opaques have no identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(Arc::as_ptr(l) as usize),
            Value::Map(m) => Some(Arc::as_ptr(m) as usize),
            Value::Object(o) => Some(Arc::as_ptr(o) as *const u8 as usize),
            _ => None,
        }
    }

    /// Numeric coercion used by comparison operators: ints, floats,
    /// booleans (0/1) and numeric-looking strings all compare as f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Named-member lookup on maps and objects.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(m) => m.read().get(name).cloned(),
            Value::Object(o) => o.fields.read().get(name).cloned(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used by the comparison fallback. Composites render as
    /// identity strings so two distinct graphs never compare equal.
    pub fn coerce_string(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(l) => format!("list@{:x}", Arc::as_ptr(l) as usize),
            Value::Map(m) => format!("map@{:x}", Arc::as_ptr(m) as usize),
            Value::Object(o) => format!("{}@{:x}", o.type_name, Arc::as_ptr(o) as *const u8 as usize),
            Value::Opaque { type_name, .. } => format!("<{}>", type_name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(_) => write!(f, "List(..)"),
            Value::Map(_) => write!(f, "Map(..)"),
            Value::Object(o) => write!(f, "Object({})", o.type_name),
            Value::Opaque { type_name, .. } => write!(f, "Opaque({type_name})"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
