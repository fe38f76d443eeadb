use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

const MAX_OPAQUE_REPR: usize = 200;

/// Bounds applied to a single capture.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotLimits {
    pub max_depth: u32,
    pub max_props: usize,
    /// When non-empty, only these object fields are captured.
    pub fields: Vec<String>,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_props: 50,
            fields: Vec::new(),
        }
    }
}

/// The serialized form of a captured value tree. Markers keep the output
/// valid JSON while flagging where bounds cut the capture short.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum SnapshotNode {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<SnapshotNode>),
    Truncated(TruncationMarker),
    Cycle(CycleMarker),
    Opaque(OpaqueMarker),
    Map(IndexMap<String, SnapshotNode>),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TruncationMarker {
    #[serde(rename = "__truncated__")]
    pub truncated: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CycleMarker {
    #[serde(rename = "__cycle__")]
    pub cycle: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OpaqueMarker {
    #[serde(rename = "__type__")]
    pub type_name: String,
    pub repr: String,
}

impl SnapshotNode {
    pub fn truncated() -> Self {
        SnapshotNode::Truncated(TruncationMarker { truncated: true })
    }

    pub fn cycle() -> Self {
        SnapshotNode::Cycle(CycleMarker { cycle: true })
    }

    pub fn opaque(type_name: &str, repr: &str) -> Self {
        let mut repr = repr.to_owned();
        if repr.len() > MAX_OPAQUE_REPR {
            let mut cut = MAX_OPAQUE_REPR - 3;
            while !repr.is_char_boundary(cut) {
                cut -= 1;
            }
            repr.truncate(cut);
            repr.push_str("...");
        }
        SnapshotNode::Opaque(OpaqueMarker {
            type_name: type_name.to_owned(),
            repr,
        })
    }
}

/// Capture arguments, receiver, and locals into a single ordered map,
/// the `snapshot` payload of a tracepoint event.
pub fn capture(
    receiver: Option<&Value>,
    args: &[Value],
    locals: &IndexMap<String, Value>,
    limits: &SnapshotLimits,
) -> SnapshotNode {
    let mut encoder = Encoder::new(limits);
    let mut root = IndexMap::new();

    for (i, arg) in args.iter().enumerate() {
        root.insert(format!("arg{i}"), encoder.encode(arg, 0));
    }
    if let Some(this) = receiver {
        root.insert("this".to_owned(), encoder.encode(this, 0));
    }
    for (name, value) in locals {
        root.insert(name.clone(), encoder.encode(value, 0));
    }

    SnapshotNode::Map(root)
}

/// Encode one value on its own, e.g. for logpoint template rendering.
pub fn encode_value(value: &Value, limits: &SnapshotLimits) -> SnapshotNode {
    Encoder::new(limits).encode(value, 0)
}

struct Encoder<'a> {
    limits: &'a SnapshotLimits,
    // identities of composites on the current descent path
    path: Vec<usize>,
}

impl<'a> Encoder<'a> {
    fn new(limits: &'a SnapshotLimits) -> Self {
        Self {
            limits,
            path: Vec::new(),
        }
    }

    fn encode(&mut self, value: &Value, depth: u32) -> SnapshotNode {
        match value {
            Value::Null => SnapshotNode::Null,
            Value::Bool(b) => SnapshotNode::Bool(*b),
            Value::Int(i) => SnapshotNode::Int(*i),
            Value::Float(f) => SnapshotNode::Float(*f),
            Value::Str(s) => SnapshotNode::Str(s.clone()),
            Value::Opaque { type_name, repr } => SnapshotNode::opaque(type_name, repr),
            composite => self.encode_composite(composite, depth),
        }
    }

    fn encode_composite(&mut self, value: &Value, depth: u32) -> SnapshotNode {
        if depth >= self.limits.max_depth {
            return SnapshotNode::truncated();
        }

        let id = value
            .identity()
            .expect("composite values always carry an identity");
        if self.path.contains(&id) {
            return SnapshotNode::cycle();
        }

        self.path.push(id);
        let node = match value {
            Value::List(items) => {
                let items = items.read();
                let mut out = Vec::new();
                for item in items.iter() {
                    if out.len() >= self.limits.max_props {
                        out.push(SnapshotNode::truncated());
                        break;
                    }
                    out.push(self.encode(item, depth + 1));
                }
                SnapshotNode::List(out)
            }
            Value::Map(entries) => {
                let entries = entries.read();
                let mut out = IndexMap::new();
                for (key, item) in entries.iter() {
                    if out.len() >= self.limits.max_props {
                        out.insert("__truncated__".to_owned(), SnapshotNode::Bool(true));
                        break;
                    }
                    out.insert(key.clone(), self.encode(item, depth + 1));
                }
                SnapshotNode::Map(out)
            }
            Value::Object(obj) => {
                let fields = obj.fields.read();
                let mut out = IndexMap::new();
                out.insert(
                    "__class__".to_owned(),
                    SnapshotNode::Str(obj.type_name.clone()),
                );
                let mut count = 0;
                for (name, item) in fields.iter() {
                    if !self.limits.fields.is_empty() && !self.limits.fields.contains(name) {
                        continue;
                    }
                    if count >= self.limits.max_props {
                        out.insert("__truncated__".to_owned(), SnapshotNode::Bool(true));
                        break;
                    }
                    out.insert(name.clone(), self.encode(item, depth + 1));
                    count += 1;
                }
                SnapshotNode::Map(out)
            }
            _ => unreachable!("only composites reach encode_composite"),
        };
        self.path.pop();

        node
    }
}
