//! Node types - the vertices of the graph
//!
//! A node is `{id, label, attributes}`. Once stored, the attribute payload is
//! always a JSON object and carries the node id under the `id` key, so the
//! payload alone is enough to identify its owner.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Attribute key the node id is injected under
pub const ID_KEY: &str = "id";

/// Caller-supplied or generated node identifier.
///
/// Ids compare by their text form in storage, so `NodeId::Int(7)` and
/// `NodeId::Text("7")` address the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    Int(i64),
    Text(String),
}

impl NodeId {
    /// Storage key used in the `id` column and in edge endpoints
    pub fn key(&self) -> String {
        match self {
            NodeId::Int(i) => i.to_string(),
            NodeId::Text(s) => s.clone(),
        }
    }

    /// Rebuild an id from its storage key
    ///
    /// Only canonical integers (`"7"`, not `"007"` or `"+7"`) become `Int`,
    /// so `from_key(k).key() == k` always holds.
    pub fn from_key(key: &str) -> Self {
        match key.parse::<i64>() {
            Ok(i) if i.to_string() == key => NodeId::Int(i),
            _ => NodeId::Text(key.to_string()),
        }
    }

    /// Whether two ids address the same stored node
    pub fn same_as(&self, other: &NodeId) -> bool {
        self.key() == other.key()
    }

    pub fn to_json(&self) -> Value {
        match self {
            NodeId::Int(i) => Value::from(*i),
            NodeId::Text(s) => Value::from(s.as_str()),
        }
    }

    /// Recover an id from its JSON form (as found in a stored payload)
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(NodeId::Int),
            Value::String(s) => Some(NodeId::Text(s.clone())),
            _ => None,
        }
    }

    /// Generate a fresh opaque id for a node that was inserted without one
    pub fn generate(label: &str, attributes: &Map<String, Value>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(label.as_bytes());
        hasher.update(Value::Object(attributes.clone()).to_string().as_bytes());
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());

        let hex = hasher.finalize().to_hex();
        NodeId::Text(hex.as_str()[..16].to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Int(i) => write!(f, "{}", i),
            NodeId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for NodeId {
    type Err = std::convert::Infallible;

    /// Integers parse as `Int`, anything else is kept as text
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(NodeId::from_key(s))
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        NodeId::Int(id)
    }
}

impl From<i32> for NodeId {
    fn from(id: i32) -> Self {
        NodeId::Int(i64::from(id))
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::Text(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId::Text(id)
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// A node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Non-empty label (e.g. resource type)
    pub label: String,
    /// JSON payload, always containing `id`
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Node {
    /// Create a node, coercing `attributes` into an object and injecting the id
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, attributes: impl Into<Value>) -> Self {
        let id = id.into();
        let mut attributes = into_object(attributes.into());
        attributes.insert(ID_KEY.to_string(), id.to_json());

        Self {
            id,
            label: label.into(),
            attributes,
        }
    }

    /// Rebuild a node from its stored label and JSON body
    pub(crate) fn from_stored(label: String, body: &str) -> Result<Self> {
        let attributes = into_object(serde_json::from_str(body)?);
        let id = attributes
            .get(ID_KEY)
            .and_then(NodeId::from_json)
            .ok_or_else(|| Error::CorruptRow(format!("stored node body has no id: {}", body)))?;

        Ok(Self { id, label, attributes })
    }

    /// Look up a single attribute
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Serialized payload, as persisted in the `body` column
    pub fn body(&self) -> String {
        Value::Object(self.attributes.clone()).to_string()
    }

    /// The text to embed for similarity search
    ///
    /// This is the serialized attribute object itself, so searching with a
    /// node's own payload text finds that node at distance zero.
    pub fn embedding_text(&self) -> String {
        self.body()
    }

    /// Get a short description for display
    pub fn short_description(&self) -> String {
        format!("{} [{}]", self.id, self.label)
    }
}

/// Coerce a JSON-or-string payload into an attribute object.
///
/// - objects are taken as-is
/// - `null` becomes an empty object
/// - strings holding a JSON object are parsed; any other string is kept
///   under the `text` key
/// - any other scalar or array is kept under the `value` key
pub fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("text".to_string(), Value::String(s));
                map
            }
        },
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Shallow merge: keys in `patch` overwrite matching keys in `base`
pub fn merge_shallow(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}

pub(crate) fn check_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(Error::EmptyLabel);
    }
    Ok(())
}
