//! In-memory product data.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Record(Vec<Node>),
    Array(Vec<Node>),
    Int(i64),
    UInt(u64),
    Real(f64),
    Text(String),
}

/// A data node: its value plus the values of its attribute record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Box<Node>>,
}

pub(crate) static EMPTY_RECORD_NODE: Node = Node {
    value: Value::Record(Vec::new()),
    attributes: None,
};

impl Node {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            attributes: None,
        }
    }

    pub fn record(fields: Vec<Node>) -> Self {
        Self::new(Value::Record(fields))
    }

    pub fn array(elements: Vec<Node>) -> Self {
        Self::new(Value::Array(elements))
    }

    pub fn int(value: i64) -> Self {
        Self::new(Value::Int(value))
    }

    pub fn uint(value: u64) -> Self {
        Self::new(Value::UInt(value))
    }

    pub fn real(value: f64) -> Self {
        Self::new(Value::Real(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Value::Text(value.into()))
    }

    /// Attach attribute values (a record node).
    pub fn with_attributes(mut self, attributes: Vec<Node>) -> Self {
        self.attributes = Some(Box::new(Node::record(attributes)));
        self
    }

    pub fn attributes(&self) -> &Node {
        self.attributes.as_deref().unwrap_or(&EMPTY_RECORD_NODE)
    }

    /// Children of a record or array node.
    pub fn children(&self) -> &[Node] {
        match &self.value {
            Value::Record(children) | Value::Array(children) => children,
            _ => &[],
        }
    }
}
