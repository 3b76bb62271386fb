//! Decoded payload nodes
//!
//! Nodes are what codecs produce from a request payload and what reads return.
//! The node kind follows the depth of the path it is attached to.

use std::collections::BTreeMap;
use std::fmt;

/// A single resource value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    UnsignedInteger(u64),
    Float(f64),
    Boolean(bool),
    Opaque(Vec<u8>),
    /// Seconds since the Unix epoch
    Time(i64),
    ObjectLink { object_id: u16, instance_id: u16 },
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) | Value::Time(v) => Some(*v),
            Value::UnsignedInteger(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_object_link(&self) -> Option<(u16, u16)> {
        match self {
            Value::ObjectLink {
                object_id,
                instance_id,
            } => Some((*object_id, *instance_id)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Integer(v) | Value::Time(v) => write!(f, "{}", v),
            Value::UnsignedInteger(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Opaque(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Value::ObjectLink {
                object_id,
                instance_id,
            } => write!(f, "{}:{}", object_id, instance_id),
        }
    }
}

/// Value(s) held by a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceContent {
    Single(Value),
    /// Resource-instance id → value
    Multiple(BTreeMap<u16, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: u16,
    pub content: ResourceContent,
}

impl ResourceNode {
    pub fn single(id: u16, value: Value) -> Self {
        Self {
            id,
            content: ResourceContent::Single(value),
        }
    }

    pub fn multiple(id: u16, values: impl IntoIterator<Item = (u16, Value)>) -> Self {
        Self {
            id,
            content: ResourceContent::Multiple(values.into_iter().collect()),
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self.content, ResourceContent::Multiple(_))
    }

    /// Value of a single resource
    pub fn value(&self) -> Option<&Value> {
        match &self.content {
            ResourceContent::Single(v) => Some(v),
            ResourceContent::Multiple(_) => None,
        }
    }

    /// Value of one resource instance
    pub fn instance(&self, resource_instance_id: u16) -> Option<&Value> {
        match &self.content {
            ResourceContent::Single(_) => None,
            ResourceContent::Multiple(values) => values.get(&resource_instance_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstanceNode {
    pub id: u16,
    pub value: Value,
}

impl ResourceInstanceNode {
    pub fn new(id: u16, value: Value) -> Self {
        Self { id, value }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceNode {
    pub id: u16,
    pub resources: BTreeMap<u16, ResourceNode>,
}

impl InstanceNode {
    pub fn new(id: u16, resources: impl IntoIterator<Item = ResourceNode>) -> Self {
        Self {
            id,
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn resource(&self, resource_id: u16) -> Option<&ResourceNode> {
        self.resources.get(&resource_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub id: u16,
    pub instances: BTreeMap<u16, InstanceNode>,
}

impl ObjectNode {
    pub fn new(id: u16, instances: impl IntoIterator<Item = InstanceNode>) -> Self {
        Self {
            id,
            instances: instances.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    pub fn instance(&self, instance_id: u16) -> Option<&InstanceNode> {
        self.instances.get(&instance_id)
    }
}

/// Any node of the tree, tagged by depth
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(ObjectNode),
    Instance(InstanceNode),
    Resource(ResourceNode),
    ResourceInstance(ResourceInstanceNode),
}

impl Node {
    pub fn id(&self) -> u16 {
        match self {
            Node::Object(n) => n.id,
            Node::Instance(n) => n.id,
            Node::Resource(n) => n.id,
            Node::ResourceInstance(n) => n.id,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Node::Object(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceNode> {
        match self {
            Node::Instance(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceNode> {
        match self {
            Node::Resource(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_instance(self) -> Option<InstanceNode> {
        match self {
            Node::Instance(n) => Some(n),
            _ => None,
        }
    }
}
