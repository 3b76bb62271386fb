//! Typed downlink requests
//!
//! Requests arrive already decoded: payloads are node trees, never raw bytes.
//! Constructors reject shapes that can never be legal, so enablers only see
//! requests whose payload matches the depth of their path.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::node::{InstanceNode, ObjectNode, ResourceInstanceNode, ResourceNode};
use crate::path::Path;

/// Payload encoding hint attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    Text,
    Link,
    Opaque,
    Cbor,
    SenmlJson,
    SenmlCbor,
    Tlv,
    Json,
}

impl ContentFormat {
    /// IANA CoAP content-format code
    pub fn code(&self) -> u16 {
        match self {
            ContentFormat::Text => 0,
            ContentFormat::Link => 40,
            ContentFormat::Opaque => 42,
            ContentFormat::Cbor => 60,
            ContentFormat::SenmlJson => 110,
            ContentFormat::SenmlCbor => 112,
            ContentFormat::Tlv => 11542,
            ContentFormat::Json => 11543,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ContentFormat::Text),
            40 => Some(ContentFormat::Link),
            42 => Some(ContentFormat::Opaque),
            60 => Some(ContentFormat::Cbor),
            110 => Some(ContentFormat::SenmlJson),
            112 => Some(ContentFormat::SenmlCbor),
            11542 => Some(ContentFormat::Tlv),
            11543 => Some(ContentFormat::Json),
            _ => None,
        }
    }
}

/// Execute arguments, e.g. `0='reboot now',1`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    values: BTreeMap<u8, Option<String>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, digit: u8, value: Option<&str>) -> Self {
        self.values.insert(digit, value.map(str::to_string));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, digit: u8) -> bool {
        self.values.contains_key(&digit)
    }

    /// Value of an argument; `None` if absent or given without value
    pub fn value(&self, digit: u8) -> Option<&str> {
        self.values.get(&digit).and_then(|v| v.as_deref())
    }
}

impl FromStr for Arguments {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut arguments = Arguments::new();
        let mut rest = s.trim();

        while !rest.is_empty() {
            let mut chars = rest.chars();
            let digit = chars
                .next()
                .and_then(|c| c.to_digit(10))
                .ok_or_else(|| Error::InvalidArguments(format!("expected a digit in \"{}\"", s)))?
                as u8;
            if arguments.values.contains_key(&digit) {
                return Err(Error::InvalidArguments(format!(
                    "argument {} given twice",
                    digit
                )));
            }
            rest = &rest[1..];

            let value = if let Some(after_eq) = rest.strip_prefix('=') {
                let quoted = after_eq.strip_prefix('\'').ok_or_else(|| {
                    Error::InvalidArguments(format!("value of argument {} must be quoted", digit))
                })?;
                let end = quoted.find('\'').ok_or_else(|| {
                    Error::InvalidArguments(format!("unterminated value for argument {}", digit))
                })?;
                let value = &quoted[..end];
                rest = &quoted[end + 1..];
                Some(value.to_string())
            } else {
                None
            };
            arguments.values.insert(digit, value);

            if let Some(next) = rest.strip_prefix(',') {
                if next.is_empty() {
                    return Err(Error::InvalidArguments("trailing comma".into()));
                }
                rest = next;
            } else if !rest.is_empty() {
                return Err(Error::InvalidArguments(format!(
                    "unexpected \"{}\" after argument {}",
                    rest, digit
                )));
            }
        }

        Ok(arguments)
    }
}

/// What a Create carries
#[derive(Debug, Clone, PartialEq)]
pub enum CreateContent {
    /// Resources of one new instance whose id the device chooses
    Resources(Vec<ResourceNode>),
    /// Fully identified instances
    Instances(Vec<InstanceNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    object_id: u16,
    content: CreateContent,
    content_format: Option<ContentFormat>,
}

impl CreateRequest {
    /// Create one instance, letting the device pick its id
    pub fn new(object_id: u16, resources: Vec<ResourceNode>) -> Self {
        Self {
            object_id,
            content: CreateContent::Resources(resources),
            content_format: None,
        }
    }

    /// Create instances with explicit ids
    pub fn with_instances(object_id: u16, instances: Vec<InstanceNode>) -> Result<Self> {
        if instances.is_empty() {
            return Err(Error::InvalidRequest(
                "create request needs at least one instance".into(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for instance in &instances {
            if !seen.insert(instance.id) {
                return Err(Error::InvalidRequest(format!(
                    "instance {} given twice",
                    instance.id
                )));
            }
        }
        Ok(Self {
            object_id,
            content: CreateContent::Instances(instances),
            content_format: None,
        })
    }

    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.content_format = Some(format);
        self
    }

    pub fn path(&self) -> Path {
        Path::Object(self.object_id)
    }

    pub fn content(&self) -> &CreateContent {
        &self.content
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format
    }

    pub fn unknown_object_instance_id(&self) -> bool {
        matches!(self.content, CreateContent::Resources(_))
    }
}

/// Read, Observe, Discover, Bootstrap-Read, Bootstrap-Discover and
/// Bootstrap-Delete are addressed by a path only
macro_rules! path_request {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            path: Path,
            content_format: Option<ContentFormat>,
        }

        impl $name {
            pub fn path(&self) -> Path {
                self.path
            }

            pub fn content_format(&self) -> Option<ContentFormat> {
                self.content_format
            }

            pub fn with_content_format(mut self, format: ContentFormat) -> Self {
                self.content_format = Some(format);
                self
            }
        }
    };
}

path_request!(ReadRequest);
path_request!(ObserveRequest);
path_request!(DiscoverRequest);
path_request!(BootstrapReadRequest);
path_request!(BootstrapDiscoverRequest);
path_request!(
    /// Bootstrap-Delete targets the root, an object or one instance
    BootstrapDeleteRequest
);

impl ReadRequest {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            content_format: None,
        }
    }
}

impl ObserveRequest {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            content_format: None,
        }
    }
}

impl DiscoverRequest {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            content_format: None,
        }
    }
}

impl BootstrapReadRequest {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            content_format: None,
        }
    }
}

impl BootstrapDiscoverRequest {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            content_format: None,
        }
    }
}

impl BootstrapDeleteRequest {
    pub fn new(path: Path) -> Result<Self> {
        if path.depth() > 2 {
            return Err(Error::InvalidRequest(format!(
                "bootstrap delete can not target {}",
                path
            )));
        }
        Ok(Self {
            path,
            content_format: None,
        })
    }
}

/// Write semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite the addressed node completely
    Replace,
    /// Only touch the supplied resources
    Update,
}

/// Node written by a Write, tagged with the depth it addresses
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    Instance {
        object_id: u16,
        node: InstanceNode,
    },
    Resource {
        object_id: u16,
        instance_id: u16,
        node: ResourceNode,
    },
    ResourceInstance {
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        node: ResourceInstanceNode,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    mode: WriteMode,
    target: WriteTarget,
    content_format: Option<ContentFormat>,
}

impl WriteRequest {
    pub fn instance(mode: WriteMode, object_id: u16, node: InstanceNode) -> Self {
        Self {
            mode,
            target: WriteTarget::Instance { object_id, node },
            content_format: None,
        }
    }

    pub fn resource(mode: WriteMode, object_id: u16, instance_id: u16, node: ResourceNode) -> Self {
        Self {
            mode,
            target: WriteTarget::Resource {
                object_id,
                instance_id,
                node,
            },
            content_format: None,
        }
    }

    /// Resource-instance writes are always partial updates
    pub fn resource_instance(
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        node: ResourceInstanceNode,
    ) -> Self {
        Self {
            mode: WriteMode::Update,
            target: WriteTarget::ResourceInstance {
                object_id,
                instance_id,
                resource_id,
                node,
            },
            content_format: None,
        }
    }

    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.content_format = Some(format);
        self
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn is_replace(&self) -> bool {
        self.mode == WriteMode::Replace
    }

    pub fn target(&self) -> &WriteTarget {
        &self.target
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format
    }

    pub fn path(&self) -> Path {
        match &self.target {
            WriteTarget::Instance { object_id, node } => Path::Instance(*object_id, node.id),
            WriteTarget::Resource {
                object_id,
                instance_id,
                node,
            } => Path::Resource(*object_id, *instance_id, node.id),
            WriteTarget::ResourceInstance {
                object_id,
                instance_id,
                resource_id,
                node,
            } => Path::ResourceInstance(*object_id, *instance_id, *resource_id, node.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    path: Path,
}

impl DeleteRequest {
    pub fn new(object_id: u16, instance_id: u16) -> Self {
        Self {
            path: Path::Instance(object_id, instance_id),
        }
    }

    pub fn path(&self) -> Path {
        self.path
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    path: Path,
    arguments: Arguments,
}

impl ExecuteRequest {
    pub fn new(path: Path, arguments: Arguments) -> Self {
        Self { path, arguments }
    }

    /// Build from the textual path and argument payload of a CoAP POST
    pub fn parse(path: &str, arguments: &str) -> Result<Self> {
        Ok(Self {
            path: path.parse()?,
            arguments: arguments.parse()?,
        })
    }

    pub fn path(&self) -> Path {
        self.path
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }
}

/// Node written by a Bootstrap-Write, tagged with the depth it addresses
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapWriteTarget {
    Object(ObjectNode),
    Instance {
        object_id: u16,
        node: InstanceNode,
    },
    Resource {
        object_id: u16,
        instance_id: u16,
        node: ResourceNode,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapWriteRequest {
    target: BootstrapWriteTarget,
    content_format: Option<ContentFormat>,
}

impl BootstrapWriteRequest {
    pub fn object(node: ObjectNode) -> Self {
        Self {
            target: BootstrapWriteTarget::Object(node),
            content_format: None,
        }
    }

    pub fn instance(object_id: u16, node: InstanceNode) -> Self {
        Self {
            target: BootstrapWriteTarget::Instance { object_id, node },
            content_format: None,
        }
    }

    pub fn resource(object_id: u16, instance_id: u16, node: ResourceNode) -> Self {
        Self {
            target: BootstrapWriteTarget::Resource {
                object_id,
                instance_id,
                node,
            },
            content_format: None,
        }
    }

    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.content_format = Some(format);
        self
    }

    pub fn target(&self) -> &BootstrapWriteTarget {
        &self.target
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format
    }

    pub fn path(&self) -> Path {
        match &self.target {
            BootstrapWriteTarget::Object(node) => Path::Object(node.id),
            BootstrapWriteTarget::Instance { object_id, node } => {
                Path::Instance(*object_id, node.id)
            }
            BootstrapWriteTarget::Resource {
                object_id,
                instance_id,
                node,
            } => Path::Resource(*object_id, *instance_id, node.id),
        }
    }
}
