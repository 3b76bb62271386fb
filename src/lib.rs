//! lwm2m-enabler: device-side LWM2M resource tree
//!
//! This crate holds the object tree of an LWM2M client and answers the
//! operations a server (or the bootstrap server, or the device itself) runs
//! against it. Wire encoding and transport stay outside: requests arrive
//! already decoded into typed nodes, and every operation returns a typed
//! response that maps onto a CoAP response code.
//!
//! # Key Features
//!
//! - **Authorization**: each request is checked against the caller's role
//!   - management servers never see the Security and OSCORE objects
//!   - bootstrap-only operations are refused to management servers and the reverse
//!   - resource operations are checked against the object model (R/W/E)
//!
//! - **Dispatch**: an [`ObjectTree`] routes requests to one [`ObjectEnabler`] per
//!   object, which forwards them to the [`InstanceEnabler`]s it owns
//!
//! - **Change notification**: instance additions, removals and resource changes
//!   are batched per transaction and delivered to [`ObjectListener`]s, on the
//!   calling thread, once its outermost transaction ends
//!
//! - **Bootstrap**: Bootstrap-Write creates or replaces, Bootstrap-Delete keeps
//!   the bootstrap-server account and its OSCORE context
//!
//! # Example
//!
//! ```no_run
//! use lwm2m_enabler::{
//!     ids, LwM2mModel, ObjectEnabler, ObjectTree, Path, Peer, ReadRequest,
//!     SimpleInstanceEnabler,
//! };
//!
//! let model = LwM2mModel::core_objects();
//! let device_model = model.object(ids::DEVICE).cloned().unwrap();
//! let tree = ObjectTree::new([ObjectEnabler::new(
//!     device_model,
//!     vec![Box::new(SimpleInstanceEnabler::new(ids::DEVICE, 0))],
//!     SimpleInstanceEnabler::factory(),
//! )]);
//!
//! let response = tree.read(
//!     &Peer::management(101),
//!     &ReadRequest::new(Path::Instance(ids::DEVICE, 0)),
//! );
//! println!("{}", response.code());
//! ```

mod error;
mod instance;
mod instance_store;
mod link_format;
pub mod model;
mod node;
mod object_enabler;
mod object_tree;
mod path;
mod peer;
mod request;
mod response;
pub mod send;
pub mod servers_info;
mod transaction;

pub use error::{Error, Result};
pub use instance::{
    InstanceEnabler, InstanceEnablerFactory, ResourceChangeListener, SimpleInstanceEnabler,
};
pub use link_format::{to_link_format, DefaultLinkFormatHelper, Link, LinkFormatHelper};
pub use model::{ids, LwM2mModel, ObjectModel, Operations, ResourceModel, ResourceType};
pub use node::{
    InstanceNode, Node, ObjectNode, ResourceContent, ResourceInstanceNode, ResourceNode, Value,
};
pub use object_enabler::ObjectEnabler;
pub use object_tree::ObjectTree;
pub use path::Path;
pub use peer::{Peer, PeerRole};
pub use request::{
    Arguments, BootstrapDeleteRequest, BootstrapDiscoverRequest, BootstrapReadRequest,
    BootstrapWriteRequest, BootstrapWriteTarget, ContentFormat, CreateContent, CreateRequest,
    DeleteRequest, DiscoverRequest, ExecuteRequest, ObserveRequest, ReadRequest, WriteMode,
    WriteRequest, WriteTarget,
};
pub use response::{
    BootstrapDeleteResponse, BootstrapDiscoverResponse, BootstrapReadResponse,
    BootstrapWriteResponse, CreateResponse, DeleteResponse, DiscoverResponse, ExecuteResponse,
    ObserveResponse, ReadResponse, Response, ResponseCode, WriteResponse,
};
pub use send::extract_prefix;
pub use transaction::{ChangeSet, ObjectListener, TransactionalListener};
