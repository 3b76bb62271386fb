//! Instance behavior contract
//!
//! An object enabler never knows what an instance stores or computes. It only
//! talks to the [`InstanceEnabler`] trait; business logic plugs in behind it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::model::ObjectModel;
use crate::node::{InstanceNode, Node, ResourceContent, ResourceInstanceNode, ResourceNode};
use crate::path::Path;
use crate::peer::Peer;
use crate::request::Arguments;
use crate::response::{ExecuteResponse, ObserveResponse, ReadResponse, Response, WriteResponse};

/// Callback an instance uses to report changed resources to its object
#[derive(Clone)]
pub struct ResourceChangeListener {
    callback: Arc<dyn Fn(&[Path]) + Send + Sync>,
}

impl ResourceChangeListener {
    pub fn new(callback: impl Fn(&[Path]) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn resources_changed(&self, paths: &[Path]) {
        (self.callback)(paths)
    }
}

impl fmt::Debug for ResourceChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResourceChangeListener")
    }
}

/// Behavior of one object instance
///
/// Only the resource-level primitives are required. Instance-level reads and
/// writes, resource-instance access and observation have default implementations
/// built on top of them. Lifecycle hooks default to no-ops.
pub trait InstanceEnabler: Send {
    fn id(&self) -> u16;

    /// Register the listener changes must be reported to
    fn set_resource_listener(&mut self, listener: ResourceChangeListener);

    fn read_resource(&self, peer: &Peer, resource_id: u16) -> ReadResponse;

    /// Write one resource; `replace` overwrites every resource instance of a
    /// multiple resource, otherwise supplied instances are merged
    fn write_resource(&mut self, peer: &Peer, replace: bool, node: &ResourceNode) -> WriteResponse;

    /// Clear a resource not supplied by a full Replace
    fn reset(&mut self, _resource_id: u16) {}

    /// Resource ids currently present, used by Discover
    fn available_resource_ids(&self, model: &ObjectModel) -> Vec<u16> {
        model.resource_ids()
    }

    /// Every readable resource of the instance; a system peer sees them all
    fn read(&self, peer: &Peer, model: &ObjectModel) -> ReadResponse {
        let resources = model
            .resources
            .values()
            .filter(|r| peer.is_system() || r.operations.is_readable())
            .filter_map(|r| match self.read_resource(peer, r.id).into_content() {
                Some(Node::Resource(node)) => Some(node),
                _ => None,
            });
        Response::content(Node::Instance(InstanceNode::new(self.id(), resources)))
    }

    fn read_resource_instance(
        &self,
        peer: &Peer,
        resource_id: u16,
        resource_instance_id: u16,
    ) -> ReadResponse {
        let response = self.read_resource(peer, resource_id);
        if !response.is_success() {
            return response;
        }
        match response.into_content() {
            Some(Node::Resource(resource)) => match resource.instance(resource_instance_id) {
                Some(value) => Response::content(Node::ResourceInstance(ResourceInstanceNode::new(
                    resource_instance_id,
                    value.clone(),
                ))),
                None => Response::not_found(),
            },
            _ => Response::not_found(),
        }
    }

    /// Write a whole instance
    ///
    /// In replace mode every resource of the model the peer may write is either
    /// written or reset. Resources unknown to the model are always updated.
    ///
    /// The first failing resource write is returned as is. Resources visited
    /// before it stay written or reset, so a failed replace can leave the
    /// instance partly replaced.
    fn write(
        &mut self,
        peer: &Peer,
        replace: bool,
        node: &InstanceNode,
        model: &ObjectModel,
    ) -> WriteResponse {
        let mut remaining: BTreeMap<u16, &ResourceNode> =
            node.resources.iter().map(|(id, r)| (*id, r)).collect();

        if replace {
            for resource_model in model.resources.values() {
                if peer.is_management() && !resource_model.operations.is_writable() {
                    continue;
                }
                match remaining.remove(&resource_model.id) {
                    Some(resource) => {
                        let response = self.write_resource(peer, true, resource);
                        if !response.is_success() {
                            return response;
                        }
                    }
                    None => self.reset(resource_model.id),
                }
            }
        }

        for resource in remaining.values() {
            let response = self.write_resource(peer, false, resource);
            if !response.is_success() {
                return response;
            }
        }
        Response::changed()
    }

    /// A resource-instance write is an update of a one-instance multiple resource
    fn write_resource_instance(
        &mut self,
        peer: &Peer,
        resource_id: u16,
        node: &ResourceInstanceNode,
    ) -> WriteResponse {
        let resource = ResourceNode::multiple(resource_id, [(node.id, node.value.clone())]);
        self.write_resource(peer, false, &resource)
    }

    fn execute(&mut self, _peer: &Peer, _resource_id: u16, _arguments: &Arguments) -> ExecuteResponse {
        Response::not_found()
    }

    fn observe(&self, peer: &Peer, model: &ObjectModel) -> ObserveResponse {
        self.read(peer, model)
    }

    fn observe_resource(&self, peer: &Peer, resource_id: u16) -> ObserveResponse {
        self.read_resource(peer, resource_id)
    }

    fn observe_resource_instance(
        &self,
        peer: &Peer,
        resource_id: u16,
        resource_instance_id: u16,
    ) -> ObserveResponse {
        self.read_resource_instance(peer, resource_id, resource_instance_id)
    }

    /// Called once the instance has been removed by a Delete
    fn on_delete(&mut self, _peer: &Peer) {}

    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn destroy(&mut self) {
        self.stop();
    }
}

/// Builds the instances an object creates on demand
pub trait InstanceEnablerFactory: Send + Sync {
    fn create(&self, model: &ObjectModel, instance_id: u16) -> Box<dyn InstanceEnabler>;
}

impl<F> InstanceEnablerFactory for F
where
    F: Fn(&ObjectModel, u16) -> Box<dyn InstanceEnabler> + Send + Sync,
{
    fn create(&self, model: &ObjectModel, instance_id: u16) -> Box<dyn InstanceEnabler> {
        self(model, instance_id)
    }
}

type ExecuteHandler = Box<dyn FnMut(&Arguments) -> ExecuteResponse + Send>;

/// Instance keeping its resources in memory
///
/// Any written value is stored as is. A change is reported only when a stored
/// value actually differs from the previous one.
pub struct SimpleInstanceEnabler {
    object_id: u16,
    id: u16,
    resources: BTreeMap<u16, ResourceNode>,
    execute_handlers: BTreeMap<u16, ExecuteHandler>,
    listener: Option<ResourceChangeListener>,
}

impl SimpleInstanceEnabler {
    pub fn new(object_id: u16, id: u16) -> Self {
        Self {
            object_id,
            id,
            resources: BTreeMap::new(),
            execute_handlers: BTreeMap::new(),
            listener: None,
        }
    }

    /// Factory creating empty instances, filled by the Create payload
    pub fn factory() -> impl InstanceEnablerFactory {
        |model: &ObjectModel, instance_id: u16| -> Box<dyn InstanceEnabler> {
            Box::new(SimpleInstanceEnabler::new(model.id, instance_id))
        }
    }

    pub fn with_resource(mut self, node: ResourceNode) -> Self {
        self.resources.insert(node.id, node);
        self
    }

    pub fn with_execute_handler(
        mut self,
        resource_id: u16,
        handler: impl FnMut(&Arguments) -> ExecuteResponse + Send + 'static,
    ) -> Self {
        self.execute_handlers.insert(resource_id, Box::new(handler));
        self
    }

    pub fn resource(&self, resource_id: u16) -> Option<&ResourceNode> {
        self.resources.get(&resource_id)
    }

    /// Local update, e.g. a new sensor value
    pub fn set_resource(&mut self, node: ResourceNode) {
        let resource_id = node.id;
        if self.resources.get(&resource_id) != Some(&node) {
            self.resources.insert(resource_id, node);
            self.fire(resource_id);
        }
    }

    fn fire(&self, resource_id: u16) {
        if let Some(listener) = &self.listener {
            listener.resources_changed(&[Path::Resource(self.object_id, self.id, resource_id)]);
        }
    }
}

impl InstanceEnabler for SimpleInstanceEnabler {
    fn id(&self) -> u16 {
        self.id
    }

    fn set_resource_listener(&mut self, listener: ResourceChangeListener) {
        self.listener = Some(listener);
    }

    fn read_resource(&self, _peer: &Peer, resource_id: u16) -> ReadResponse {
        match self.resources.get(&resource_id) {
            Some(resource) => Response::content(Node::Resource(resource.clone())),
            None => Response::not_found(),
        }
    }

    fn write_resource(&mut self, _peer: &Peer, replace: bool, node: &ResourceNode) -> WriteResponse {
        let merged = match (&node.content, self.resources.get(&node.id)) {
            (ResourceContent::Multiple(values), Some(existing)) if !replace => {
                match &existing.content {
                    ResourceContent::Multiple(current) => {
                        let mut current = current.clone();
                        current.extend(values.iter().map(|(id, v)| (*id, v.clone())));
                        ResourceNode::multiple(node.id, current)
                    }
                    ResourceContent::Single(_) => node.clone(),
                }
            }
            _ => node.clone(),
        };
        self.set_resource(merged);
        Response::changed()
    }

    fn reset(&mut self, resource_id: u16) {
        if self.resources.remove(&resource_id).is_some() {
            self.fire(resource_id);
        }
    }

    fn available_resource_ids(&self, _model: &ObjectModel) -> Vec<u16> {
        self.resources.keys().copied().collect()
    }

    fn execute(&mut self, _peer: &Peer, resource_id: u16, arguments: &Arguments) -> ExecuteResponse {
        match self.execute_handlers.get_mut(&resource_id) {
            Some(handler) => handler(arguments),
            None => Response::not_found(),
        }
    }
}
