//! Instances of one object and the fan-out of operations over them
//!
//! The store trusts its caller: authorization and schema checks happen in
//! [`ObjectEnabler`](crate::object_enabler::ObjectEnabler) before anything gets
//! here. What remains are the rules tied to the instance map itself, like
//! instance id allocation and the bootstrap accounts surviving a Bootstrap-Delete.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::instance::{InstanceEnabler, InstanceEnablerFactory, ResourceChangeListener};
use crate::model::{ids, ObjectModel};
use crate::node::{InstanceNode, Node, ObjectNode, ResourceNode};
use crate::path::Path;
use crate::peer::Peer;
use crate::request::{
    BootstrapWriteRequest, BootstrapWriteTarget, CreateContent, CreateRequest, ExecuteRequest,
    WriteRequest, WriteTarget,
};
use crate::response::{
    BootstrapDeleteResponse, BootstrapWriteResponse, CreateResponse, DeleteResponse,
    ExecuteResponse, ObserveResponse, ReadResponse, Response, ResponseCode, WriteResponse,
};
use crate::servers_info;
use crate::transaction::TransactionalListener;

pub struct InstanceStore {
    model: Arc<ObjectModel>,
    instances: BTreeMap<u16, Box<dyn InstanceEnabler>>,
    factory: Box<dyn InstanceEnablerFactory>,
    notifier: Arc<TransactionalListener>,
}

impl InstanceStore {
    pub fn new(
        model: Arc<ObjectModel>,
        instances: Vec<Box<dyn InstanceEnabler>>,
        factory: Box<dyn InstanceEnablerFactory>,
        notifier: Arc<TransactionalListener>,
    ) -> Self {
        let mut store = Self {
            model,
            instances: BTreeMap::new(),
            factory,
            notifier,
        };
        for mut instance in instances {
            let instance_id = instance.id();
            store.listen(instance.as_mut(), instance_id);
            store.instances.insert(instance_id, instance);
        }
        store
    }

    fn object_id(&self) -> u16 {
        self.model.id
    }

    pub fn available_instance_ids(&self) -> Vec<u16> {
        self.instances.keys().copied().collect()
    }

    pub fn available_resource_ids(&self, instance_id: u16) -> Vec<u16> {
        self.instances
            .get(&instance_id)
            .map(|instance| instance.available_resource_ids(&self.model))
            .unwrap_or_default()
    }

    pub fn contains(&self, instance_id: u16) -> bool {
        self.instances.contains_key(&instance_id)
    }

    /// Add an instance built outside of a Create, replacing any previous one
    pub fn insert(&mut self, mut instance: Box<dyn InstanceEnabler>) {
        let instance_id = instance.id();
        self.listen(instance.as_mut(), instance_id);
        if self.instances.insert(instance_id, instance).is_some() {
            log::warn!(
                "Object {}: instance {} replaced by a new one",
                self.object_id(),
                instance_id
            );
        }
        self.notifier.instances_added(&[instance_id]);
    }

    pub fn remove(&mut self, instance_id: u16) -> Option<Box<dyn InstanceEnabler>> {
        let removed = self.instances.remove(&instance_id)?;
        self.notifier.instances_removed(&[instance_id]);
        Some(removed)
    }

    /// Forward the changes an instance reports, dropping paths outside of it
    fn listen(&self, instance: &mut dyn InstanceEnabler, instance_id: u16) {
        let notifier = Arc::clone(&self.notifier);
        let object_id = self.object_id();
        instance.set_resource_listener(ResourceChangeListener::new(move |paths: &[Path]| {
            let valid: Vec<Path> = paths
                .iter()
                .filter(|path| {
                    let owned = (path.is_resource() || path.is_resource_instance())
                        && path.object_id() == Some(object_id)
                        && path.object_instance_id() == Some(instance_id);
                    if !owned {
                        log::warn!(
                            "Instance {} of object {} raised a change of {} which does not belong to it",
                            instance_id,
                            object_id,
                            path
                        );
                    }
                    owned
                })
                .copied()
                .collect();
            notifier.resources_changed(&valid);
        }));
    }

    fn new_instance<'a>(
        &self,
        peer: &Peer,
        instance_id: u16,
        resources: impl IntoIterator<Item = &'a ResourceNode>,
    ) -> Box<dyn InstanceEnabler> {
        let mut instance = self.factory.create(&self.model, instance_id);
        for resource in resources {
            let response = instance.write_resource(peer, true, resource);
            if !response.is_success() {
                log::debug!(
                    "Object {}: initial write of resource {} on instance {} failed: {}",
                    self.object_id(),
                    resource.id,
                    instance_id,
                    response.code()
                );
            }
        }
        instance
    }

    pub fn create(&mut self, peer: &Peer, request: &CreateRequest) -> CreateResponse {
        match request.content() {
            CreateContent::Resources(resources) => {
                if !self.model.multiple && !self.instances.is_empty() {
                    return Response::bad_request(
                        "an instance already exist for this single instance object",
                    );
                }
                let instance_id = if self.model.multiple {
                    match (0..=u16::MAX).find(|id| !self.instances.contains_key(id)) {
                        Some(id) => id,
                        None => return Response::bad_request("no free instance id left"),
                    }
                } else {
                    0
                };

                let mut instance = self.new_instance(peer, instance_id, resources);
                self.listen(instance.as_mut(), instance_id);
                self.instances.insert(instance_id, instance);
                log::info!("Object {}: instance {} created", self.object_id(), instance_id);
                self.notifier.instances_added(&[instance_id]);

                Response::created(Some(Path::Instance(self.object_id(), instance_id)))
            }
            CreateContent::Instances(instances) => self.create_instances(peer, instances),
        }
    }

    fn create_instances(&mut self, peer: &Peer, nodes: &[InstanceNode]) -> CreateResponse {
        if !self.model.multiple {
            if !self.instances.is_empty() {
                return Response::bad_request(
                    "an instance already exist for this single instance object",
                );
            }
            if nodes.len() > 1 {
                return Response::bad_request(
                    "can not create several instances on this single instance object",
                );
            }
            if nodes.first().is_some_and(|node| node.id != 0) {
                return Response::bad_request("single instance object must use 0 as ID");
            }
        }
        if let Some(existing) = nodes.iter().find(|node| self.instances.contains_key(&node.id)) {
            return Response::bad_request(format!("instance {} already exists", existing.id));
        }

        let mut instance_ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut instance = self.new_instance(peer, node.id, node.resources.values());
            self.listen(instance.as_mut(), node.id);
            self.instances.insert(node.id, instance);
            instance_ids.push(node.id);
        }
        log::info!(
            "Object {}: instances {:?} created",
            self.object_id(),
            instance_ids
        );
        self.notifier.instances_added(&instance_ids);

        Response::created(None)
    }

    pub fn read(&self, peer: &Peer, path: Path) -> ReadResponse {
        self.read_or_observe(peer, path, false)
    }

    pub fn observe(&self, peer: &Peer, path: Path) -> ObserveResponse {
        self.read_or_observe(peer, path, true)
    }

    fn read_or_observe(&self, peer: &Peer, path: Path, observe: bool) -> ReadResponse {
        let model = self.model.as_ref();
        match path {
            Path::Object(_) => {
                let instances = self.instances.values().filter_map(|instance| {
                    let response = if observe {
                        instance.observe(peer, model)
                    } else {
                        instance.read(peer, model)
                    };
                    match response.into_content() {
                        Some(Node::Instance(node)) => Some(node),
                        _ => None,
                    }
                });
                Response::content(Node::Object(ObjectNode::new(self.object_id(), instances)))
            }
            Path::Instance(_, instance_id) => match self.instances.get(&instance_id) {
                Some(instance) if observe => instance.observe(peer, model),
                Some(instance) => instance.read(peer, model),
                None => Response::not_found(),
            },
            Path::Resource(_, instance_id, resource_id) => match self.instances.get(&instance_id) {
                Some(instance) if observe => instance.observe_resource(peer, resource_id),
                Some(instance) => instance.read_resource(peer, resource_id),
                None => Response::not_found(),
            },
            Path::ResourceInstance(_, instance_id, resource_id, resource_instance_id) => {
                match self.instances.get(&instance_id) {
                    Some(instance) if observe => {
                        instance.observe_resource_instance(peer, resource_id, resource_instance_id)
                    }
                    Some(instance) => {
                        instance.read_resource_instance(peer, resource_id, resource_instance_id)
                    }
                    None => Response::not_found(),
                }
            }
            Path::Root => Response::bad_request("invalid path /"),
        }
    }

    pub fn write(&mut self, peer: &Peer, request: &WriteRequest) -> WriteResponse {
        let replace = request.is_replace();
        match request.target() {
            WriteTarget::Instance { node, .. } => match self.instances.get_mut(&node.id) {
                Some(instance) => instance.write(peer, replace, node, &self.model),
                None => Response::not_found(),
            },
            WriteTarget::Resource {
                instance_id, node, ..
            } => match self.instances.get_mut(instance_id) {
                Some(instance) => instance.write_resource(peer, replace, node),
                None => Response::not_found(),
            },
            WriteTarget::ResourceInstance {
                instance_id,
                resource_id,
                node,
                ..
            } => match self.instances.get_mut(instance_id) {
                Some(instance) => instance.write_resource_instance(peer, *resource_id, node),
                None => Response::not_found(),
            },
        }
    }

    pub fn execute(&mut self, peer: &Peer, request: &ExecuteRequest) -> ExecuteResponse {
        let path = request.path();
        let (Some(instance_id), Some(resource_id)) = (path.object_instance_id(), path.resource_id())
        else {
            return Response::bad_request(format!("{} is not executable", path));
        };
        match self.instances.get_mut(&instance_id) {
            Some(instance) => instance.execute(peer, resource_id, request.arguments()),
            None => Response::not_found(),
        }
    }

    pub fn delete(&mut self, peer: &Peer, instance_id: u16) -> DeleteResponse {
        match self.instances.remove(&instance_id) {
            Some(mut instance) => {
                instance.on_delete(peer);
                log::info!("Object {}: instance {} deleted", self.object_id(), instance_id);
                self.notifier.instances_removed(&[instance_id]);
                Response::deleted()
            }
            None => Response::not_found(),
        }
    }

    /// Bootstrap-Delete on the root, this object or one of its instances
    ///
    /// `bootstrap_oscore` is the OSCORE instance linked to the bootstrap-server
    /// account; only the OSCORE object uses it.
    pub fn bootstrap_delete(
        &mut self,
        peer: &Peer,
        path: Path,
        bootstrap_oscore: Option<u16>,
    ) -> BootstrapDeleteResponse {
        match path {
            Path::Root | Path::Object(_) => {
                let kept = match self.object_id() {
                    ids::SECURITY => self.bootstrap_account(),
                    ids::OSCORE => bootstrap_oscore,
                    _ => None,
                };
                let removed: Vec<u16> = self
                    .instances
                    .keys()
                    .copied()
                    .filter(|id| Some(*id) != kept)
                    .collect();
                for instance_id in &removed {
                    if let Some(mut instance) = self.instances.remove(instance_id) {
                        instance.on_delete(peer);
                    }
                }
                if let Some(instance_id) = kept.filter(|id| self.instances.contains_key(id)) {
                    log::info!(
                        "Object {}: instance {} kept for the bootstrap server",
                        self.object_id(),
                        instance_id
                    );
                }
                self.notifier.instances_removed(&removed);
                Response::deleted()
            }
            Path::Instance(_, instance_id) => {
                let Some(instance) = self.instances.get(&instance_id) else {
                    return Response::bad_request(format!("Instance {} not found", path));
                };
                match self.object_id() {
                    ids::SECURITY if servers_info::is_bootstrap_server(instance.as_ref()) => {
                        return Response::bad_request("bootstrap server can not be deleted");
                    }
                    ids::OSCORE if bootstrap_oscore == Some(instance_id) => {
                        return Response::bad_request(
                            "OSCORE instance linked to bootstrap server can not be deleted",
                        );
                    }
                    _ => {}
                }
                if let Some(mut instance) = self.instances.remove(&instance_id) {
                    instance.on_delete(peer);
                }
                self.notifier.instances_removed(&[instance_id]);
                Response::deleted()
            }
            _ => Response::bad_request(format!("unexpected path {}", path)),
        }
    }

    /// Id of the Security instance holding the bootstrap-server account
    fn bootstrap_account(&self) -> Option<u16> {
        self.instances.iter().find_map(|(id, instance)| {
            servers_info::is_bootstrap_server(instance.as_ref()).then_some(*id)
        })
    }

    /// Bootstrap-Write: create what is missing, replace what exists
    ///
    /// Failures of the underlying create or write are logged, never reported.
    pub fn bootstrap_write(
        &mut self,
        peer: &Peer,
        request: &BootstrapWriteRequest,
    ) -> BootstrapWriteResponse {
        match request.target() {
            BootstrapWriteTarget::Object(object) => {
                for node in object.instances.values() {
                    self.create_or_replace(peer, node);
                }
            }
            BootstrapWriteTarget::Instance { node, .. } => self.create_or_replace(peer, node),
            BootstrapWriteTarget::Resource {
                instance_id, node, ..
            } => match self.instances.get_mut(instance_id) {
                Some(instance) => {
                    let response = instance.write_resource(peer, true, node);
                    self.log_bootstrap_failure(response.code(), request.path());
                }
                None => {
                    let created = InstanceNode::new(*instance_id, [node.clone()]);
                    self.create_or_replace(peer, &created);
                }
            },
        }
        Response::changed()
    }

    fn create_or_replace(&mut self, peer: &Peer, node: &InstanceNode) {
        let path = Path::Instance(self.object_id(), node.id);
        let code = match self.instances.get_mut(&node.id) {
            Some(instance) => instance.write(peer, true, node, &self.model).code(),
            None => {
                // synthesized Create, nested in the caller's transaction
                self.notifier.begin_transaction();
                let code = self.create_instances(peer, std::slice::from_ref(node)).code();
                if let Some(changes) = self.notifier.end_transaction() {
                    self.notifier.fire(&changes);
                }
                code
            }
        };
        self.log_bootstrap_failure(code, path);
    }

    fn log_bootstrap_failure(&self, code: ResponseCode, path: Path) {
        if code.is_error() {
            log::debug!("Bootstrap write on {} ignored: {}", path, code);
        }
    }

    pub fn start(&mut self) {
        for instance in self.instances.values_mut() {
            instance.start();
        }
    }

    pub fn stop(&mut self) {
        for instance in self.instances.values_mut() {
            instance.stop();
        }
    }

    pub fn destroy(&mut self) {
        for instance in self.instances.values_mut() {
            instance.destroy();
        }
    }
}
