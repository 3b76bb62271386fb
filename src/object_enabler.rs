//! Authorization and dispatch for one object
//!
//! Every operation goes through the same gate: mode of the peer, protected
//! objects, mandatory resources, schema permissions. Only then does it reach the
//! [`InstanceStore`]. Mutating operations hold the store lock for their whole
//! transaction, so concurrent callers are serialized; each caller's changes are
//! delivered on its own thread once the lock has been released.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use crate::instance::{InstanceEnabler, InstanceEnablerFactory};
use crate::instance_store::InstanceStore;
use crate::link_format::{DefaultLinkFormatHelper, LinkFormatHelper};
use crate::model::{ids, ObjectModel, Operations};
use crate::path::Path;
use crate::peer::Peer;
use crate::request::{
    BootstrapDeleteRequest, BootstrapDiscoverRequest, BootstrapReadRequest,
    BootstrapWriteRequest, ContentFormat, CreateContent, CreateRequest, DeleteRequest,
    DiscoverRequest, ExecuteRequest, ObserveRequest, ReadRequest, WriteRequest, WriteTarget,
};
use crate::response::{
    BootstrapDeleteResponse, BootstrapDiscoverResponse, BootstrapReadResponse,
    BootstrapWriteResponse, CreateResponse, DeleteResponse, DiscoverResponse, ExecuteResponse,
    ObserveResponse, ReadResponse, Response, WriteResponse,
};
use crate::servers_info;
use crate::transaction::{ObjectListener, TransactionalListener};

const MANDATORY_MISSING: &str = "mandatory writable resources missing!";
const NOT_MULTIPLE: &str = "invalid path : resource is not multiple";

pub struct ObjectEnabler {
    model: Arc<ObjectModel>,
    store: Mutex<InstanceStore>,
    notifier: Arc<TransactionalListener>,
    link_format: Box<dyn LinkFormatHelper>,
    default_content_format: ContentFormat,
    /// Security object, consulted by the OSCORE object on Bootstrap-Delete
    security: RwLock<Weak<ObjectEnabler>>,
}

impl ObjectEnabler {
    pub fn new(
        model: ObjectModel,
        instances: Vec<Box<dyn InstanceEnabler>>,
        factory: impl InstanceEnablerFactory + 'static,
    ) -> Self {
        let model = Arc::new(model);
        let notifier = Arc::new(TransactionalListener::new(model.id));
        let store = InstanceStore::new(
            Arc::clone(&model),
            instances,
            Box::new(factory),
            Arc::clone(&notifier),
        );
        Self {
            model,
            store: Mutex::new(store),
            notifier,
            link_format: Box::new(DefaultLinkFormatHelper),
            default_content_format: ContentFormat::SenmlCbor,
            security: RwLock::new(Weak::new()),
        }
    }

    pub fn with_link_format(mut self, helper: impl LinkFormatHelper + 'static) -> Self {
        self.link_format = Box::new(helper);
        self
    }

    pub fn with_default_content_format(mut self, format: ContentFormat) -> Self {
        self.default_content_format = format;
        self
    }

    /// Let this object look up the bootstrap-server account in `security`
    ///
    /// A later call replaces the previous link.
    pub fn link_security_object(&self, security: &Arc<ObjectEnabler>) {
        let link = Arc::downgrade(security);
        match self.security.write() {
            Ok(mut guard) => *guard = link,
            Err(poisoned) => *poisoned.into_inner() = link,
        }
    }

    pub fn id(&self) -> u16 {
        self.model.id
    }

    pub fn model(&self) -> &ObjectModel {
        &self.model
    }

    pub fn default_content_format(&self) -> ContentFormat {
        self.default_content_format
    }

    pub fn add_listener(&self, listener: Arc<dyn ObjectListener>) {
        self.notifier.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ObjectListener>) {
        self.notifier.remove_listener(listener);
    }

    fn lock_store(&self) -> MutexGuard<'_, InstanceStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    "Instance store lock of object {} was poisoned, recovering",
                    self.id()
                );
                poisoned.into_inner()
            }
        }
    }

    /// Run `op` on the locked store inside a transaction
    ///
    /// The lock is held from begin to end of the transaction. What `op` changed
    /// is delivered after the lock is released.
    fn in_transaction<R>(&self, op: impl FnOnce(&mut InstanceStore) -> R) -> R {
        let (result, changes) = {
            let mut store = self.lock_store();
            self.notifier.begin_transaction();
            let result = op(&mut store);
            (result, self.notifier.end_transaction())
        };
        if let Some(changes) = changes {
            self.notifier.fire(&changes);
        }
        result
    }

    fn is_protected(&self) -> bool {
        self.id() == ids::SECURITY || self.id() == ids::OSCORE
    }

    /// Mandatory resources missing from `supplied`
    ///
    /// Security and OSCORE resources are never writable by a peer, so every
    /// mandatory one counts there.
    fn missing_mandatory(&self, supplied: impl IntoIterator<Item = u16>) -> bool {
        let supplied: Vec<u16> = supplied.into_iter().collect();
        self.model.resources.values().any(|r| {
            r.mandatory
                && (self.is_protected() || r.operations.is_writable())
                && !supplied.contains(&r.id)
        })
    }

    /// Schema check of a resource or resource-instance path
    fn check_resource<T>(
        &self,
        path: Path,
        permitted: impl Fn(&Operations) -> bool,
    ) -> Option<Response<T>> {
        let resource_id = path.resource_id()?;
        match self.model.resource(resource_id) {
            None => Some(Response::not_found()),
            Some(resource) if !permitted(&resource.operations) => {
                Some(Response::method_not_allowed())
            }
            Some(resource) if path.is_resource_instance() && !resource.multiple => {
                Some(Response::bad_request(NOT_MULTIPLE))
            }
            Some(_) => None,
        }
    }

    fn reject<T>(&self, operation: &str, path: Path, response: Response<T>) -> Response<T> {
        log::debug!(
            "{} on {} rejected: {}",
            operation,
            path,
            response.code()
        );
        response
    }

    pub fn available_instance_ids(&self) -> Vec<u16> {
        self.lock_store().available_instance_ids()
    }

    pub fn available_resource_ids(&self, instance_id: u16) -> Vec<u16> {
        self.lock_store().available_resource_ids(instance_id)
    }

    /// Add an instance from the device side
    pub fn add_instance(&self, instance: Box<dyn InstanceEnabler>) {
        self.in_transaction(|store| store.insert(instance))
    }

    pub fn remove_instance(&self, instance_id: u16) -> Option<Box<dyn InstanceEnabler>> {
        self.in_transaction(|store| store.remove(instance_id))
    }

    pub fn create(&self, peer: &Peer, request: &CreateRequest) -> CreateResponse {
        let path = request.path();
        if peer.is_bootstrap() {
            return self.reject("Create", path, Response::method_not_allowed());
        }
        if !peer.is_system() && self.is_protected() {
            return self.reject("Create", path, Response::not_found());
        }

        let missing = match request.content() {
            CreateContent::Resources(resources) => {
                self.missing_mandatory(resources.iter().map(|r| r.id))
            }
            CreateContent::Instances(instances) => instances
                .iter()
                .any(|i| self.missing_mandatory(i.resources.keys().copied())),
        };
        if missing {
            return self.reject("Create", path, Response::bad_request(MANDATORY_MISSING));
        }

        self.in_transaction(|store| store.create(peer, request))
    }

    pub fn read(&self, peer: &Peer, request: &ReadRequest) -> ReadResponse {
        let path = request.path();
        if peer.is_bootstrap() {
            return self.reject("Read", path, Response::method_not_allowed());
        }
        if !peer.is_system() {
            if self.is_protected() {
                return self.reject("Read", path, Response::not_found());
            }
            if let Some(rejected) = self.check_resource(path, Operations::is_readable) {
                return self.reject("Read", path, rejected);
            }
        }
        self.lock_store().read(peer, path)
    }

    pub fn observe(&self, peer: &Peer, request: &ObserveRequest) -> ObserveResponse {
        let path = request.path();
        if peer.is_bootstrap() {
            return self.reject("Observe", path, Response::method_not_allowed());
        }
        if !peer.is_system() {
            if self.is_protected() {
                return self.reject("Observe", path, Response::not_found());
            }
            if let Some(rejected) = self.check_resource(path, Operations::is_readable) {
                return self.reject("Observe", path, rejected);
            }
        }
        self.lock_store().observe(peer, path)
    }

    pub fn write(&self, peer: &Peer, request: &WriteRequest) -> WriteResponse {
        let path = request.path();
        if peer.is_bootstrap() {
            return self.reject("Write", path, Response::method_not_allowed());
        }
        if !peer.is_system() && self.is_protected() {
            return self.reject("Write", path, Response::not_found());
        }

        match request.target() {
            WriteTarget::Instance { node, .. } => {
                let not_writable = !self.is_protected()
                    && node.resources.keys().any(|id| {
                        self.model
                            .resource(*id)
                            .is_some_and(|r| !r.operations.is_writable())
                    });
                if not_writable {
                    return self.reject("Write", path, Response::method_not_allowed());
                }
                if request.is_replace() && self.missing_mandatory(node.resources.keys().copied())
                {
                    return self.reject("Write", path, Response::bad_request(MANDATORY_MISSING));
                }
            }
            WriteTarget::Resource { .. } | WriteTarget::ResourceInstance { .. } => {
                if !self.is_protected() {
                    if let Some(rejected) = self.check_resource(path, Operations::is_writable) {
                        return self.reject("Write", path, rejected);
                    }
                }
            }
        }

        self.in_transaction(|store| store.write(peer, request))
    }

    pub fn delete(&self, peer: &Peer, request: &DeleteRequest) -> DeleteResponse {
        let path = request.path();
        if !peer.is_system() {
            if peer.is_bootstrap() {
                return self.reject("Delete", path, Response::method_not_allowed());
            }
            if self.is_protected() {
                return self.reject("Delete", path, Response::not_found());
            }
            if self.id() == ids::DEVICE {
                return self.reject("Delete", path, Response::method_not_allowed());
            }
        }
        match path.object_instance_id() {
            Some(instance_id) => self.in_transaction(|store| store.delete(peer, instance_id)),
            None => Response::bad_request(format!("invalid path {}", path)),
        }
    }

    pub fn execute(&self, peer: &Peer, request: &ExecuteRequest) -> ExecuteResponse {
        let path = request.path();
        if peer.is_bootstrap() {
            return self.reject("Execute", path, Response::method_not_allowed());
        }
        if !peer.is_system() && self.is_protected() {
            return self.reject("Execute", path, Response::not_found());
        }
        if !path.is_resource() {
            return self.reject(
                "Execute",
                path,
                Response::bad_request(format!("{} is not a resource path", path)),
            );
        }
        if let Some(rejected) = self.check_resource(path, Operations::is_executable) {
            return self.reject("Execute", path, rejected);
        }

        self.in_transaction(|store| store.execute(peer, request))
    }

    pub fn discover(&self, peer: &Peer, request: &DiscoverRequest) -> DiscoverResponse {
        let path = request.path();
        if peer.is_bootstrap() {
            return self.reject("Discover", path, Response::method_not_allowed());
        }
        if !peer.is_system() && self.is_protected() {
            return self.reject("Discover", path, Response::not_found());
        }

        let store = self.lock_store();
        match path {
            Path::Object(_) => {
                let instances: Vec<(u16, Vec<u16>)> = store
                    .available_instance_ids()
                    .into_iter()
                    .map(|id| (id, store.available_resource_ids(id)))
                    .collect();
                Response::content(self.link_format.object_description(&self.model, &instances))
            }
            Path::Instance(_, instance_id) => {
                if !store.contains(instance_id) {
                    return Response::not_found();
                }
                Response::content(self.link_format.instance_description(
                    &self.model,
                    instance_id,
                    &store.available_resource_ids(instance_id),
                ))
            }
            Path::Resource(_, instance_id, resource_id) => {
                if !store.contains(instance_id)
                    || self.model.resource(resource_id).is_none()
                    || !store
                        .available_resource_ids(instance_id)
                        .contains(&resource_id)
                {
                    return Response::not_found();
                }
                Response::content(vec![self.link_format.resource_description(
                    &self.model,
                    instance_id,
                    resource_id,
                )])
            }
            _ => Response::bad_request(format!("invalid path {}", path)),
        }
    }

    pub fn bootstrap_read(
        &self,
        peer: &Peer,
        request: &BootstrapReadRequest,
    ) -> BootstrapReadResponse {
        let path = request.path();
        if peer.is_management() {
            return self.reject(
                "Bootstrap-Read",
                path,
                Response::internal_server_error("bootstrap read request from LWM2M server"),
            );
        }
        if !peer.is_system()
            && !matches!(path.object_id(), Some(ids::SERVER) | Some(ids::ACCESS_CONTROL))
        {
            return self.reject(
                "Bootstrap-Read",
                path,
                Response::bad_request("bootstrap read can only target Object 1 (Server) or 2 (ACL)"),
            );
        }
        self.lock_store().read(peer, path)
    }

    pub fn bootstrap_write(
        &self,
        peer: &Peer,
        request: &BootstrapWriteRequest,
    ) -> BootstrapWriteResponse {
        let path = request.path();
        if peer.is_management() {
            return self.reject(
                "Bootstrap-Write",
                path,
                Response::internal_server_error("bootstrap write request from LWM2M server"),
            );
        }
        self.in_transaction(|store| store.bootstrap_write(peer, request))
    }

    pub fn bootstrap_delete(
        &self,
        peer: &Peer,
        request: &BootstrapDeleteRequest,
    ) -> BootstrapDeleteResponse {
        let path = request.path();
        if !peer.is_system() {
            if peer.is_management() {
                return self.reject(
                    "Bootstrap-Delete",
                    path,
                    Response::internal_server_error("bootstrap delete request from LWM2M server"),
                );
            }
            if self.id() == ids::DEVICE {
                return self.reject(
                    "Bootstrap-Delete",
                    path,
                    Response::bad_request("Device object instance is not deletable"),
                );
            }
        }

        // read before taking our own lock
        let bootstrap_oscore = if self.id() == ids::OSCORE {
            self.bootstrap_oscore_instance()
        } else {
            None
        };
        self.in_transaction(|store| store.bootstrap_delete(peer, path, bootstrap_oscore))
    }

    pub fn bootstrap_discover(
        &self,
        peer: &Peer,
        request: &BootstrapDiscoverRequest,
    ) -> BootstrapDiscoverResponse {
        let path = request.path();
        if peer.is_management() {
            return self.reject(
                "Bootstrap-Discover",
                path,
                Response::bad_request("not a bootstrap server"),
            );
        }
        if !path.is_object() {
            return Response::bad_request("invalid path");
        }
        let instance_ids = self.available_instance_ids();
        Response::content(
            self.link_format
                .bootstrap_object_description(&self.model, &instance_ids),
        )
    }

    /// OSCORE instance referenced by the bootstrap-server account
    fn bootstrap_oscore_instance(&self) -> Option<u16> {
        let security = match self.security.read() {
            Ok(guard) => guard.upgrade(),
            Err(poisoned) => poisoned.into_inner().upgrade(),
        }?;
        let node = security
            .read(&Peer::system(), &ReadRequest::new(Path::Object(ids::SECURITY)))
            .into_content()?;
        let account = servers_info::bootstrap_security_instance(node.as_object()?)?;
        servers_info::oscore_security_mode(account)
    }

    pub fn start(&self) {
        self.lock_store().start();
    }

    pub fn stop(&self) {
        self.lock_store().stop();
    }

    pub fn destroy(&self) {
        self.lock_store().destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::SimpleInstanceEnabler;
    use crate::model::{LwM2mModel, ResourceModel, ResourceType};
    use crate::node::{InstanceNode, Node, ObjectNode, ResourceInstanceNode, ResourceNode, Value};
    use crate::request::{Arguments, WriteMode};
    use crate::response::ResponseCode;
    use crate::transaction::tests::{Event, RecordingListener};
    use crate::instance::ResourceChangeListener;
    use std::sync::mpsc;
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    fn core_model(object_id: u16) -> ObjectModel {
        LwM2mModel::core_objects().object(object_id).unwrap().clone()
    }

    fn enabler(object_id: u16) -> (ObjectEnabler, Arc<RecordingListener>) {
        let enabler = ObjectEnabler::new(core_model(object_id), vec![], SimpleInstanceEnabler::factory());
        let recorder = Arc::new(RecordingListener::default());
        enabler.add_listener(recorder.clone());
        (enabler, recorder)
    }

    fn server_instance(id: u16, ssid: i64, lifetime: i64) -> InstanceNode {
        InstanceNode::new(
            id,
            [
                ResourceNode::single(0, Value::Integer(ssid)),
                ResourceNode::single(1, Value::Integer(lifetime)),
                ResourceNode::single(6, Value::Boolean(false)),
                ResourceNode::single(7, Value::String("U".into())),
            ],
        )
    }

    fn security_account(id: u16, bootstrap: bool) -> Box<dyn InstanceEnabler> {
        Box::new(
            SimpleInstanceEnabler::new(ids::SECURITY, id)
                .with_resource(ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(bootstrap))),
        )
    }

    /// Device schema with a mandatory writable resource 0
    fn writable_device_model() -> ObjectModel {
        ObjectModel::new(
            ids::DEVICE,
            "Device",
            false,
            [
                ResourceModel::new(0, "Manufacturer", Operations::RW, false, true, ResourceType::String),
                ResourceModel::new(4, "Reboot", Operations::E, false, true, ResourceType::None),
                ResourceModel::new(6, "Power Sources", Operations::R, true, false, ResourceType::Integer),
                ResourceModel::new(9, "Battery Level", Operations::R, false, false, ResourceType::Integer),
            ],
        )
    }

    #[test]
    fn test_second_create_on_single_instance_object() {
        let enabler = ObjectEnabler::new(writable_device_model(), vec![], SimpleInstanceEnabler::factory());
        let peer = Peer::system();
        let resources = vec![ResourceNode::single(0, Value::String("ACME".into()))];

        let first = enabler.create(&peer, &CreateRequest::new(3, resources.clone()));
        assert_eq!(first.code(), ResponseCode::Created);
        assert_eq!(first.into_content(), Some(Path::Instance(3, 0)));

        let second = enabler.create(&peer, &CreateRequest::new(3, resources));
        assert_eq!(second.code(), ResponseCode::BadRequest);
    }

    #[test]
    fn test_create_requires_mandatory_writable_resources() {
        let (enabler, recorder) = enabler(ids::SERVER);
        let peer = Peer::management(101);

        let incomplete = InstanceNode::new(0, [ResourceNode::single(1, Value::Integer(60))]);
        let response = enabler.create(
            &peer,
            &CreateRequest::with_instances(1, vec![incomplete]).unwrap(),
        );
        assert_eq!(response.code(), ResponseCode::BadRequest);
        assert_eq!(response.error_message(), Some(MANDATORY_MISSING));
        assert!(recorder.take().is_empty());

        // Short Server ID is mandatory but read-only, so it may be left out
        let mut complete = server_instance(0, 101, 60);
        complete.resources.remove(&0);
        let response = enabler.create(&peer, &CreateRequest::with_instances(1, vec![complete]).unwrap());
        assert_eq!(response.code(), ResponseCode::Created);
        assert_eq!(recorder.take(), vec![Event::Added(1, vec![0])]);
    }

    #[test]
    fn test_security_mandatory_regardless_of_writability() {
        let (enabler, _) = enabler(ids::SECURITY);
        let peer = Peer::system();

        let only_uri = vec![ResourceNode::single(0, Value::String("coap://host".into()))];
        let response = enabler.create(&peer, &CreateRequest::new(0, only_uri));
        assert_eq!(response.code(), ResponseCode::BadRequest);

        let full: Vec<ResourceNode> = vec![
            ResourceNode::single(0, Value::String("coap://host".into())),
            ResourceNode::single(1, Value::Boolean(false)),
            ResourceNode::single(2, Value::Integer(3)),
            ResourceNode::single(3, Value::Opaque(vec![])),
            ResourceNode::single(4, Value::Opaque(vec![])),
            ResourceNode::single(5, Value::Opaque(vec![])),
        ];
        let response = enabler.create(&peer, &CreateRequest::new(0, full));
        assert_eq!(response.code(), ResponseCode::Created);
    }

    #[test]
    fn test_write_replace_requires_mandatory_resources() {
        let (enabler, _) = enabler(ids::SERVER);
        enabler.add_instance(Box::new(SimpleInstanceEnabler::new(1, 0)));
        let peer = Peer::management(101);

        let partial = InstanceNode::new(0, [ResourceNode::single(1, Value::Integer(60))]);
        let replace = WriteRequest::instance(WriteMode::Replace, 1, partial.clone());
        assert_eq!(enabler.write(&peer, &replace).code(), ResponseCode::BadRequest);

        let update = WriteRequest::instance(WriteMode::Update, 1, partial);
        assert_eq!(enabler.write(&peer, &update).code(), ResponseCode::Changed);
    }

    #[test]
    fn test_instance_write_rejects_read_only_resource() {
        let (enabler, _) = enabler(ids::SERVER);
        enabler.add_instance(Box::new(SimpleInstanceEnabler::new(1, 0)));

        let node = InstanceNode::new(0, [ResourceNode::single(0, Value::Integer(7))]);
        let request = WriteRequest::instance(WriteMode::Update, 1, node);
        assert_eq!(
            enabler.write(&Peer::management(101), &request).code(),
            ResponseCode::MethodNotAllowed
        );
    }

    #[test]
    fn test_protected_objects_are_invisible() {
        for object_id in [ids::SECURITY, ids::OSCORE] {
            let (enabler, _) = enabler(object_id);
            enabler.add_instance(Box::new(SimpleInstanceEnabler::new(object_id, 0)));
            let peer = Peer::management(101);

            let codes = [
                enabler.read(&peer, &ReadRequest::new(Path::Object(object_id))).code(),
                enabler
                    .observe(&peer, &ObserveRequest::new(Path::Instance(object_id, 0)))
                    .code(),
                enabler
                    .write(
                        &peer,
                        &WriteRequest::resource(
                            WriteMode::Update,
                            object_id,
                            0,
                            ResourceNode::single(0, Value::Integer(1)),
                        ),
                    )
                    .code(),
                enabler.delete(&peer, &DeleteRequest::new(object_id, 0)).code(),
                enabler
                    .execute(
                        &peer,
                        &ExecuteRequest::new(Path::Resource(object_id, 0, 0), Arguments::new()),
                    )
                    .code(),
                enabler
                    .create(&peer, &CreateRequest::new(object_id, vec![]))
                    .code(),
                enabler
                    .discover(&peer, &DiscoverRequest::new(Path::Object(object_id)))
                    .code(),
            ];
            assert!(
                codes.iter().all(|c| *c == ResponseCode::NotFound),
                "object {}: {:?}",
                object_id,
                codes
            );
            assert_eq!(enabler.available_instance_ids(), vec![0]);
        }
    }

    #[test]
    fn test_bootstrap_peer_uses_bootstrap_operations_only() {
        let (enabler, _) = enabler(ids::SERVER);
        let peer = Peer::bootstrap();

        assert_eq!(
            enabler.read(&peer, &ReadRequest::new(Path::Object(1))).code(),
            ResponseCode::MethodNotAllowed
        );
        assert_eq!(
            enabler
                .create(&peer, &CreateRequest::new(1, vec![]))
                .code(),
            ResponseCode::MethodNotAllowed
        );
        assert_eq!(
            enabler
                .discover(&peer, &DiscoverRequest::new(Path::Object(1)))
                .code(),
            ResponseCode::MethodNotAllowed
        );
    }

    #[test]
    fn test_bootstrap_operations_from_management_peer() {
        let (enabler, _) = enabler(ids::SERVER);
        let peer = Peer::management(101);

        let write = BootstrapWriteRequest::instance(1, server_instance(0, 101, 60));
        assert_eq!(
            enabler.bootstrap_write(&peer, &write).code(),
            ResponseCode::InternalServerError
        );
        assert_eq!(
            enabler
                .bootstrap_read(&peer, &BootstrapReadRequest::new(Path::Object(1)))
                .code(),
            ResponseCode::InternalServerError
        );
        let delete = BootstrapDeleteRequest::new(Path::Object(1)).unwrap();
        assert_eq!(
            enabler.bootstrap_delete(&peer, &delete).code(),
            ResponseCode::InternalServerError
        );
        assert_eq!(
            enabler
                .bootstrap_discover(&peer, &BootstrapDiscoverRequest::new(Path::Object(1)))
                .code(),
            ResponseCode::BadRequest
        );
        assert!(enabler.available_instance_ids().is_empty());
    }

    #[test]
    fn test_resource_instance_path_needs_multiple_resource() {
        let enabler = ObjectEnabler::new(writable_device_model(), vec![], SimpleInstanceEnabler::factory());
        enabler.add_instance(Box::new(
            SimpleInstanceEnabler::new(3, 0)
                .with_resource(ResourceNode::multiple(6, [(0, Value::Integer(1))]))
                .with_resource(ResourceNode::single(9, Value::Integer(80))),
        ));
        let peer = Peer::management(101);

        let response = enabler.read(&peer, &ReadRequest::new(Path::ResourceInstance(3, 0, 9, 0)));
        assert_eq!(response.code(), ResponseCode::BadRequest);

        let response = enabler.read(&peer, &ReadRequest::new(Path::ResourceInstance(3, 0, 6, 0)));
        assert_eq!(
            response.into_content(),
            Some(Node::ResourceInstance(ResourceInstanceNode::new(0, Value::Integer(1))))
        );

        let write = WriteRequest::resource_instance(
            3,
            0,
            0,
            ResourceInstanceNode::new(1, Value::String("x".into())),
        );
        assert_eq!(enabler.write(&peer, &write).code(), ResponseCode::BadRequest);
    }

    #[test]
    fn test_read_unknown_resource_is_not_found() {
        let (enabler, _) = enabler(ids::DEVICE);
        enabler.add_instance(Box::new(SimpleInstanceEnabler::new(3, 0)));

        let response = enabler.read(
            &Peer::management(101),
            &ReadRequest::new(Path::Resource(3, 0, 99)),
        );
        assert_eq!(response.code(), ResponseCode::NotFound);

        let response = enabler.read(
            &Peer::management(101),
            &ReadRequest::new(Path::Resource(3, 0, 4)),
        );
        assert_eq!(response.code(), ResponseCode::MethodNotAllowed);
    }

    #[test]
    fn test_device_instance_not_deletable() {
        let enabler = ObjectEnabler::new(writable_device_model(), vec![], SimpleInstanceEnabler::factory());
        enabler.add_instance(Box::new(SimpleInstanceEnabler::new(3, 0)));

        let response = enabler.delete(&Peer::management(101), &DeleteRequest::new(3, 0));
        assert_eq!(response.code(), ResponseCode::MethodNotAllowed);

        let delete = BootstrapDeleteRequest::new(Path::Object(3)).unwrap();
        let response = enabler.bootstrap_delete(&Peer::bootstrap(), &delete);
        assert_eq!(response.code(), ResponseCode::BadRequest);
        assert_eq!(enabler.available_instance_ids(), vec![0]);

        let response = enabler.delete(&Peer::system(), &DeleteRequest::new(3, 0));
        assert_eq!(response.code(), ResponseCode::Deleted);
    }

    #[test]
    fn test_bootstrap_write_is_idempotent() {
        let (enabler, _) = enabler(ids::SERVER);
        let peer = Peer::bootstrap();
        let first = server_instance(0, 101, 60);
        enabler.bootstrap_write(&peer, &BootstrapWriteRequest::instance(1, first.clone()));

        let mut second = first.clone();
        second.resources.remove(&6);
        for _ in 0..2 {
            let response = enabler.bootstrap_write(&peer, &BootstrapWriteRequest::instance(1, second.clone()));
            assert_eq!(response.code(), ResponseCode::Changed);
        }

        let node = enabler
            .read(&Peer::system(), &ReadRequest::new(Path::Instance(1, 0)))
            .into_content()
            .and_then(Node::into_instance)
            .unwrap();
        assert_eq!(node, second);
    }

    #[test]
    fn test_bootstrap_write_coalesces_notifications() {
        let (enabler, recorder) = enabler(ids::SERVER);
        enabler.add_instance(Box::new(
            SimpleInstanceEnabler::new(1, 0)
                .with_resource(ResourceNode::single(0, Value::Integer(101)))
                .with_resource(ResourceNode::single(1, Value::Integer(60)))
                .with_resource(ResourceNode::single(6, Value::Boolean(false)))
                .with_resource(ResourceNode::single(7, Value::String("U".into()))),
        ));
        recorder.take();

        let object = ObjectNode::new(
            1,
            [
                server_instance(0, 101, 300),
                server_instance(1, 102, 60),
                server_instance(2, 103, 60),
            ],
        );
        let response = enabler.bootstrap_write(&Peer::bootstrap(), &BootstrapWriteRequest::object(object));
        assert_eq!(response.code(), ResponseCode::Changed);

        assert_eq!(
            recorder.take(),
            vec![
                Event::Added(1, vec![1, 2]),
                Event::Changed(vec![Path::Resource(1, 0, 1)]),
            ]
        );
        assert_eq!(enabler.available_instance_ids(), vec![0, 1, 2]);
    }

    #[test]
    fn test_bootstrap_write_reports_success_on_bad_payload() {
        let enabler = ObjectEnabler::new(writable_device_model(), vec![], SimpleInstanceEnabler::factory());
        let peer = Peer::bootstrap();
        let object = ObjectNode::new(3, [InstanceNode::new(0, []), InstanceNode::new(1, [])]);

        let response = enabler.bootstrap_write(&peer, &BootstrapWriteRequest::object(object));
        assert_eq!(response.code(), ResponseCode::Changed);
        // instance 1 can not exist on a single instance object
        assert_eq!(enabler.available_instance_ids(), vec![0]);
    }

    #[test]
    fn test_security_bootstrap_delete_keeps_bootstrap_account() {
        let enabler = ObjectEnabler::new(
            core_model(ids::SECURITY),
            vec![security_account(0, true), security_account(1, false)],
            SimpleInstanceEnabler::factory(),
        );
        let recorder = Arc::new(RecordingListener::default());
        enabler.add_listener(recorder.clone());

        let delete = BootstrapDeleteRequest::new(Path::Object(ids::SECURITY)).unwrap();
        let response = enabler.bootstrap_delete(&Peer::system(), &delete);

        assert_eq!(response.code(), ResponseCode::Deleted);
        assert_eq!(enabler.available_instance_ids(), vec![0]);
        assert_eq!(recorder.take(), vec![Event::Removed(ids::SECURITY, vec![1])]);
    }

    #[test]
    fn test_oscore_bootstrap_delete_follows_security_link() {
        let account = SimpleInstanceEnabler::new(ids::SECURITY, 0)
            .with_resource(ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(true)))
            .with_resource(ResourceNode::single(
                ids::SEC_OSCORE_SECURITY_MODE,
                Value::ObjectLink {
                    object_id: ids::OSCORE,
                    instance_id: 1,
                },
            ));
        let security = Arc::new(ObjectEnabler::new(
            core_model(ids::SECURITY),
            vec![Box::new(account)],
            SimpleInstanceEnabler::factory(),
        ));
        let oscore = ObjectEnabler::new(
            core_model(ids::OSCORE),
            vec![
                Box::new(SimpleInstanceEnabler::new(ids::OSCORE, 0)),
                Box::new(SimpleInstanceEnabler::new(ids::OSCORE, 1)),
            ],
            SimpleInstanceEnabler::factory(),
        );
        oscore.link_security_object(&security);

        let linked = BootstrapDeleteRequest::new(Path::Instance(ids::OSCORE, 1)).unwrap();
        assert_eq!(
            oscore.bootstrap_delete(&Peer::bootstrap(), &linked).code(),
            ResponseCode::BadRequest
        );

        let all = BootstrapDeleteRequest::new(Path::Object(ids::OSCORE)).unwrap();
        assert_eq!(
            oscore.bootstrap_delete(&Peer::bootstrap(), &all).code(),
            ResponseCode::Deleted
        );
        assert_eq!(oscore.available_instance_ids(), vec![1]);
    }

    #[test]
    fn test_execute_rules() {
        let reboots = Arc::new(Mutex::new(0));
        let counter = reboots.clone();
        let device = SimpleInstanceEnabler::new(3, 0).with_execute_handler(4, move |_| {
            *counter.lock().unwrap() += 1;
            Response::changed()
        });
        let (enabler, _) = enabler(ids::DEVICE);
        enabler.add_instance(Box::new(device));
        let peer = Peer::management(101);

        let execute = |path: Path| enabler.execute(&peer, &ExecuteRequest::new(path, Arguments::new()));
        assert_eq!(execute(Path::Instance(3, 0)).code(), ResponseCode::BadRequest);
        assert_eq!(execute(Path::Resource(3, 0, 99)).code(), ResponseCode::NotFound);
        assert_eq!(execute(Path::Resource(3, 0, 0)).code(), ResponseCode::MethodNotAllowed);
        assert_eq!(execute(Path::Resource(3, 1, 4)).code(), ResponseCode::NotFound);
        assert_eq!(execute(Path::Resource(3, 0, 4)).code(), ResponseCode::Changed);
        assert_eq!(*reboots.lock().unwrap(), 1);
    }

    #[test]
    fn test_observe_delegates_to_read() {
        let (enabler, _) = enabler(ids::SERVER);
        enabler.add_instance(Box::new(
            SimpleInstanceEnabler::new(1, 0).with_resource(ResourceNode::single(1, Value::Integer(60))),
        ));
        let peer = Peer::management(101);

        let observed = enabler.observe(&peer, &ObserveRequest::new(Path::Resource(1, 0, 1)));
        let read = enabler.read(&peer, &ReadRequest::new(Path::Resource(1, 0, 1)));
        assert_eq!(observed, read);

        let missing = enabler.observe(&peer, &ObserveRequest::new(Path::Instance(1, 9)));
        assert_eq!(missing.code(), ResponseCode::NotFound);
    }

    #[test]
    fn test_discover() {
        let (enabler, _) = enabler(ids::SERVER);
        enabler.add_instance(Box::new(
            SimpleInstanceEnabler::new(1, 0).with_resource(ResourceNode::single(1, Value::Integer(60))),
        ));
        let peer = Peer::management(101);
        let discover = |path: Path| enabler.discover(&peer, &DiscoverRequest::new(path));

        let links = discover(Path::Object(1)).into_content().unwrap();
        assert_eq!(
            crate::link_format::to_link_format(&links),
            "</1>;ver=1.1,</1/0>,</1/0/1>"
        );
        assert_eq!(discover(Path::Instance(1, 0)).into_content().unwrap().len(), 2);
        assert_eq!(discover(Path::Resource(1, 0, 1)).code(), ResponseCode::Content);
        assert_eq!(discover(Path::Instance(1, 5)).code(), ResponseCode::NotFound);
        assert_eq!(discover(Path::Resource(1, 0, 2)).code(), ResponseCode::NotFound);
        assert_eq!(discover(Path::Resource(1, 0, 99)).code(), ResponseCode::NotFound);
    }

    #[test]
    fn test_bootstrap_read_and_discover() {
        let (enabler, _) = enabler(ids::DEVICE);
        enabler.add_instance(Box::new(SimpleInstanceEnabler::new(3, 0)));
        let peer = Peer::bootstrap();

        let response = enabler.bootstrap_read(&peer, &BootstrapReadRequest::new(Path::Object(3)));
        assert_eq!(response.code(), ResponseCode::BadRequest);
        let response = enabler.bootstrap_read(&Peer::system(), &BootstrapReadRequest::new(Path::Object(3)));
        assert_eq!(response.code(), ResponseCode::Content);

        let links = enabler
            .bootstrap_discover(&peer, &BootstrapDiscoverRequest::new(Path::Object(3)))
            .into_content()
            .unwrap();
        assert_eq!(crate::link_format::to_link_format(&links), "</3>;ver=1.1,</3/0>");
    }

    #[test]
    fn test_listener_can_reenter_enabler() {
        struct Reader {
            enabler: Mutex<Option<Arc<ObjectEnabler>>>,
            seen: Mutex<Vec<u16>>,
        }
        impl ObjectListener for Reader {
            fn instances_added(&self, _object_id: u16, _instance_ids: &[u16]) {
                if let Some(enabler) = self.enabler.lock().unwrap().as_ref() {
                    *self.seen.lock().unwrap() = enabler.available_instance_ids();
                }
            }
            fn instances_removed(&self, _object_id: u16, _instance_ids: &[u16]) {}
            fn resources_changed(&self, _paths: &[Path]) {}
        }

        let enabler = Arc::new(ObjectEnabler::new(
            core_model(ids::SERVER),
            vec![],
            SimpleInstanceEnabler::factory(),
        ));
        let reader = Arc::new(Reader {
            enabler: Mutex::new(Some(enabler.clone())),
            seen: Mutex::new(vec![]),
        });
        enabler.add_listener(reader.clone());

        let resources = server_instance(0, 101, 60).resources.into_values().collect();
        let response = enabler.create(&Peer::system(), &CreateRequest::new(1, resources));
        assert_eq!(response.code(), ResponseCode::Created);
        assert_eq!(*reader.seen.lock().unwrap(), vec![0]);

        // break the cycle
        reader.enabler.lock().unwrap().take();
    }

    /// Server instance whose lifetime write blocks until the test releases it
    struct GatedServerInstance {
        listener: Option<ResourceChangeListener>,
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
        lifetime: Option<ResourceNode>,
    }

    impl InstanceEnabler for GatedServerInstance {
        fn id(&self) -> u16 {
            0
        }

        fn set_resource_listener(&mut self, listener: ResourceChangeListener) {
            self.listener = Some(listener);
        }

        fn read_resource(&self, _peer: &Peer, resource_id: u16) -> ReadResponse {
            match &self.lifetime {
                Some(node) if node.id == resource_id => Response::content(Node::Resource(node.clone())),
                _ => Response::not_found(),
            }
        }

        fn write_resource(&mut self, _peer: &Peer, _replace: bool, node: &ResourceNode) -> WriteResponse {
            self.entered.send(()).unwrap();
            self.release.recv().unwrap();
            self.lifetime = Some(node.clone());
            if let Some(listener) = &self.listener {
                listener.resources_changed(&[Path::Resource(ids::SERVER, 0, node.id)]);
            }
            Response::changed()
        }
    }

    /// Records which thread each notification was delivered on
    #[derive(Default)]
    struct ThreadRecorder {
        events: Mutex<Vec<(ThreadId, Event)>>,
    }

    impl ThreadRecorder {
        fn events_of(&self, thread_id: ThreadId) -> Vec<Event> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| *id == thread_id)
                .map(|(_, event)| event.clone())
                .collect()
        }
    }

    impl ObjectListener for ThreadRecorder {
        fn instances_added(&self, object_id: u16, instance_ids: &[u16]) {
            let event = Event::Added(object_id, instance_ids.to_vec());
            self.events.lock().unwrap().push((thread::current().id(), event));
        }

        fn instances_removed(&self, object_id: u16, instance_ids: &[u16]) {
            let event = Event::Removed(object_id, instance_ids.to_vec());
            self.events.lock().unwrap().push((thread::current().id(), event));
        }

        fn resources_changed(&self, paths: &[Path]) {
            let event = Event::Changed(paths.to_vec());
            self.events.lock().unwrap().push((thread::current().id(), event));
        }
    }

    #[test]
    fn test_concurrent_operations_deliver_their_own_changes() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated: Box<dyn InstanceEnabler> = Box::new(GatedServerInstance {
            listener: None,
            entered: entered_tx,
            release: release_rx,
            lifetime: None,
        });
        let enabler = ObjectEnabler::new(core_model(ids::SERVER), vec![gated], SimpleInstanceEnabler::factory());
        let recorder = Arc::new(ThreadRecorder::default());
        enabler.add_listener(recorder.clone());

        let (writer, creator) = thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let request = WriteRequest::resource(
                    WriteMode::Replace,
                    ids::SERVER,
                    0,
                    ResourceNode::single(ids::SRV_LIFETIME, Value::Integer(120)),
                );
                let response = enabler.write(&Peer::management(101), &request);
                assert_eq!(response.code(), ResponseCode::Changed);
                thread::current().id()
            });
            entered_rx.recv().unwrap();

            // runs while the write is blocked inside the instance
            let creator = scope.spawn(|| {
                let resources = server_instance(0, 102, 60).resources.into_values().collect();
                let response = enabler.create(&Peer::system(), &CreateRequest::new(ids::SERVER, resources));
                assert_eq!(response.code(), ResponseCode::Created);
                thread::current().id()
            });
            thread::sleep(Duration::from_millis(50));
            release_tx.send(()).unwrap();

            (writer.join().unwrap(), creator.join().unwrap())
        });

        assert_eq!(
            recorder.events_of(writer),
            vec![Event::Changed(vec![Path::Resource(ids::SERVER, 0, ids::SRV_LIFETIME)])]
        );
        assert_eq!(recorder.events_of(creator), vec![Event::Added(ids::SERVER, vec![1])]);
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
        assert_eq!(enabler.available_instance_ids(), vec![0, 1]);
    }
}
