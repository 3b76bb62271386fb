//! The device's whole resource tree
//!
//! Routes each request to the enabler of the object its path names. Bootstrap
//! operations that may address the root fan out to every object.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::link_format::Link;
use crate::model::ids;
use crate::object_enabler::ObjectEnabler;
use crate::path::Path;
use crate::peer::Peer;
use crate::request::{
    BootstrapDeleteRequest, BootstrapDiscoverRequest, BootstrapReadRequest,
    BootstrapWriteRequest, CreateRequest, DeleteRequest, DiscoverRequest, ExecuteRequest,
    ObserveRequest, ReadRequest, WriteRequest,
};
use crate::response::{
    BootstrapDeleteResponse, BootstrapDiscoverResponse, BootstrapReadResponse,
    BootstrapWriteResponse, CreateResponse, DeleteResponse, DiscoverResponse, ExecuteResponse,
    ObserveResponse, ReadResponse, Response, ResponseCode, WriteResponse,
};
use crate::transaction::ObjectListener;

/// LWM2M version announced by a root Bootstrap-Discover
const LWM2M_VERSION: &str = "1.1";

pub struct ObjectTree {
    enablers: BTreeMap<u16, Arc<ObjectEnabler>>,
}

impl ObjectTree {
    pub fn new(enablers: impl IntoIterator<Item = ObjectEnabler>) -> Self {
        let mut tree = Self {
            enablers: BTreeMap::new(),
        };
        for enabler in enablers {
            tree.insert(enabler);
        }
        tree
    }

    /// Add or replace the enabler of one object
    pub fn insert(&mut self, enabler: ObjectEnabler) {
        let enabler = Arc::new(enabler);
        let object_id = enabler.id();
        if self.enablers.insert(object_id, Arc::clone(&enabler)).is_some() {
            log::warn!("Object {} enabler replaced", object_id);
        }

        let security = self.enablers.get(&ids::SECURITY).cloned();
        let oscore = self.enablers.get(&ids::OSCORE).cloned();
        if let (Some(security), Some(oscore)) = (security, oscore) {
            if object_id == ids::SECURITY || object_id == ids::OSCORE {
                oscore.link_security_object(&security);
            }
        }
    }

    pub fn object_enabler(&self, object_id: u16) -> Option<&Arc<ObjectEnabler>> {
        self.enablers.get(&object_id)
    }

    pub fn object_ids(&self) -> Vec<u16> {
        self.enablers.keys().copied().collect()
    }

    pub fn add_listener(&self, listener: Arc<dyn ObjectListener>) {
        for enabler in self.enablers.values() {
            enabler.add_listener(Arc::clone(&listener));
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ObjectListener>) {
        for enabler in self.enablers.values() {
            enabler.remove_listener(listener);
        }
    }

    fn route<T>(&self, path: Path) -> Result<&ObjectEnabler, Response<T>> {
        let Some(object_id) = path.object_id() else {
            return Err(Response::bad_request(format!(
                "operation not allowed on {}",
                path
            )));
        };
        match self.enablers.get(&object_id) {
            Some(enabler) => Ok(enabler.as_ref()),
            None => {
                log::debug!("No enabler for object {}", object_id);
                Err(Response::not_found())
            }
        }
    }

    pub fn create(&self, peer: &Peer, request: &CreateRequest) -> CreateResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.create(peer, request),
            Err(response) => response,
        }
    }

    pub fn read(&self, peer: &Peer, request: &ReadRequest) -> ReadResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.read(peer, request),
            Err(response) => response,
        }
    }

    pub fn observe(&self, peer: &Peer, request: &ObserveRequest) -> ObserveResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.observe(peer, request),
            Err(response) => response,
        }
    }

    pub fn write(&self, peer: &Peer, request: &WriteRequest) -> WriteResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.write(peer, request),
            Err(response) => response,
        }
    }

    pub fn delete(&self, peer: &Peer, request: &DeleteRequest) -> DeleteResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.delete(peer, request),
            Err(response) => response,
        }
    }

    pub fn execute(&self, peer: &Peer, request: &ExecuteRequest) -> ExecuteResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.execute(peer, request),
            Err(response) => response,
        }
    }

    pub fn discover(&self, peer: &Peer, request: &DiscoverRequest) -> DiscoverResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.discover(peer, request),
            Err(response) => response,
        }
    }

    pub fn bootstrap_read(
        &self,
        peer: &Peer,
        request: &BootstrapReadRequest,
    ) -> BootstrapReadResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.bootstrap_read(peer, request),
            Err(response) => response,
        }
    }

    pub fn bootstrap_write(
        &self,
        peer: &Peer,
        request: &BootstrapWriteRequest,
    ) -> BootstrapWriteResponse {
        match self.route(request.path()) {
            Ok(enabler) => enabler.bootstrap_write(peer, request),
            Err(response) => response,
        }
    }

    /// Bootstrap-Delete; on the root every object is cleared
    ///
    /// The Device object always refuses a peer's Bootstrap-Delete, which does not
    /// fail a root deletion.
    pub fn bootstrap_delete(
        &self,
        peer: &Peer,
        request: &BootstrapDeleteRequest,
    ) -> BootstrapDeleteResponse {
        if !request.path().is_root() {
            return match self.route(request.path()) {
                Ok(enabler) => enabler.bootstrap_delete(peer, request),
                Err(response) => response,
            };
        }

        let mut outcome = Response::deleted();
        for enabler in self.enablers.values() {
            let response = enabler.bootstrap_delete(peer, request);
            let device_refusal =
                enabler.id() == ids::DEVICE && response.code() == ResponseCode::BadRequest;
            if response.is_success() || device_refusal {
                continue;
            }
            log::warn!(
                "Bootstrap delete of object {} failed: {}",
                enabler.id(),
                response.code()
            );
            if outcome.is_success() {
                outcome = response;
            }
        }
        outcome
    }

    /// Bootstrap-Discover; on the root every object is described
    pub fn bootstrap_discover(
        &self,
        peer: &Peer,
        request: &BootstrapDiscoverRequest,
    ) -> BootstrapDiscoverResponse {
        if !request.path().is_root() {
            return match self.route(request.path()) {
                Ok(enabler) => enabler.bootstrap_discover(peer, request),
                Err(response) => response,
            };
        }

        let mut links =
            vec![Link::new(Path::Root).with_attribute("lwm2m", Some(LWM2M_VERSION.to_string()))];
        for (object_id, enabler) in &self.enablers {
            let object_request = BootstrapDiscoverRequest::new(Path::Object(*object_id));
            let response = enabler.bootstrap_discover(peer, &object_request);
            if !response.is_success() {
                return response;
            }
            links.extend(response.into_content().unwrap_or_default());
        }
        Response::content(links)
    }

    pub fn start(&self) {
        for enabler in self.enablers.values() {
            enabler.start();
        }
    }

    pub fn stop(&self) {
        for enabler in self.enablers.values() {
            enabler.stop();
        }
    }

    pub fn destroy(&self) {
        for enabler in self.enablers.values() {
            enabler.destroy();
        }
    }
}
