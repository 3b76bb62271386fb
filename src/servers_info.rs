//! Helpers reading server accounts out of the Security object

use crate::instance::InstanceEnabler;
use crate::model::ids;
use crate::node::{InstanceNode, Node, ObjectNode};
use crate::peer::Peer;

/// True if a Security instance describes the bootstrap-server account
pub fn is_bootstrap_server(instance: &dyn InstanceEnabler) -> bool {
    match instance
        .read_resource(&Peer::system(), ids::SEC_BOOTSTRAP)
        .into_content()
    {
        Some(Node::Resource(resource)) => resource.value().and_then(|v| v.as_bool()) == Some(true),
        _ => false,
    }
}

/// The bootstrap-server account of a Security object read
pub fn bootstrap_security_instance(security: &ObjectNode) -> Option<&InstanceNode> {
    security.instances.values().find(|instance| {
        instance
            .resource(ids::SEC_BOOTSTRAP)
            .and_then(|r| r.value())
            .and_then(|v| v.as_bool())
            == Some(true)
    })
}

/// OSCORE instance id a Security instance links to, if any
pub fn oscore_security_mode(security_instance: &InstanceNode) -> Option<u16> {
    security_instance
        .resource(ids::SEC_OSCORE_SECURITY_MODE)
        .and_then(|r| r.value())
        .and_then(|v| v.as_object_link())
        .filter(|(object_id, _)| *object_id == ids::OSCORE)
        .map(|(_, instance_id)| instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::SimpleInstanceEnabler;
    use crate::node::{ResourceNode, Value};

    fn account(id: u16, bootstrap: bool) -> InstanceNode {
        InstanceNode::new(
            id,
            [
                ResourceNode::single(ids::SEC_SERVER_URI, Value::String("coap://host".into())),
                ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(bootstrap)),
            ],
        )
    }

    #[test]
    fn test_is_bootstrap_server() {
        let bootstrap = SimpleInstanceEnabler::new(ids::SECURITY, 0)
            .with_resource(ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(true)));
        let server = SimpleInstanceEnabler::new(ids::SECURITY, 1)
            .with_resource(ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(false)));
        let empty = SimpleInstanceEnabler::new(ids::SECURITY, 2);

        assert!(is_bootstrap_server(&bootstrap));
        assert!(!is_bootstrap_server(&server));
        assert!(!is_bootstrap_server(&empty));
    }

    #[test]
    fn test_bootstrap_security_instance() {
        let security = ObjectNode::new(ids::SECURITY, [account(0, false), account(3, true)]);
        assert_eq!(bootstrap_security_instance(&security).map(|i| i.id), Some(3));

        let no_bootstrap = ObjectNode::new(ids::SECURITY, [account(0, false)]);
        assert!(bootstrap_security_instance(&no_bootstrap).is_none());
    }

    #[test]
    fn test_oscore_security_mode() {
        let mut instance = account(0, true);
        assert_eq!(oscore_security_mode(&instance), None);

        instance.resources.insert(
            ids::SEC_OSCORE_SECURITY_MODE,
            ResourceNode::single(
                ids::SEC_OSCORE_SECURITY_MODE,
                Value::ObjectLink {
                    object_id: ids::OSCORE,
                    instance_id: 2,
                },
            ),
        );
        assert_eq!(oscore_security_mode(&instance), Some(2));
    }
}
