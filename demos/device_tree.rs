//! Device Tree Example
//!
//! Builds the core LWM2M objects (Security, Server, Device, OSCORE) and runs
//! a short session against them:
//! - a management server reads, writes, executes and discovers
//! - the device listens for changes
//! - the bootstrap server wipes the tree and discovers what is left
//!
//! Usage:
//!   RUST_LOG=debug cargo run --example device_tree

use std::sync::Arc;

use lwm2m_enabler::{
    extract_prefix, ids, to_link_format, BootstrapDeleteRequest, BootstrapDiscoverRequest,
    ContentFormat, DiscoverRequest, ExecuteRequest, InstanceEnabler, LwM2mModel, ObjectEnabler,
    ObjectListener, ObjectModel, ObjectTree, Path, Peer, ReadRequest, ResourceNode, Response,
    SimpleInstanceEnabler, Value, WriteMode, WriteRequest,
};

const SHORT_SERVER_ID: u16 = 101;

/// Prints every change the tree reports
struct ChangePrinter;

impl ObjectListener for ChangePrinter {
    fn instances_added(&self, object_id: u16, instance_ids: &[u16]) {
        println!("  [listener] /{} instances added: {:?}", object_id, instance_ids);
    }

    fn instances_removed(&self, object_id: u16, instance_ids: &[u16]) {
        println!("  [listener] /{} instances removed: {:?}", object_id, instance_ids);
    }

    fn resources_changed(&self, paths: &[Path]) {
        let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        println!("  [listener] resources changed: {}", paths.join(", "));
    }
}

fn object_model(model: &LwM2mModel, object_id: u16) -> ObjectModel {
    match model.object(object_id) {
        Some(object) => object.clone(),
        None => panic!("core model has no object {}", object_id),
    }
}

fn build_tree() -> ObjectTree {
    let model = LwM2mModel::core_objects();

    let bootstrap_account: Box<dyn InstanceEnabler> = Box::new(
        SimpleInstanceEnabler::new(ids::SECURITY, 0)
            .with_resource(ResourceNode::single(
                ids::SEC_SERVER_URI,
                Value::String("coaps://bootstrap.example.net:5684".into()),
            ))
            .with_resource(ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(true))),
    );
    let server_account: Box<dyn InstanceEnabler> = Box::new(
        SimpleInstanceEnabler::new(ids::SECURITY, 1)
            .with_resource(ResourceNode::single(
                ids::SEC_SERVER_URI,
                Value::String("coaps://dm.example.net:5684".into()),
            ))
            .with_resource(ResourceNode::single(ids::SEC_BOOTSTRAP, Value::Boolean(false)))
            .with_resource(ResourceNode::single(
                ids::SEC_SHORT_SERVER_ID,
                Value::Integer(SHORT_SERVER_ID as i64),
            )),
    );
    let server: Box<dyn InstanceEnabler> = Box::new(
        SimpleInstanceEnabler::new(ids::SERVER, 0)
            .with_resource(ResourceNode::single(
                ids::SRV_SHORT_SERVER_ID,
                Value::Integer(SHORT_SERVER_ID as i64),
            ))
            .with_resource(ResourceNode::single(ids::SRV_LIFETIME, Value::Integer(300)))
            .with_resource(ResourceNode::single(7, Value::String("U".into()))),
    );
    let device: Box<dyn InstanceEnabler> = Box::new(
        SimpleInstanceEnabler::new(ids::DEVICE, 0)
            .with_resource(ResourceNode::single(0, Value::String("Example Corp".into())))
            .with_resource(ResourceNode::single(1, Value::String("EX-42".into())))
            .with_resource(ResourceNode::multiple(11, [(0, Value::Integer(0))]))
            .with_resource(ResourceNode::single(16, Value::String("U".into())))
            .with_execute_handler(4, |_| {
                println!("  [device] rebooting");
                Response::changed()
            }),
    );

    ObjectTree::new([
        ObjectEnabler::new(
            object_model(&model, ids::SECURITY),
            vec![bootstrap_account, server_account],
            SimpleInstanceEnabler::factory(),
        ),
        ObjectEnabler::new(
            object_model(&model, ids::SERVER),
            vec![server],
            SimpleInstanceEnabler::factory(),
        ),
        ObjectEnabler::new(
            object_model(&model, ids::DEVICE),
            vec![device],
            SimpleInstanceEnabler::factory(),
        ),
        ObjectEnabler::new(
            object_model(&model, ids::OSCORE),
            Vec::new(),
            SimpleInstanceEnabler::factory(),
        ),
    ])
}

fn main() -> lwm2m_enabler::Result<()> {
    env_logger::init();

    let tree = build_tree();
    tree.add_listener(Arc::new(ChangePrinter));
    tree.start();

    let server = Peer::management(SHORT_SERVER_ID);
    let bootstrap = Peer::bootstrap();

    println!("=== Management server session ===");

    let device = Path::Instance(ids::DEVICE, 0);
    let response = tree.read(&server, &ReadRequest::new(device));
    println!("READ {} -> {} (CoAP {:?})", device, response.code(), response.code().to_coap());
    if let Some(node) = response.content_ref() {
        println!("  {:?}", node);
    }

    let security = Path::Object(ids::SECURITY);
    let response = tree.read(&server, &ReadRequest::new(security));
    println!("READ {} -> {}", security, response.code());

    let write = WriteRequest::resource(
        WriteMode::Replace,
        ids::SERVER,
        0,
        ResourceNode::single(ids::SRV_LIFETIME, Value::Integer(3600)),
    );
    let response = tree.write(&server, &write);
    println!("WRITE {} -> {}", write.path(), response.code());

    let reboot = ExecuteRequest::parse("/3/0/4", "")?;
    let response = tree.execute(&server, &reboot);
    println!("EXECUTE {} -> {}", reboot.path(), response.code());

    let response = tree.discover(&server, &DiscoverRequest::new(Path::Object(ids::DEVICE)));
    println!("DISCOVER /3 -> {}", response.code());
    if let Some(links) = response.content_ref() {
        println!("  {}", to_link_format(links));
    }

    println!("\n=== Bootstrap session ===");

    let response = tree.bootstrap_delete(&bootstrap, &BootstrapDeleteRequest::new(Path::Root)?);
    println!("BOOTSTRAP DELETE / -> {}", response.code());

    let response = tree.bootstrap_discover(&bootstrap, &BootstrapDiscoverRequest::new(Path::Root));
    println!("BOOTSTRAP DISCOVER / -> {}", response.code());
    if let Some(links) = response.content_ref() {
        println!("  {}", to_link_format(links));
    }

    println!("\n=== Send from a gateway ===");

    let pack = br#"[{"bn":"sensor-12/3303/0/","n":"5700","v":21.5}]"#;
    match extract_prefix(pack, ContentFormat::SenmlJson)? {
        Some(prefix) => println!("endpoint prefix: {}", prefix),
        None => println!("no endpoint prefix"),
    }

    tree.destroy();
    Ok(())
}
