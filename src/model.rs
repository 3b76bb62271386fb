//! Object models: the static schema of each LWM2M object
//!
//! Models are immutable once an enabler is built. They are usually loaded from a
//! JSON file listing object definitions; the core objects the enabler treats
//! specially (Security, Server, Device, OSCORE) are also available built in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path as FsPath;

use crate::error::{Error, Result};

/// Well-known object and resource ids
pub mod ids {
    /// LWM2M Security object
    pub const SECURITY: u16 = 0;
    /// LWM2M Server object
    pub const SERVER: u16 = 1;
    /// Access Control object
    pub const ACCESS_CONTROL: u16 = 2;
    /// Device object
    pub const DEVICE: u16 = 3;
    /// OSCORE object
    pub const OSCORE: u16 = 21;

    /// Security: LWM2M Server URI
    pub const SEC_SERVER_URI: u16 = 0;
    /// Security: Bootstrap-Server flag
    pub const SEC_BOOTSTRAP: u16 = 1;
    /// Security: Short Server ID
    pub const SEC_SHORT_SERVER_ID: u16 = 10;
    /// Security: OSCORE Security Mode (link to an OSCORE instance)
    pub const SEC_OSCORE_SECURITY_MODE: u16 = 17;

    /// Server: Short Server ID
    pub const SRV_SHORT_SERVER_ID: u16 = 0;
    /// Server: Lifetime
    pub const SRV_LIFETIME: u16 = 1;
}

/// Operations allowed on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operations {
    #[serde(rename = "")]
    None,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "W")]
    W,
    #[serde(rename = "RW")]
    RW,
    #[serde(rename = "E")]
    E,
}

impl Operations {
    pub fn is_readable(&self) -> bool {
        matches!(self, Operations::R | Operations::RW)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Operations::W | Operations::RW)
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, Operations::E)
    }
}

/// Data type of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    String,
    Integer,
    Unsigned,
    Float,
    Boolean,
    Opaque,
    Time,
    Objlnk,
    Corelnk,
    None,
}

/// Schema entry of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceModel {
    pub id: u16,
    pub name: String,
    pub operations: Operations,
    pub multiple: bool,
    pub mandatory: bool,
    #[serde(rename = "type")]
    pub kind: ResourceType,
}

impl ResourceModel {
    pub fn new(
        id: u16,
        name: impl Into<String>,
        operations: Operations,
        multiple: bool,
        mandatory: bool,
        kind: ResourceType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            operations,
            multiple,
            mandatory,
            kind,
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Schema of one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectModel {
    pub id: u16,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Whether the object supports multiple instances
    pub multiple: bool,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(with = "resource_list")]
    pub resources: BTreeMap<u16, ResourceModel>,
}

impl ObjectModel {
    pub fn new(
        id: u16,
        name: impl Into<String>,
        multiple: bool,
        resources: impl IntoIterator<Item = ResourceModel>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            version: default_version(),
            multiple,
            mandatory: false,
            resources: resources.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn resource(&self, resource_id: u16) -> Option<&ResourceModel> {
        self.resources.get(&resource_id)
    }

    pub fn resource_ids(&self) -> Vec<u16> {
        self.resources.keys().copied().collect()
    }
}

/// Resources are written as a list in JSON and indexed by id in memory
mod resource_list {
    use super::ResourceModel;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        resources: &BTreeMap<u16, ResourceModel>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(resources.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<u16, ResourceModel>, D::Error> {
        let list = Vec::<ResourceModel>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|r| (r.id, r)).collect())
    }
}

/// Collection of object models indexed by object id
#[derive(Debug, Clone, Default)]
pub struct LwM2mModel {
    objects: BTreeMap<u16, ObjectModel>,
}

impl LwM2mModel {
    pub fn new(objects: impl IntoIterator<Item = ObjectModel>) -> Self {
        Self {
            objects: objects.into_iter().map(|o| (o.id, o)).collect(),
        }
    }

    /// Load object models from a JSON file
    pub fn from_file(path: impl AsRef<FsPath>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Model(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json(&content)
    }

    /// Load object models from a JSON array of object definitions
    pub fn from_json(json: &str) -> Result<Self> {
        let objects: Vec<ObjectModel> = serde_json::from_str(json)?;

        let mut model = Self::default();
        for object in objects {
            if model.objects.contains_key(&object.id) {
                return Err(Error::Model(format!(
                    "object {} is defined more than once",
                    object.id
                )));
            }
            model.objects.insert(object.id, object);
        }
        Ok(model)
    }

    /// Security, Server, Device and OSCORE definitions (core resources only)
    pub fn core_objects() -> Self {
        let json = r#"[
            {
                "id": 0, "name": "LWM2M Security", "version": "1.1", "multiple": true, "mandatory": true,
                "resources": [
                    { "id": 0, "name": "LWM2M Server URI", "operations": "", "multiple": false, "mandatory": true, "type": "string" },
                    { "id": 1, "name": "Bootstrap-Server", "operations": "", "multiple": false, "mandatory": true, "type": "boolean" },
                    { "id": 2, "name": "Security Mode", "operations": "", "multiple": false, "mandatory": true, "type": "integer" },
                    { "id": 3, "name": "Public Key or Identity", "operations": "", "multiple": false, "mandatory": true, "type": "opaque" },
                    { "id": 4, "name": "Server Public Key", "operations": "", "multiple": false, "mandatory": true, "type": "opaque" },
                    { "id": 5, "name": "Secret Key", "operations": "", "multiple": false, "mandatory": true, "type": "opaque" },
                    { "id": 10, "name": "Short Server ID", "operations": "", "multiple": false, "mandatory": false, "type": "integer" },
                    { "id": 17, "name": "OSCORE Security Mode", "operations": "", "multiple": false, "mandatory": false, "type": "objlnk" }
                ]
            },
            {
                "id": 1, "name": "LwM2M Server", "version": "1.1", "multiple": true, "mandatory": true,
                "resources": [
                    { "id": 0, "name": "Short Server ID", "operations": "R", "multiple": false, "mandatory": true, "type": "integer" },
                    { "id": 1, "name": "Lifetime", "operations": "RW", "multiple": false, "mandatory": true, "type": "integer" },
                    { "id": 2, "name": "Default Minimum Period", "operations": "RW", "multiple": false, "mandatory": false, "type": "integer" },
                    { "id": 3, "name": "Default Maximum Period", "operations": "RW", "multiple": false, "mandatory": false, "type": "integer" },
                    { "id": 4, "name": "Disable", "operations": "E", "multiple": false, "mandatory": false, "type": "none" },
                    { "id": 6, "name": "Notification Storing When Disabled or Offline", "operations": "RW", "multiple": false, "mandatory": true, "type": "boolean" },
                    { "id": 7, "name": "Binding", "operations": "RW", "multiple": false, "mandatory": true, "type": "string" },
                    { "id": 8, "name": "Registration Update Trigger", "operations": "E", "multiple": false, "mandatory": true, "type": "none" }
                ]
            },
            {
                "id": 3, "name": "Device", "version": "1.1", "multiple": false, "mandatory": true,
                "resources": [
                    { "id": 0, "name": "Manufacturer", "operations": "R", "multiple": false, "mandatory": false, "type": "string" },
                    { "id": 1, "name": "Model Number", "operations": "R", "multiple": false, "mandatory": false, "type": "string" },
                    { "id": 2, "name": "Serial Number", "operations": "R", "multiple": false, "mandatory": false, "type": "string" },
                    { "id": 3, "name": "Firmware Version", "operations": "R", "multiple": false, "mandatory": false, "type": "string" },
                    { "id": 4, "name": "Reboot", "operations": "E", "multiple": false, "mandatory": true, "type": "none" },
                    { "id": 6, "name": "Available Power Sources", "operations": "R", "multiple": true, "mandatory": false, "type": "integer" },
                    { "id": 11, "name": "Error Code", "operations": "R", "multiple": true, "mandatory": true, "type": "integer" },
                    { "id": 13, "name": "Current Time", "operations": "RW", "multiple": false, "mandatory": false, "type": "time" },
                    { "id": 14, "name": "UTC Offset", "operations": "RW", "multiple": false, "mandatory": false, "type": "string" },
                    { "id": 16, "name": "Supported Binding and Modes", "operations": "R", "multiple": false, "mandatory": true, "type": "string" }
                ]
            },
            {
                "id": 21, "name": "OSCORE", "version": "2.0", "multiple": true, "mandatory": false,
                "resources": [
                    { "id": 0, "name": "OSCORE Master Secret", "operations": "", "multiple": false, "mandatory": true, "type": "opaque" },
                    { "id": 1, "name": "OSCORE Sender ID", "operations": "", "multiple": false, "mandatory": true, "type": "opaque" },
                    { "id": 2, "name": "OSCORE Recipient ID", "operations": "", "multiple": false, "mandatory": true, "type": "opaque" },
                    { "id": 3, "name": "OSCORE AEAD Algorithm", "operations": "", "multiple": false, "mandatory": false, "type": "integer" },
                    { "id": 4, "name": "OSCORE HMAC Algorithm", "operations": "", "multiple": false, "mandatory": false, "type": "integer" },
                    { "id": 5, "name": "OSCORE Master Salt", "operations": "", "multiple": false, "mandatory": false, "type": "opaque" },
                    { "id": 6, "name": "OSCORE ID Context", "operations": "", "multiple": false, "mandatory": false, "type": "opaque" }
                ]
            }
        ]"#;

        // SAFETY: This is a hardcoded JSON literal that is always valid.
        // If this panics, it's a programmer error in the constant above.
        Self::from_json(json).expect("core object models JSON is valid")
    }

    pub fn object(&self, object_id: u16) -> Option<&ObjectModel> {
        self.objects.get(&object_id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectModel> {
        self.objects.values()
    }

    /// Add or replace an object model
    pub fn insert(&mut self, object: ObjectModel) {
        self.objects.insert(object.id, object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_objects() {
        let model = LwM2mModel::core_objects();
        let security = model.object(ids::SECURITY).unwrap();
        assert!(security.multiple);
        assert!(security.resource(ids::SEC_BOOTSTRAP).unwrap().mandatory);

        let device = model.object(ids::DEVICE).unwrap();
        assert!(!device.multiple);
        assert!(device.resource(4).unwrap().operations.is_executable());
        assert!(device.resource(11).unwrap().multiple);

        assert!(model.object(ids::OSCORE).is_some());
        assert!(model.object(ids::SERVER).is_some());
    }

    #[test]
    fn test_operations_flags() {
        assert!(Operations::RW.is_readable() && Operations::RW.is_writable());
        assert!(!Operations::R.is_writable());
        assert!(!Operations::W.is_readable());
        assert!(Operations::E.is_executable() && !Operations::E.is_readable());
        assert!(!Operations::None.is_readable() && !Operations::None.is_writable());
    }

    #[test]
    fn test_from_json_defaults_and_duplicates() {
        let json = r#"[{ "id": 3303, "name": "Temperature", "multiple": true,
            "resources": [{ "id": 5700, "name": "Sensor Value", "operations": "R",
                            "multiple": false, "mandatory": true, "type": "float" }] }]"#;
        let model = LwM2mModel::from_json(json).unwrap();
        let temperature = model.object(3303).unwrap();
        assert_eq!(temperature.version, "1.0");
        assert!(!temperature.mandatory);
        assert_eq!(temperature.resource(5700).unwrap().kind, ResourceType::Float);

        let duplicated = format!("[{0},{0}]", &json[1..json.len() - 1]);
        assert!(matches!(
            LwM2mModel::from_json(&duplicated),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let result = LwM2mModel::from_file("does/not/exist.json");
        assert!(matches!(result, Err(Error::Model(_))));
    }

    #[test]
    fn test_serialize_roundtrip_keeps_resources() {
        let device = LwM2mModel::core_objects().object(ids::DEVICE).unwrap().clone();
        let json = serde_json::to_string(&vec![device.clone()]).unwrap();
        let reloaded = LwM2mModel::from_json(&json).unwrap();
        assert_eq!(reloaded.object(ids::DEVICE), Some(&device));
    }
}
