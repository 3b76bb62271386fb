//! Links returned by Discover and Bootstrap-Discover
//!
//! Serializing links onto the wire is the transport's job; this module only
//! builds the structured link list for a discovered scope.

use std::fmt;

use crate::model::ObjectModel;
use crate::path::Path;

/// One CoRE link: a target path and its attributes, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    target: Path,
    attributes: Vec<(String, Option<String>)>,
}

impl Link {
    pub fn new(target: Path) -> Self {
        Self {
            target,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    pub fn target(&self) -> Path {
        self.target
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.target)?;
        for (name, value) in &self.attributes {
            match value {
                Some(v) => write!(f, ";{}={}", name, v)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

/// Render a link list as `application/link-format` text
pub fn to_link_format(links: &[Link]) -> String {
    links
        .iter()
        .map(Link::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds the link lists of Discover responses
pub trait LinkFormatHelper: Send + Sync {
    /// Object link followed by every instance and its resources
    fn object_description(&self, model: &ObjectModel, instances: &[(u16, Vec<u16>)]) -> Vec<Link>;

    /// Instance link followed by its resources
    fn instance_description(
        &self,
        model: &ObjectModel,
        instance_id: u16,
        resource_ids: &[u16],
    ) -> Vec<Link>;

    fn resource_description(&self, model: &ObjectModel, instance_id: u16, resource_id: u16)
        -> Link;

    /// Object link followed by its instances, without resources
    fn bootstrap_object_description(&self, model: &ObjectModel, instance_ids: &[u16])
        -> Vec<Link>;
}

/// Link lists in the form LWM2M 1.1 servers expect
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLinkFormatHelper;

impl DefaultLinkFormatHelper {
    fn object_link(model: &ObjectModel) -> Link {
        let link = Link::new(Path::Object(model.id));
        if model.version != "1.0" {
            link.with_attribute("ver", Some(model.version.clone()))
        } else {
            link
        }
    }
}

impl LinkFormatHelper for DefaultLinkFormatHelper {
    fn object_description(&self, model: &ObjectModel, instances: &[(u16, Vec<u16>)]) -> Vec<Link> {
        let mut links = vec![Self::object_link(model)];
        for (instance_id, resource_ids) in instances {
            links.extend(self.instance_description(model, *instance_id, resource_ids));
        }
        links
    }

    fn instance_description(
        &self,
        model: &ObjectModel,
        instance_id: u16,
        resource_ids: &[u16],
    ) -> Vec<Link> {
        let mut links = vec![Link::new(Path::Instance(model.id, instance_id))];
        links.extend(
            resource_ids
                .iter()
                .map(|resource_id| self.resource_description(model, instance_id, *resource_id)),
        );
        links
    }

    fn resource_description(
        &self,
        model: &ObjectModel,
        instance_id: u16,
        resource_id: u16,
    ) -> Link {
        Link::new(Path::Resource(model.id, instance_id, resource_id))
    }

    fn bootstrap_object_description(
        &self,
        model: &ObjectModel,
        instance_ids: &[u16],
    ) -> Vec<Link> {
        let mut links = vec![Self::object_link(model)];
        links.extend(
            instance_ids
                .iter()
                .map(|instance_id| Link::new(Path::Instance(model.id, *instance_id))),
        );
        links
    }
}
