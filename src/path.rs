//! LWM2M paths
//!
//! A path addresses the tree at one of five depths. Each depth is its own
//! variant, so a resource-instance path always carries its resource and instance
//! ids.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Address into the resource tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Path {
    /// `/`
    Root,
    /// `/{object}`
    Object(u16),
    /// `/{object}/{instance}`
    Instance(u16, u16),
    /// `/{object}/{instance}/{resource}`
    Resource(u16, u16, u16),
    /// `/{object}/{instance}/{resource}/{resource-instance}`
    ResourceInstance(u16, u16, u16, u16),
}

impl Path {
    /// Number of components set (0 for root, 4 for a resource instance)
    pub fn depth(&self) -> u8 {
        match self {
            Path::Root => 0,
            Path::Object(..) => 1,
            Path::Instance(..) => 2,
            Path::Resource(..) => 3,
            Path::ResourceInstance(..) => 4,
        }
    }

    pub fn object_id(&self) -> Option<u16> {
        match *self {
            Path::Root => None,
            Path::Object(o)
            | Path::Instance(o, _)
            | Path::Resource(o, _, _)
            | Path::ResourceInstance(o, _, _, _) => Some(o),
        }
    }

    pub fn object_instance_id(&self) -> Option<u16> {
        match *self {
            Path::Instance(_, i) | Path::Resource(_, i, _) | Path::ResourceInstance(_, i, _, _) => {
                Some(i)
            }
            _ => None,
        }
    }

    pub fn resource_id(&self) -> Option<u16> {
        match *self {
            Path::Resource(_, _, r) | Path::ResourceInstance(_, _, r, _) => Some(r),
            _ => None,
        }
    }

    pub fn resource_instance_id(&self) -> Option<u16> {
        match *self {
            Path::ResourceInstance(_, _, _, ri) => Some(ri),
            _ => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Path::Root)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Path::Object(..))
    }

    pub fn is_object_instance(&self) -> bool {
        matches!(self, Path::Instance(..))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Path::Resource(..))
    }

    pub fn is_resource_instance(&self) -> bool {
        matches!(self, Path::ResourceInstance(..))
    }

    /// Path one level up, `None` for root
    pub fn parent(&self) -> Option<Path> {
        match *self {
            Path::Root => None,
            Path::Object(_) => Some(Path::Root),
            Path::Instance(o, _) => Some(Path::Object(o)),
            Path::Resource(o, i, _) => Some(Path::Instance(o, i)),
            Path::ResourceInstance(o, i, r, _) => Some(Path::Resource(o, i, r)),
        }
    }

    /// True if `other` is this path or lies below it
    pub fn contains(&self, other: &Path) -> bool {
        let mut current = Some(*other);
        while let Some(p) = current {
            if p == *self {
                return true;
            }
            current = p.parent();
        }
        false
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Root => write!(f, "/"),
            Path::Object(o) => write!(f, "/{}", o),
            Path::Instance(o, i) => write!(f, "/{}/{}", o, i),
            Path::Resource(o, i, r) => write!(f, "/{}/{}/{}", o, i, r),
            Path::ResourceInstance(o, i, r, ri) => write!(f, "/{}/{}/{}/{}", o, i, r, ri),
        }
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim().trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Path::Root);
        }

        let mut ids = Vec::with_capacity(4);
        for segment in trimmed.split('/') {
            let id: u16 = segment
                .parse()
                .map_err(|_| invalid(&format!("\"{}\" is not a valid id", segment)))?;
            ids.push(id);
        }

        match ids.as_slice() {
            [o] => Ok(Path::Object(*o)),
            [o, i] => Ok(Path::Instance(*o, *i)),
            [o, i, r] => Ok(Path::Resource(*o, *i, *r)),
            [o, i, r, ri] => Ok(Path::ResourceInstance(*o, *i, *r, *ri)),
            _ => Err(invalid("a path has at most 4 components")),
        }
    }
}
