//! Identity of the party issuing an operation

/// Role under which an operation is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Regular LWM2M server
    Management,
    /// LWM2M bootstrap server, only legal on a bootstrap session
    Bootstrap,
    /// The device itself, exempt from peer-facing restrictions
    System,
}

/// Peer attached to an inbound operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    role: PeerRole,
    short_server_id: Option<u16>,
}

impl Peer {
    pub fn system() -> Self {
        Self {
            role: PeerRole::System,
            short_server_id: None,
        }
    }

    pub fn bootstrap() -> Self {
        Self {
            role: PeerRole::Bootstrap,
            short_server_id: None,
        }
    }

    pub fn management(short_server_id: u16) -> Self {
        Self {
            role: PeerRole::Management,
            short_server_id: Some(short_server_id),
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn short_server_id(&self) -> Option<u16> {
        self.short_server_id
    }

    pub fn is_system(&self) -> bool {
        self.role == PeerRole::System
    }

    pub fn is_bootstrap(&self) -> bool {
        self.role == PeerRole::Bootstrap
    }

    pub fn is_management(&self) -> bool {
        self.role == PeerRole::Management
    }
}
