//! Device identity and role.
//!
//! A device identifies itself with an opaque, client-generated string that is
//! stable across reconnects and app restarts.  The server never invents one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of leading characters of a device id shown in log output.
const SHORT_ID_LEN: usize = 8;

/// Opaque identity a device supplies on every message (`deviceId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first eight characters, for log lines.
    ///
    /// Device ids are typically long UUID-like strings; the prefix is enough
    /// to tell devices apart while keeping logs readable.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which side of a link a device plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Drives the session and redeems linking codes.
    Controller,
    /// Advertises a linking code, mirrors the controller and reports selections.
    Companion,
}

impl Role {
    /// The role on the other end of a link.
    pub fn peer(self) -> Role {
        match self {
            Role::Controller => Role::Companion,
            Role::Companion => Role::Controller,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Controller => f.write_str("controller"),
            Role::Companion => f.write_str("companion"),
        }
    }
}

/// A device id qualified by its role; controllers and companions live in
/// separate tables, so the same id may exist once per role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub role: Role,
    pub device_id: DeviceId,
}

impl DeviceKey {
    pub fn new(role: Role, device_id: DeviceId) -> Self {
        Self { role, device_id }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.device_id.short())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
