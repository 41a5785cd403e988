//! In-memory device registry.
//!
//! Two tables, one per role, keyed by device id.  Entries are created the
//! first time a device sends anything and are never removed, so the memory of
//! a device's last partner outlives disconnects and enables auto-relink.
//!
//! Two secondary indexes avoid linear scans:
//!
//! - `by_connection`: connection id → device keys currently bound to it, used
//!   when a transport closes and by the liveness sweep;
//! - `linking_codes`: issued code → companion id, used when a controller
//!   redeems a code.

use std::collections::HashMap;

use linkrelay_core::{DeviceId, DeviceKey, LinkingCode, Role};
use tracing::{debug, info};

use super::connection::{ConnectionHandle, ConnectionId};

/// Pairing state held for one device.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub device_id: DeviceId,
    /// The connection this device most recently sent through, if still open.
    pub connection: Option<ConnectionHandle>,
    /// Current peer in the other table.
    pub linked_to: Option<DeviceId>,
    /// Most recent peer; survives unlink and disconnect.
    pub last_known_linked_to: Option<DeviceId>,
    /// Companions only.
    pub linking_code: Option<LinkingCode>,
    /// Controllers only: credential presented on the last successful link.
    pub access_token: Option<String>,
    /// Liveness probes sent since the connection last spoke.
    pub missed_pongs: u32,
}

impl RegistryEntry {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            connection: None,
            linked_to: None,
            last_known_linked_to: None,
            linking_code: None,
            access_token: None,
            missed_pongs: 0,
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }
}

/// Controller and companion tables plus their reverse indexes.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    controllers: HashMap<DeviceId, RegistryEntry>,
    companions: HashMap<DeviceId, RegistryEntry>,
    by_connection: HashMap<ConnectionId, Vec<DeviceKey>>,
    linking_codes: HashMap<LinkingCode, DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, role: Role) -> &HashMap<DeviceId, RegistryEntry> {
        match role {
            Role::Controller => &self.controllers,
            Role::Companion => &self.companions,
        }
    }

    fn table_mut(&mut self, role: Role) -> &mut HashMap<DeviceId, RegistryEntry> {
        match role {
            Role::Controller => &mut self.controllers,
            Role::Companion => &mut self.companions,
        }
    }

    pub fn get(&self, role: Role, id: &DeviceId) -> Option<&RegistryEntry> {
        self.table(role).get(id)
    }

    pub fn get_mut(&mut self, role: Role, id: &DeviceId) -> Option<&mut RegistryEntry> {
        self.table_mut(role).get_mut(id)
    }

    /// Number of entries in the table for `role`.
    pub fn len(&self, role: Role) -> usize {
        self.table(role).len()
    }

    /// Binds `conn` to the device, creating its entry on first sight.
    ///
    /// The previous connection, if different, loses this device from its
    /// index entry, so a late close of that connection leaves the new binding
    /// alone.  Resets the liveness counter.
    pub fn bind(
        &mut self,
        role: Role,
        id: &DeviceId,
        conn: &ConnectionHandle,
    ) -> &mut RegistryEntry {
        let key = DeviceKey::new(role, id.clone());
        let previous = self.get(role, id).and_then(RegistryEntry::connection_id);

        match previous {
            Some(prev) if prev == conn.id() => {}
            Some(prev) => {
                info!("{key} moved from connection {prev} to {}", conn.id());
                self.unindex(prev, &key);
                self.index(conn.id(), key);
            }
            None => {
                let peer = conn
                    .peer()
                    .map_or_else(|| "unknown peer".to_string(), |addr| addr.to_string());
                debug!("{key} bound to connection {} ({peer})", conn.id());
                self.index(conn.id(), key);
            }
        }

        let entry = self
            .table_mut(role)
            .entry(id.clone())
            .or_insert_with(|| RegistryEntry::new(id.clone()));
        entry.connection = Some(conn.clone());
        entry.missed_pongs = 0;
        entry
    }

    fn index(&mut self, conn_id: ConnectionId, key: DeviceKey) {
        let keys = self.by_connection.entry(conn_id).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    fn unindex(&mut self, conn_id: ConnectionId, key: &DeviceKey) {
        if let Some(keys) = self.by_connection.get_mut(&conn_id) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.by_connection.remove(&conn_id);
            }
        }
    }

    /// Device keys currently bound to `conn_id`.
    pub fn devices_on(&self, conn_id: ConnectionId) -> &[DeviceKey] {
        self.by_connection
            .get(&conn_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Removes and returns the index entry for `conn_id`.
    pub fn take_connection(&mut self, conn_id: ConnectionId) -> Vec<DeviceKey> {
        self.by_connection.remove(&conn_id).unwrap_or_default()
    }

    /// Ids of every connection with at least one bound device.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.by_connection.keys().copied().collect()
    }

    pub fn companion_for_code(&self, code: &LinkingCode) -> Option<&DeviceId> {
        self.linking_codes.get(code)
    }

    /// Returns the companion's linking code, generating one on first request.
    ///
    /// `None` if the companion has no entry or no free code could be found.
    pub fn issue_linking_code(&mut self, companion: &DeviceId) -> Option<LinkingCode> {
        let entry = self.companions.get(companion)?;
        if let Some(code) = &entry.linking_code {
            return Some(code.clone());
        }

        let codes = &self.linking_codes;
        let code = LinkingCode::generate_unique(|candidate| codes.contains_key(candidate))?;
        self.linking_codes.insert(code.clone(), companion.clone());
        if let Some(entry) = self.companions.get_mut(companion) {
            entry.linking_code = Some(code.clone());
        }
        Some(code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
