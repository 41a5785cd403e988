//! Connection lifecycle: transport close and liveness.
//!
//! Closing a connection suspends the links of the devices bound to it.  The
//! entries themselves stay in the registry with their `last_known_linked_to`
//! intact, so the pair can relink when both sides return.

use linkrelay_core::{DeviceKey, OutboundMessage};
use tracing::{debug, info, warn};

use super::connection::{notify, ConnectionId};
use super::registry::DeviceRegistry;

/// Processes the close of `conn_id`.  Returns the number of devices that were
/// still bound to it.
///
/// A close of a connection the device has already moved away from finds no
/// index entry and changes nothing.
pub fn disconnect(registry: &mut DeviceRegistry, conn_id: ConnectionId) -> usize {
    let keys = registry.take_connection(conn_id);
    let mut released = 0;
    for key in keys {
        if release(registry, &key, conn_id) {
            released += 1;
        }
    }
    if released > 0 {
        info!("connection {conn_id} closed; released {released} device(s)");
    }
    released
}

fn release(registry: &mut DeviceRegistry, key: &DeviceKey, conn_id: ConnectionId) -> bool {
    let Some(entry) = registry.get_mut(key.role, &key.device_id) else {
        return false;
    };
    if entry.connection_id() != Some(conn_id) {
        debug!("{key}: ignoring close of stale connection {conn_id}");
        return false;
    }

    notify(entry.connection.as_ref(), &OutboundMessage::LinkDisconnected, key);
    entry.connection = None;
    entry.missed_pongs = 0;
    let Some(peer_id) = entry.linked_to.take() else {
        return true;
    };

    let peer_key = DeviceKey::new(key.role.peer(), peer_id);
    match registry.get_mut(peer_key.role, &peer_key.device_id) {
        Some(peer) if peer.linked_to.as_ref() == Some(&key.device_id) => {
            peer.linked_to = None;
            notify(peer.connection.as_ref(), &OutboundMessage::LinkDisconnected, &peer_key);
            info!("{key} disconnected; link with {peer_key} suspended");
        }
        _ => warn!("{key} was linked to {peer_key}, which did not link back"),
    }
    true
}

/// Marks every device on `conn_id` as alive.
pub fn record_activity(registry: &mut DeviceRegistry, conn_id: ConnectionId) {
    let keys = registry.devices_on(conn_id).to_vec();
    for key in keys {
        if let Some(entry) = registry.get_mut(key.role, &key.device_id) {
            entry.missed_pongs = 0;
        }
    }
}

/// Runs one liveness round.
///
/// Connections whose devices have `max_missed` unanswered probes are treated
/// as closed and asked to shut down; every other connection is sent a `PING`
/// and its devices' counters are incremented.  Returns the expired
/// connections.
pub fn liveness_sweep(registry: &mut DeviceRegistry, max_missed: u32) -> Vec<ConnectionId> {
    let mut expired = Vec::new();

    for conn_id in registry.connection_ids() {
        let keys = registry.devices_on(conn_id).to_vec();
        let Some(handle) = keys
            .iter()
            .filter_map(|k| registry.get(k.role, &k.device_id))
            .find_map(|e| e.connection.clone())
        else {
            continue;
        };
        let missed = keys
            .iter()
            .filter_map(|k| registry.get(k.role, &k.device_id))
            .map(|e| e.missed_pongs)
            .max()
            .unwrap_or(0);

        if missed >= max_missed {
            warn!("connection {conn_id} missed {missed} pings; closing");
            disconnect(registry, conn_id);
            handle.close();
            expired.push(conn_id);
            continue;
        }

        if let Err(e) = handle.send(&OutboundMessage::Ping) {
            debug!("ping to {conn_id} not delivered: {e}");
        }
        for key in &keys {
            if let Some(entry) = registry.get_mut(key.role, &key.device_id) {
                entry.missed_pongs += 1;
            }
        }
    }

    expired
}

// ── Tests ─────────────────────────────────────────────────────────────────────
