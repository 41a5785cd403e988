//! Message router: forwards application messages to the sender's linked peer.

use linkrelay_core::{DeviceId, DeviceKey, OutboundMessage, RelayKind, Role};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::registry::DeviceRegistry;

/// Forwards a relay message from `sender` to its linked peer.
///
/// `raw` is the frame text exactly as received; verbatim kinds
/// (`FOOD_DATA`) are re-sent as-is.  Returns whether the frame was queued.
/// Every miss is logged and otherwise silent.
pub fn route(
    registry: &DeviceRegistry,
    role: Role,
    sender: &DeviceId,
    kind: RelayKind,
    data: Option<Value>,
    raw: &str,
) -> bool {
    let key = DeviceKey::new(role, sender.clone());
    let kind_name = kind.message_type().as_str();

    let Some(peer_id) = registry.get(role, sender).and_then(|e| e.linked_to.as_ref()) else {
        info!("{key} is not linked; {kind_name} dropped");
        return false;
    };
    let peer_key = DeviceKey::new(role.peer(), peer_id.clone());
    let Some(peer) = registry.get(peer_key.role, &peer_key.device_id) else {
        warn!("{key}: linked peer {peer_key} not found; {kind_name} dropped");
        return false;
    };
    if peer.linked_to.as_ref() != Some(sender) {
        warn!("{key}: {peer_key} does not link back; {kind_name} dropped");
        return false;
    }
    let Some(conn) = peer.connection.as_ref() else {
        info!("{peer_key} is offline; {kind_name} from {key} dropped");
        return false;
    };

    let sent = if kind.is_verbatim() {
        conn.send_text(raw.to_string())
    } else {
        conn.send(&OutboundMessage::relay(kind, data))
    };
    match sent {
        Ok(()) => {
            debug!("{key} → {peer_key}: {kind_name}");
            true
        }
        Err(e) => {
            warn!("{kind_name} from {key} to {peer_key} not delivered: {e}");
            false
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
