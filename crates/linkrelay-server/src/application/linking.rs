//! Linking engine: issuing and redeeming linking codes, unlinking, and
//! automatic relink of devices that remember each other.
//!
//! All operations run under the registry lock and only queue frames; none of
//! them await.

use linkrelay_core::{DeviceId, DeviceKey, LinkingCode, OutboundMessage, Role};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::connection::notify;
use super::registry::DeviceRegistry;

/// Requester-facing link failures.  `Display` is the `LINKING_ERROR` text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Invalid access token")]
    InvalidAccessToken,

    #[error("No linked client id provided")]
    MissingLinkingCode,

    #[error("No companion found with that linking code")]
    UnknownLinkingCode,
}

/// Result of an automatic relink attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelinkOutcome {
    Relinked,
    /// The device has never been linked.
    NoMemory,
    /// The device is currently linked to someone other than its last peer.
    AlreadyLinked,
    /// The remembered peer has no registry entry.
    PeerMissing,
    /// The remembered peer was last linked to someone else.
    NotMutual,
    /// The remembered peer is linked to another device right now.
    PeerBusy,
}

/// Companion asks for its code: reply `LINKING_CODE`, then try to relink.
pub fn request_linking_code(registry: &mut DeviceRegistry, companion: &DeviceId) {
    let key = DeviceKey::new(Role::Companion, companion.clone());
    match registry.issue_linking_code(companion) {
        Some(code) => {
            let conn = registry
                .get(Role::Companion, companion)
                .and_then(|e| e.connection.as_ref());
            notify(
                conn,
                &OutboundMessage::LinkingCode {
                    code: code.as_str().to_string(),
                },
                &key,
            );
        }
        None => error!("{key}: no linking code available"),
    }
    try_relink(registry, Role::Companion, companion);
}

/// Controller announces itself; registration itself happened on bind.
pub fn register_controller(registry: &mut DeviceRegistry, controller: &DeviceId) {
    info!("controller {} registered", controller.short());
    try_relink(registry, Role::Controller, controller);
}

/// Re-establishes the link between `id` and its last peer when both
/// remember each other and neither is linked elsewhere.
pub fn try_relink(registry: &mut DeviceRegistry, role: Role, id: &DeviceId) -> RelinkOutcome {
    let key = DeviceKey::new(role, id.clone());
    let Some(entry) = registry.get(role, id) else {
        return RelinkOutcome::NoMemory;
    };
    let Some(peer_id) = entry.last_known_linked_to.clone() else {
        return RelinkOutcome::NoMemory;
    };
    if entry.linked_to.as_ref().is_some_and(|current| *current != peer_id) {
        return RelinkOutcome::AlreadyLinked;
    }

    let peer_key = DeviceKey::new(role.peer(), peer_id);
    let Some(peer) = registry.get(peer_key.role, &peer_key.device_id) else {
        debug!("{key}: last peer {peer_key} is unknown");
        return RelinkOutcome::PeerMissing;
    };
    if peer.last_known_linked_to.as_ref() != Some(id) {
        debug!("{key}: {peer_key} no longer remembers this device");
        return RelinkOutcome::NotMutual;
    }
    if peer.linked_to.as_ref().is_some_and(|current| current != id) {
        info!("{key}: {peer_key} is linked elsewhere; not relinking");
        return RelinkOutcome::PeerBusy;
    }

    if let Some(entry) = registry.get_mut(role, id) {
        entry.linked_to = Some(peer_key.device_id.clone());
    }
    if let Some(peer) = registry.get_mut(peer_key.role, &peer_key.device_id) {
        peer.linked_to = Some(id.clone());
    }

    let (controller, companion) = match role {
        Role::Controller => (key, peer_key),
        Role::Companion => (peer_key, key),
    };
    announce_relink(registry, &controller, &companion);
    RelinkOutcome::Relinked
}

fn announce_relink(registry: &DeviceRegistry, controller: &DeviceKey, companion: &DeviceKey) {
    let controller_entry = registry.get(controller.role, &controller.device_id);
    let companion_entry = registry.get(companion.role, &companion.device_id);
    let controller_conn = controller_entry.and_then(|e| e.connection.as_ref());
    let companion_conn = companion_entry.and_then(|e| e.connection.as_ref());
    let access_token = controller_entry.and_then(|e| e.access_token.clone());

    notify(companion_conn, &OutboundMessage::LinkConnected, companion);
    notify(controller_conn, &OutboundMessage::LinkConnected, controller);
    notify(
        companion_conn,
        &OutboundMessage::LinkSuccess {
            device_id: controller.device_id.to_string(),
            access_token,
        },
        companion,
    );
    notify(controller_conn, &OutboundMessage::RequestFoodData, controller);
    info!("relinked {controller} with {companion}");
}

/// Controller redeems a linking code.
///
/// The credential must already have been checked.  On success both devices
/// are linked to each other and remember it; any other partner either of them
/// had is dropped and told `LINK_DISCONNECTED`.
pub fn request_link(
    registry: &mut DeviceRegistry,
    controller: &DeviceId,
    linking_code: Option<&str>,
    access_token: Option<String>,
) -> Result<(), LinkError> {
    let code = linking_code
        .and_then(LinkingCode::parse)
        .ok_or(LinkError::MissingLinkingCode)?;
    let companion = registry
        .companion_for_code(&code)
        .cloned()
        .ok_or(LinkError::UnknownLinkingCode)?;

    displace(registry, Role::Controller, controller, &companion);
    displace(registry, Role::Companion, &companion, controller);

    if let Some(entry) = registry.get_mut(Role::Controller, controller) {
        entry.linked_to = Some(companion.clone());
        entry.last_known_linked_to = Some(companion.clone());
        if access_token.is_some() {
            entry.access_token = access_token.clone();
        }
    }
    if let Some(entry) = registry.get_mut(Role::Companion, &companion) {
        entry.linked_to = Some(controller.clone());
        entry.last_known_linked_to = Some(controller.clone());
    }

    let controller_key = DeviceKey::new(Role::Controller, controller.clone());
    let companion_key = DeviceKey::new(Role::Companion, companion.clone());
    let controller_conn = registry
        .get(Role::Controller, controller)
        .and_then(|e| e.connection.as_ref());
    let companion_conn = registry
        .get(Role::Companion, &companion)
        .and_then(|e| e.connection.as_ref());

    notify(controller_conn, &OutboundMessage::LinkConnected, &controller_key);
    notify(
        controller_conn,
        &OutboundMessage::LinkSuccess {
            device_id: companion.to_string(),
            access_token: None,
        },
        &controller_key,
    );
    notify(
        companion_conn,
        &OutboundMessage::LinkSuccess {
            device_id: controller.to_string(),
            access_token,
        },
        &companion_key,
    );
    notify(companion_conn, &OutboundMessage::LinkConnected, &companion_key);

    info!("linked {controller_key} with {companion_key} via code {code}");
    Ok(())
}

/// Drops `id`'s current partner unless it is `keep`.
fn displace(registry: &mut DeviceRegistry, role: Role, id: &DeviceId, keep: &DeviceId) {
    let Some(entry) = registry.get_mut(role, id) else {
        return;
    };
    if entry.linked_to.as_ref().map_or(true, |current| current == keep) {
        return;
    }
    let Some(old) = entry.linked_to.take() else {
        return;
    };

    let old_key = DeviceKey::new(role.peer(), old);
    if let Some(old_entry) = registry.get_mut(old_key.role, &old_key.device_id) {
        if old_entry.linked_to.as_ref() == Some(id) {
            old_entry.linked_to = None;
            notify(
                old_entry.connection.as_ref(),
                &OutboundMessage::LinkDisconnected,
                &old_key,
            );
        }
    }
    info!("{} {}: previous partner {old_key} displaced", role, id.short());
}

/// Sends `LINKING_ERROR` to the requesting controller.
pub fn reply_link_error(registry: &DeviceRegistry, controller: &DeviceId, err: &LinkError) {
    let key = DeviceKey::new(Role::Controller, controller.clone());
    warn!("{key}: link request failed: {err}");
    let conn = registry
        .get(Role::Controller, controller)
        .and_then(|e| e.connection.as_ref());
    notify(conn, &OutboundMessage::linking_error(err.to_string()), &key);
}

/// Tears down a mutual link.  Returns `false` (and changes nothing) when the
/// device is not in a mutual link.
pub fn request_unlink(registry: &mut DeviceRegistry, role: Role, id: &DeviceId) -> bool {
    let key = DeviceKey::new(role, id.clone());
    let Some(peer_id) = registry.get(role, id).and_then(|e| e.linked_to.clone()) else {
        info!("{key}: unlink requested while not linked");
        return false;
    };
    let peer_key = DeviceKey::new(role.peer(), peer_id);
    let mutual = registry
        .get(peer_key.role, &peer_key.device_id)
        .is_some_and(|p| p.linked_to.as_ref() == Some(id));
    if !mutual {
        warn!("{key}: unlink requested but {peer_key} does not link back");
        return false;
    }

    if let Some(entry) = registry.get_mut(role, id) {
        entry.linked_to = None;
    }
    if let Some(peer) = registry.get_mut(peer_key.role, &peer_key.device_id) {
        peer.linked_to = None;
    }

    let own_conn = registry.get(role, id).and_then(|e| e.connection.as_ref());
    let peer_conn = registry
        .get(peer_key.role, &peer_key.device_id)
        .and_then(|e| e.connection.as_ref());
    notify(own_conn, &OutboundMessage::UnlinkSuccess, &key);
    notify(peer_conn, &OutboundMessage::UnlinkSuccess, &peer_key);
    info!("unlinked {key} from {peer_key}");
    true
}

// ── Tests ─────────────────────────────────────────────────────────────────────
