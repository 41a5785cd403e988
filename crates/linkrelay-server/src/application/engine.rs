//! RelayEngine: the entry point the transport calls for every inbound frame.
//!
//! # Frame handling order
//!
//! 1. Decode and sanity-check the frame; malformed frames are logged and
//!    dropped without a reply.
//! 2. `PING` is answered with `PONG`; `PING` and `PONG` reset the liveness
//!    counter of the connection.
//! 3. Requests the sender's role may not make are logged and dropped.
//! 4. For `REQUEST_LINK` the credential is validated.  This may await the
//!    token store, so it happens before the registry lock is taken.
//! 5. Under the lock: bind the connection to the device entry, then dispatch
//!    to the linking engine or the router.

use std::sync::Arc;

use linkrelay_core::{
    decode_inbound, DeviceId, DeviceKey, DeviceMessage, DeviceRequest, InboundMessage,
    OutboundMessage, Role,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::AuthMode;

use super::connection::{ConnectionHandle, ConnectionId};
use super::credentials::{CredentialValidator, TokenStore};
use super::linking::{self, LinkError};
use super::registry::{DeviceRegistry, RegistryEntry};
use super::{lifecycle, router};

/// Pairing state machine and relay shared by all connections.
pub struct RelayEngine {
    registry: Mutex<DeviceRegistry>,
    validator: CredentialValidator,
    auth_mode: AuthMode,
    max_missed_pongs: u32,
}

impl RelayEngine {
    /// Creates an engine with an empty registry.
    ///
    /// `max_missed_pongs` below one is raised to one.
    pub fn new(store: Arc<dyn TokenStore>, auth_mode: AuthMode, max_missed_pongs: u32) -> Self {
        Self {
            registry: Mutex::new(DeviceRegistry::new()),
            validator: CredentialValidator::new(store),
            auth_mode,
            max_missed_pongs: max_missed_pongs.max(1),
        }
    }

    /// Handles one text frame received on `conn`.
    pub async fn handle_frame(&self, conn: &ConnectionHandle, raw: &str) {
        let msg = match decode_inbound(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("connection {}: dropping frame: {e}", conn.id());
                return;
            }
        };

        match msg {
            InboundMessage::Ping => {
                self.record_activity(conn.id()).await;
                if let Err(e) = conn.send(&OutboundMessage::Pong) {
                    debug!("connection {}: pong not delivered: {e}", conn.id());
                }
            }
            InboundMessage::Pong => self.record_activity(conn.id()).await,
            InboundMessage::Device(msg) => self.handle_device_message(conn, msg, raw).await,
        }
    }

    async fn handle_device_message(&self, conn: &ConnectionHandle, msg: DeviceMessage, raw: &str) {
        let DeviceMessage {
            role,
            device_id,
            request,
        } = msg;
        let key = DeviceKey::new(role, device_id.clone());
        debug!("{key} via {}: {}", conn.id(), request.type_name());

        if !role_may_send(role, &request) {
            warn!("{key} may not send {}; dropped", request.type_name());
            return;
        }

        let authorized = match &request {
            DeviceRequest::RequestLink { access_token, .. } => {
                self.authorize(&key, access_token.as_deref()).await
            }
            _ => true,
        };

        let mut registry = self.registry.lock().await;
        registry.bind(role, &device_id, conn);

        match request {
            DeviceRequest::RequestLinkingCode => {
                linking::request_linking_code(&mut registry, &device_id);
            }
            DeviceRequest::RegisterController => {
                linking::register_controller(&mut registry, &device_id);
            }
            DeviceRequest::RequestLink {
                linking_code,
                access_token,
            } => {
                let result = if authorized {
                    linking::request_link(
                        &mut registry,
                        &device_id,
                        linking_code.as_deref(),
                        access_token,
                    )
                } else {
                    Err(LinkError::InvalidAccessToken)
                };
                if let Err(e) = result {
                    linking::reply_link_error(&registry, &device_id, &e);
                }
            }
            DeviceRequest::RequestUnlink => {
                linking::request_unlink(&mut registry, role, &device_id);
            }
            DeviceRequest::Relay { kind, data } => {
                router::route(&registry, role, &device_id, kind, data, raw);
            }
        }
    }

    /// Validates the credential and applies the configured [`AuthMode`].
    async fn authorize(&self, key: &DeviceKey, credential: Option<&str>) -> bool {
        if self.validator.validate(credential).await {
            return true;
        }
        match self.auth_mode {
            AuthMode::Strict => false,
            AuthMode::Relaxed => {
                warn!("{key}: invalid access token accepted in relaxed mode");
                true
            }
        }
    }

    async fn record_activity(&self, conn_id: ConnectionId) {
        let mut registry = self.registry.lock().await;
        lifecycle::record_activity(&mut registry, conn_id);
    }

    /// Processes the transport close of `conn_id`.
    pub async fn connection_closed(&self, conn_id: ConnectionId) {
        let mut registry = self.registry.lock().await;
        lifecycle::disconnect(&mut registry, conn_id);
    }

    /// Runs one liveness round; returns the connections that were expired.
    pub async fn liveness_sweep(&self) -> Vec<ConnectionId> {
        let mut registry = self.registry.lock().await;
        let expired = lifecycle::liveness_sweep(&mut registry, self.max_missed_pongs);
        debug!(
            "liveness sweep: {} controller(s), {} companion(s) registered",
            registry.len(Role::Controller),
            registry.len(Role::Companion)
        );
        expired
    }

    /// Returns a copy of a device's registry entry.
    pub async fn entry(&self, role: Role, id: &DeviceId) -> Option<RegistryEntry> {
        self.registry.lock().await.get(role, id).cloned()
    }
}

/// Whether a device in `role` may make `request`.
fn role_may_send(role: Role, request: &DeviceRequest) -> bool {
    match request {
        DeviceRequest::RequestLinkingCode => role == Role::Companion,
        DeviceRequest::RegisterController | DeviceRequest::RequestLink { .. } => {
            role == Role::Controller
        }
        DeviceRequest::RequestUnlink | DeviceRequest::Relay { .. } => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connection::OutboundFrame;
    use crate::application::credentials::MockTokenStore;
    use serde_json::Value;
    use tokio::sync::mpsc::Receiver;

    fn engine_with(store: MockTokenStore, mode: AuthMode) -> RelayEngine {
        RelayEngine::new(Arc::new(store), mode, 3)
    }

    fn accepting_store() -> MockTokenStore {
        let mut store = MockTokenStore::new();
        store.expect_token_exists().returning(|_, _| Ok(true));
        store
    }

    fn rejecting_store() -> MockTokenStore {
        let mut store = MockTokenStore::new();
        store.expect_token_exists().returning(|_, _| Ok(false));
        store
    }

    fn frames(rx: &mut Receiver<OutboundFrame>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(OutboundFrame::Text(text)) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    async fn linking_code(
        engine: &RelayEngine,
        conn: &ConnectionHandle,
        rx: &mut Receiver<OutboundFrame>,
    ) -> String {
        engine
            .handle_frame(
                conn,
                r#"{"type":"REQUEST_LINKING_CODE","deviceId":"C1","isCompanion":true}"#,
            )
            .await;
        frames(rx)[0]["code"].as_str().unwrap().to_string()
    }

    fn link_frame(code: &str) -> String {
        format!(
            r#"{{"type":"REQUEST_LINK","deviceId":"K1","isController":true,"linkedClientId":"{code}","accessToken":"7|secret"}}"#
        )
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        // Arrange
        let engine = engine_with(MockTokenStore::new(), AuthMode::Strict);
        let (conn, mut rx) = ConnectionHandle::new(None, 8);

        // Act
        engine.handle_frame(&conn, r#"{"type":"PING"}"#).await;

        // Assert
        assert_eq!(frames(&mut rx)[0]["type"], "PONG");
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_no_reply_and_no_entry() {
        let engine = engine_with(MockTokenStore::new(), AuthMode::Strict);
        let (conn, mut rx) = ConnectionHandle::new(None, 8);

        engine.handle_frame(&conn, "not json").await;
        engine
            .handle_frame(&conn, r#"{"type":"REQUEST_UNLINK","deviceId":"X"}"#)
            .await;

        assert!(frames(&mut rx).is_empty());
        assert!(engine.entry(Role::Companion, &DeviceId::new("X")).await.is_none());
        assert!(engine.entry(Role::Controller, &DeviceId::new("X")).await.is_none());
    }

    #[tokio::test]
    async fn test_valid_link_request_links_both_devices() {
        // Arrange
        let engine = engine_with(accepting_store(), AuthMode::Strict);
        let (c, mut crx) = ConnectionHandle::new(None, 8);
        let (k, mut krx) = ConnectionHandle::new(None, 8);
        let code = linking_code(&engine, &c, &mut crx).await;

        // Act
        engine.handle_frame(&k, &link_frame(&code)).await;

        // Assert
        let kf = frames(&mut krx);
        assert_eq!(kf[0]["type"], "LINK_CONNECTED");
        assert_eq!(kf[1]["deviceId"], "C1");
        let cf = frames(&mut crx);
        assert_eq!(cf[0]["accessToken"], "7|secret");
        let ke = engine.entry(Role::Controller, &DeviceId::new("K1")).await.unwrap();
        assert_eq!(ke.linked_to, Some(DeviceId::new("C1")));
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_in_strict_mode() {
        // Arrange
        let engine = engine_with(rejecting_store(), AuthMode::Strict);
        let (c, mut crx) = ConnectionHandle::new(None, 8);
        let (k, mut krx) = ConnectionHandle::new(None, 8);
        let code = linking_code(&engine, &c, &mut crx).await;

        // Act
        engine.handle_frame(&k, &link_frame(&code)).await;

        // Assert
        let kf = frames(&mut krx);
        assert_eq!(kf.len(), 1);
        assert_eq!(kf[0]["type"], "LINKING_ERROR");
        assert_eq!(kf[0]["message"], "Invalid access token");
        assert!(frames(&mut crx).is_empty());
        let ce = engine.entry(Role::Companion, &DeviceId::new("C1")).await.unwrap();
        assert!(ce.linked_to.is_none());
    }

    #[tokio::test]
    async fn test_invalid_token_links_anyway_in_relaxed_mode() {
        let engine = engine_with(rejecting_store(), AuthMode::Relaxed);
        let (c, mut crx) = ConnectionHandle::new(None, 8);
        let (k, _krx) = ConnectionHandle::new(None, 8);
        let code = linking_code(&engine, &c, &mut crx).await;

        engine.handle_frame(&k, &link_frame(&code)).await;

        let ce = engine.entry(Role::Companion, &DeviceId::new("C1")).await.unwrap();
        assert_eq!(ce.linked_to, Some(DeviceId::new("K1")));
    }

    #[tokio::test]
    async fn test_companion_cannot_request_link() {
        // Arrange: a store call would mean the request got past the role check
        let mut store = MockTokenStore::new();
        store.expect_token_exists().never();
        let engine = engine_with(store, AuthMode::Strict);
        let (conn, mut rx) = ConnectionHandle::new(None, 8);

        // Act
        engine
            .handle_frame(
                &conn,
                r#"{"type":"REQUEST_LINK","deviceId":"C1","isCompanion":true,"linkedClientId":"1","accessToken":"1|x"}"#,
            )
            .await;

        // Assert
        assert!(frames(&mut rx).is_empty());
        assert!(engine.entry(Role::Companion, &DeviceId::new("C1")).await.is_none());
    }

    #[tokio::test]
    async fn test_controller_cannot_request_linking_code() {
        let engine = engine_with(MockTokenStore::new(), AuthMode::Strict);
        let (conn, mut rx) = ConnectionHandle::new(None, 8);

        engine
            .handle_frame(
                &conn,
                r#"{"type":"REQUEST_LINKING_CODE","deviceId":"K1","isController":true}"#,
            )
            .await;

        assert!(frames(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_pong_resets_missed_pongs() {
        // Arrange
        let engine = engine_with(MockTokenStore::new(), AuthMode::Strict);
        let (conn, _rx) = ConnectionHandle::new(None, 8);
        engine
            .handle_frame(
                &conn,
                r#"{"type":"REGISTER_CONTROLLER","deviceId":"K1","isController":true}"#,
            )
            .await;
        engine.liveness_sweep().await;
        engine.liveness_sweep().await;

        // Act
        engine.handle_frame(&conn, r#"{"type":"PONG"}"#).await;

        // Assert
        let ke = engine.entry(Role::Controller, &DeviceId::new("K1")).await.unwrap();
        assert_eq!(ke.missed_pongs, 0);
    }

    #[tokio::test]
    async fn test_connection_closed_releases_bound_devices() {
        let engine = engine_with(MockTokenStore::new(), AuthMode::Strict);
        let (conn, _rx) = ConnectionHandle::new(None, 8);
        engine
            .handle_frame(
                &conn,
                r#"{"type":"REGISTER_CONTROLLER","deviceId":"K1","isController":true}"#,
            )
            .await;

        engine.connection_closed(conn.id()).await;

        let ke = engine.entry(Role::Controller, &DeviceId::new("K1")).await.unwrap();
        assert!(ke.connection.is_none());
    }

    #[test]
    fn test_role_may_send_matrix() {
        let link = DeviceRequest::RequestLink {
            linking_code: None,
            access_token: None,
        };
        assert!(role_may_send(Role::Controller, &link));
        assert!(!role_may_send(Role::Companion, &link));
        assert!(role_may_send(Role::Companion, &DeviceRequest::RequestLinkingCode));
        assert!(!role_may_send(Role::Controller, &DeviceRequest::RequestLinkingCode));
        assert!(!role_may_send(Role::Companion, &DeviceRequest::RegisterController));
        assert!(role_may_send(Role::Companion, &DeviceRequest::RequestUnlink));
    }
}
