//! Shared fixtures for the linkrelay-server integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use linkrelay_server::application::{
    token_digest, ConnectionHandle, OutboundFrame, RelayEngine, TokenStore, TokenStoreError,
};
use linkrelay_server::domain::AuthMode;
use serde_json::{json, Value};
use tokio::sync::mpsc::Receiver;

/// Valid credential accepted by [`StaticTokenStore::with_default_token`].
pub const TOKEN: &str = "7|s3cret";

/// In-memory token table that counts lookups.
#[derive(Default)]
pub struct StaticTokenStore {
    rows: HashSet<(String, String)>,
    lookups: AtomicUsize,
}

impl StaticTokenStore {
    pub fn with_default_token() -> Self {
        let mut store = Self::default();
        store.rows.insert(("7".to_string(), token_digest("s3cret")));
        store
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for StaticTokenStore {
    async fn token_exists(&self, token_id: &str, digest: &str) -> Result<bool, TokenStoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .contains(&(token_id.to_string(), digest.to_string())))
    }
}

pub fn engine() -> (Arc<RelayEngine>, Arc<StaticTokenStore>) {
    let store = Arc::new(StaticTokenStore::with_default_token());
    let engine = RelayEngine::new(
        Arc::clone(&store) as Arc<dyn TokenStore>,
        AuthMode::Strict,
        3,
    );
    (Arc::new(engine), store)
}

/// A simulated device: one connection plus the frames queued for it.
pub struct Device {
    pub id: &'static str,
    pub companion: bool,
    pub conn: ConnectionHandle,
    rx: Receiver<OutboundFrame>,
}

impl Device {
    pub fn companion(id: &'static str) -> Self {
        Self::new(id, true)
    }

    pub fn controller(id: &'static str) -> Self {
        Self::new(id, false)
    }

    fn new(id: &'static str, companion: bool) -> Self {
        let (conn, rx) = ConnectionHandle::new(None, 64);
        Self {
            id,
            companion,
            conn,
            rx,
        }
    }

    /// Same device on a fresh connection.
    pub fn reconnect(&self) -> Self {
        Self::new(self.id, self.companion)
    }

    /// Builds a frame carrying this device's id and role flag.
    pub fn frame(&self, ty: &str, extra: Value) -> String {
        let mut v = json!({"type": ty, "deviceId": self.id});
        let flag = if self.companion { "isCompanion" } else { "isController" };
        v[flag] = json!(true);
        if let Value::Object(fields) = extra {
            for (k, val) in fields {
                v[k.as_str()] = val;
            }
        }
        v.to_string()
    }

    pub async fn send(&self, engine: &RelayEngine, ty: &str, extra: Value) {
        engine.handle_frame(&self.conn, &self.frame(ty, extra)).await;
    }

    pub async fn send_raw(&self, engine: &RelayEngine, raw: &str) {
        engine.handle_frame(&self.conn, raw).await;
    }

    /// Drains queued text frames.
    pub fn texts(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                out.push(text);
            }
        }
        out
    }

    pub fn frames(&mut self) -> Vec<Value> {
        self.texts()
            .iter()
            .map(|t| serde_json::from_str(t).expect("server frames are JSON"))
            .collect()
    }

    pub fn types(&mut self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub async fn close(&self, engine: &RelayEngine) {
        engine.connection_closed(self.conn.id()).await;
    }
}

/// Companion requests its code; returns it.
pub async fn request_code(engine: &RelayEngine, companion: &mut Device) -> String {
    companion.send(engine, "REQUEST_LINKING_CODE", json!({})).await;
    let frames = companion.frames();
    let frame = frames
        .iter()
        .find(|f| f["type"] == "LINKING_CODE")
        .expect("LINKING_CODE reply");
    frame["code"].as_str().unwrap_or_default().to_string()
}

/// Full happy-path link of `controller` with `companion`; drains both.
pub async fn link(engine: &RelayEngine, controller: &mut Device, companion: &mut Device) {
    let code = request_code(engine, companion).await;
    controller
        .send(
            engine,
            "REQUEST_LINK",
            json!({"linkedClientId": code, "accessToken": TOKEN}),
        )
        .await;
    controller.frames();
    companion.frames();
}
