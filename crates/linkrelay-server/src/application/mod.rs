//! Application layer for linkrelay-server.
//!
//! Owns the pairing state and decides what every inbound frame does.  It
//! never opens sockets: outbound frames are queued on a
//! [`ConnectionHandle`], and credential lookups go through the
//! [`TokenStore`] trait.
//!
//! - `registry`    – controller/companion tables and their reverse indexes
//! - `lifecycle`   – transport close and liveness
//! - `linking`     – linking codes, link, unlink, auto-relink
//! - `router`      – relay of application messages to the linked peer
//! - `credentials` – bearer token validation with an affirmative cache
//! - `engine`      – per-frame entry point tying the above together

pub mod connection;
pub mod credentials;
pub mod engine;
pub mod lifecycle;
pub mod linking;
pub mod registry;
pub mod router;

pub use connection::{ConnectionHandle, ConnectionId, OutboundFrame, SendError};
pub use credentials::{token_digest, CredentialValidator, TokenStore, TokenStoreError};
pub use engine::RelayEngine;
pub use linking::{LinkError, RelinkOutcome};
pub use registry::{DeviceRegistry, RegistryEntry};
