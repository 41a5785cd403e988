//! linkrelay-server library crate.
//!
//! Pairs controller devices with companion devices over long-lived WebSocket
//! connections and relays application messages between linked pairs.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Devices (JSON over WebSocket)
//!         ↕
//! [linkrelay-server]
//!   ├── domain/           ServerConfig, AuthMode
//!   ├── application/      Registry, linking, routing, lifecycle, credentials
//!   └── infrastructure/
//!         ├── ws_server/   WebSocket accept loop (tokio-tungstenite)
//!         └── token_store/ MySQL personal-access-token lookup (sqlx)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `linkrelay-core`; the only I/O it
//!   knows about is the [`application::TokenStore`] trait and the outbound
//!   queue of each connection.
//! - `infrastructure` owns sockets, the database pool and task spawning.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: pairing state machine and message relay.
pub mod application;

/// Infrastructure layer: WebSocket server and credential store.
pub mod infrastructure;
