//! Infrastructure layer for linkrelay-server.
//!
//! - Binding the TCP listener and performing the WebSocket handshake
//! - Per-connection reader and writer tasks
//! - The periodic liveness sweep
//! - The MySQL-backed personal access token store

pub mod token_store;
pub mod ws_server;

pub use token_store::{SqlTokenStore, UnconfiguredTokenStore};
pub use ws_server::{run_server, serve};
