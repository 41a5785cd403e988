//! Domain layer for linkrelay-server.
//!
//! Plain configuration types.  Populating them from CLI arguments or the
//! environment is the binary's job.

pub mod config;

pub use config::{AuthMode, ServerConfig};
