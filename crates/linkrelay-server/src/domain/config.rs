//! Server configuration types.
//!
//! [`ServerConfig`] holds every runtime setting.  It is built once at startup
//! from CLI arguments (see `main.rs`) or from [`Default`] in tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// How a failed credential check on `REQUEST_LINK` is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Reject the link with `LINKING_ERROR`.
    #[default]
    Strict,
    /// Log the failure and link anyway.  Intended for development backends
    /// without a token table.
    Relaxed,
}

/// All runtime configuration for the pairing server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port the WebSocket listener binds to.
    ///
    /// TLS is expected to terminate in front of this listener.
    pub bind_addr: SocketAddr,

    /// MySQL connection URL for the personal access token table.
    ///
    /// When absent every token lookup fails, so only tokens already in the
    /// cache (none, after a restart) are accepted in strict mode.
    pub database_url: Option<String>,

    pub auth_mode: AuthMode,

    /// How often every connected device is sent a `PING`.  `None` disables
    /// the liveness sweep.
    pub ping_interval: Option<Duration>,

    /// Unanswered sweeps after which a connection is treated as closed.
    pub max_missed_pongs: u32,

    /// Capacity of each connection's outbound frame queue.
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    /// | Field            | Default        |
    /// |------------------|----------------|
    /// | bind_addr        | `0.0.0.0:443`  |
    /// | database_url     | none           |
    /// | auth_mode        | strict         |
    /// | ping_interval    | 30 seconds     |
    /// | max_missed_pongs | 3              |
    /// | outbound_buffer  | 256 frames     |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 443)),
            database_url: None,
            auth_mode: AuthMode::Strict,
            ping_interval: Some(Duration::from_secs(30)),
            max_missed_pongs: 3,
            outbound_buffer: 256,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_443() {
        // Arrange / Act
        let cfg = ServerConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 443);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        let cfg = ServerConfig::default();
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_auth_mode_is_strict() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.auth_mode, AuthMode::Strict);
    }

    #[test]
    fn test_default_has_no_database() {
        let cfg = ServerConfig::default();
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn test_default_ping_interval_is_30s() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.ping_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_default_max_missed_pongs_is_3() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_missed_pongs, 3);
    }

    #[test]
    fn test_default_outbound_buffer_is_256() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.outbound_buffer, 256);
    }
}
