//! Configuration for the node composition root (§6 "Environment-like
//! configuration").

use std::path::PathBuf;

use yapyap_core::PeerId;
use yapyap_router::{ConfigWarning, RouterConfig};

/// Configuration for a [`crate::YapyapNode`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Base directory for the node's SQLite database file.
    pub data_dir: PathBuf,
    /// Router pipeline tunables (backoff, relay escalation, rate limits, ...).
    pub router: RouterConfig,
    /// Control-plane port an external HTTP/WebSocket front end would bind to.
    /// Not served by this crate; carried so a front end can read it from the
    /// same configuration surface (§6).
    pub control_plane_port: u16,
    /// How many times to auto-increment `control_plane_port` on conflict,
    /// before giving up (§6).
    pub control_plane_port_retries: u8,
    /// Bootstrap peers, padded into relay candidate selection when the
    /// routing cache is thin (mirrors `router.fallback_relays`; kept
    /// separate so CLI/config-file parsing has one field to populate).
    pub bootstrap_peers: Vec<PeerId>,
    /// Capacity of the broadcast channel `subscribe_events` hands out.
    pub event_channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::with_data_dir("./yapyap-data")
    }
}

impl NodeConfig {
    /// Create a configuration rooted at a custom data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            router: RouterConfig::default(),
            control_plane_port: 3000,
            control_plane_port_retries: 5,
            bootstrap_peers: Vec::new(),
            event_channel_capacity: 1024,
        }
    }

    pub fn with_router_config(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    pub fn with_control_plane_port(mut self, port: u16) -> Self {
        self.control_plane_port = port;
        self
    }

    pub fn with_bootstrap_peers(mut self, peers: Vec<PeerId>) -> Self {
        self.bootstrap_peers = peers;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Path to the node's SQLite database file, under `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("yapyap.sqlite3")
    }

    /// Validate this configuration, folding in the router's own warnings
    /// (`indras_dtn::DtnConfig::validate`'s style: a list of warnings, not a
    /// hard failure, since every flagged value still compiles and runs).
    pub fn validate(&self) -> Vec<ConfigWarning> {
        self.router.validate()
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_warnings() {
        assert!(NodeConfig::default().is_valid());
    }

    #[test]
    fn with_data_dir_derives_database_path() {
        let config = NodeConfig::with_data_dir("/tmp/example");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/example/yapyap.sqlite3"));
    }

    #[test]
    fn builder_methods_chain() {
        let config = NodeConfig::with_data_dir("/tmp/example")
            .with_control_plane_port(4000)
            .with_event_channel_capacity(64);
        assert_eq!(config.control_plane_port, 4000);
        assert_eq!(config.event_channel_capacity, 64);
    }
}
