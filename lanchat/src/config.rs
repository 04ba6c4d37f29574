//! Load config from file and environment.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanchat_core::{Credentials, MULTICAST_GROUP, MULTICAST_PORT, SERVER_PORT};
use serde::Deserialize;
use tracing::{debug, warn};

/// Chat configuration. File: ~/.config/lanchat/config.toml or /etc/lanchat/config.toml.
/// Env overrides: LANCHAT_SERVER_PORT, LANCHAT_DISCOVERY_PORT, LANCHAT_NAME,
/// LANCHAT_DISCOVERY_TIMEOUT_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server TCP port (default 22222).
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Multicast group for announcements (default 239.255.255.250).
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Discovery UDP port (default 1900).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_announce_interval_secs")]
    pub announce_interval_secs: u64,
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
    /// How long a client waits for an announcement. 0 waits forever.
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Sender name. Defaults to "server" for the server and $USER for clients.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Reject incoming frames whose checksum does not match.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,
    /// Consecutive read errors tolerated before a session is closed.
    #[serde(default = "default_max_recv_retries")]
    pub max_recv_retries: u32,
}

fn default_server_port() -> u16 {
    SERVER_PORT
}
fn default_multicast_group() -> Ipv4Addr {
    MULTICAST_GROUP
}
fn default_discovery_port() -> u16 {
    MULTICAST_PORT
}
fn default_announce_interval_secs() -> u64 {
    5
}
fn default_multicast_ttl() -> u32 {
    1
}
fn default_discovery_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_username() -> String {
    lanchat_core::identity::EXPECTED_USERNAME.to_string()
}
fn default_password() -> String {
    lanchat_core::identity::EXPECTED_PASSWORD.to_string()
}
fn default_verify_checksum() -> bool {
    true
}
fn default_max_recv_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: default_server_port(),
            multicast_group: default_multicast_group(),
            discovery_port: default_discovery_port(),
            announce_interval_secs: default_announce_interval_secs(),
            multicast_ttl: default_multicast_ttl(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            name: None,
            username: default_username(),
            password: default_password(),
            verify_checksum: default_verify_checksum(),
            max_recv_retries: default_max_recv_retries(),
        }
    }
}

impl Config {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs.max(1))
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        match self.discovery_timeout_secs {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

/// Load config: an explicit path wins; otherwise merge default, config file (if present), then env vars.
pub fn load(explicit: Option<&Path>) -> Config {
    let mut c = match explicit {
        Some(path) => read_file(path),
        None => config_paths().into_iter().find(|p| p.exists()).and_then(|p| read_file(&p)),
    }
    .unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

/// Apply `LANCHAT_*` overrides. Unparsable values are ignored.
pub fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("LANCHAT_SERVER_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.server_port = p;
    }
    if let Some(p) = var("LANCHAT_DISCOVERY_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.discovery_port = p;
    }
    if let Some(t) = var("LANCHAT_DISCOVERY_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
        c.discovery_timeout_secs = t;
    }
    if let Some(name) = var("LANCHAT_NAME").filter(|s| !s.is_empty()) {
        c.name = Some(name);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/lanchat/config.toml"));
    }
    out.push(PathBuf::from("/etc/lanchat/config.toml"));
    out
}

fn read_file(path: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config file, using defaults");
            return None;
        }
    };
    match toml::from_str::<Config>(&s) {
        Ok(c) => {
            debug!(path = %path.display(), "loaded config");
            Some(c)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
            None
        }
    }
}
