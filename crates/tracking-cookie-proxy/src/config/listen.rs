//! Proxy and admin listener configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Interface the proxy binds to
    #[serde(default = "default_listen_host")]
    pub host: IpAddr,
    /// Proxy port (0 = ephemeral)
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    /// How long `stop` lets in-flight exchanges finish before aborting them
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl ListenConfig {
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.host, port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_proxy_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_enabled")]
    pub enabled: bool,
    #[serde(default = "default_listen_host")]
    pub host: IpAddr,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl AdminConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_admin_enabled(),
            host: default_listen_host(),
            port: default_admin_port(),
        }
    }
}

fn default_listen_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_proxy_port() -> u16 {
    9090
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_admin_enabled() -> bool {
    true
}

fn default_admin_port() -> u16 {
    9091
}
