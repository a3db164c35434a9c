use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::traits::Connectivity;

/// Public DNS resolvers reachable on port 53 over each stack.
const IPV4_TARGETS: &[&str] = &["1.1.1.1:53", "8.8.8.8:53"];
const IPV6_TARGETS: &[&str] = &["[2606:4700:4700::1111]:53", "[2001:4860:4860::8888]:53"];

/// [`Connectivity`] that tries a TCP connect to well-known hosts.
pub struct TcpConnectivity {
    ipv4_targets: Vec<SocketAddr>,
    ipv6_targets: Vec<SocketAddr>,
    timeout: Duration,
}

impl TcpConnectivity {
    pub fn new() -> Self {
        Self {
            ipv4_targets: parse(IPV4_TARGETS),
            ipv6_targets: parse(IPV6_TARGETS),
            timeout: Duration::from_secs(3),
        }
    }

    pub fn with_targets(ipv4: Vec<SocketAddr>, ipv6: Vec<SocketAddr>) -> Self {
        Self {
            ipv4_targets: ipv4,
            ipv6_targets: ipv6,
            ..Self::new()
        }
    }

    async fn any_reachable(&self, targets: &[SocketAddr]) -> bool {
        for addr in targets {
            match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => debug!(%addr, error = %e, "connectivity probe failed"),
                Err(_) => debug!(%addr, "connectivity probe timed out"),
            }
        }
        false
    }
}

impl Default for TcpConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(targets: &[&str]) -> Vec<SocketAddr> {
    targets.iter().filter_map(|t| t.parse().ok()).collect()
}

#[async_trait]
impl Connectivity for TcpConnectivity {
    async fn ipv4_available(&self) -> bool {
        self.any_reachable(&self.ipv4_targets).await
    }

    async fn ipv6_available(&self) -> bool {
        self.any_reachable(&self.ipv6_targets).await
    }
}

/// Connectivity fixed by the caller, e.g. from command-line flags.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity {
    pub ipv4: bool,
    pub ipv6: bool,
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn ipv4_available(&self) -> bool {
        self.ipv4
    }

    async fn ipv6_available(&self) -> bool {
        self.ipv6
    }
}
