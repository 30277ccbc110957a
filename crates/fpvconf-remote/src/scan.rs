//! Find devices on a /24 by probing their SSH port

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::ScanConfig;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid network prefix '{0}', expected three octets such as 192.168.1")]
    InvalidPrefix(String),
}

/// Parse `192.168.1` or `192.168.1.` into its three octets
pub fn parse_prefix(prefix: &str) -> Result<[u8; 3], ScanError> {
    let invalid = || ScanError::InvalidPrefix(prefix.to_string());
    let octets: Vec<u8> = prefix
        .trim()
        .trim_end_matches('.')
        .split('.')
        .map(|part| part.parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    <[u8; 3]>::try_from(octets).map_err(|_| invalid())
}

/// Whether `addr` accepts a TCP connection within the configured timeout
pub async fn is_listening(addr: SocketAddr, config: &ScanConfig) -> bool {
    matches!(
        tokio::time::timeout(config.timeout(), TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Try every host in `hosts`, returning the responders sorted
pub async fn sweep_hosts<I>(hosts: I, config: &ScanConfig) -> Vec<IpAddr>
where
    I: IntoIterator<Item = IpAddr>,
{
    let mut found: Vec<IpAddr> = stream::iter(hosts)
        .map(|ip| async move {
            let up = is_listening(SocketAddr::new(ip, config.port), config).await;
            if up {
                debug!(%ip, "Host answered");
            }
            up.then_some(ip)
        })
        .buffer_unordered(config.concurrency.max(1))
        .filter_map(|ip| async move { ip })
        .collect()
        .await;
    found.sort();
    found
}

/// Try `prefix.1` through `prefix.254`
pub async fn sweep(prefix: &str, config: &ScanConfig) -> Result<Vec<IpAddr>, ScanError> {
    let [a, b, c] = parse_prefix(prefix)?;
    info!("Scanning {}.{}.{}.1-254 port {}", a, b, c, config.port);
    let hosts = (1..=254u8).map(|d| IpAddr::V4(Ipv4Addr::new(a, b, c, d)));
    Ok(sweep_hosts(hosts, config).await)
}
