//! Host and port pair for peer addresses.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A `host:port` network address.
///
/// Kept as a string host rather than a resolved IP: a peer's last-known
/// address may be a DNS name whose resolution changes across restarts while
/// the peer's permanent UUID stays fixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostPort {
    /// Hostname or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl HostPort {
    /// Creates a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostPort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_argument(format!("expected host:port, got {s:?}")))?;
        if host.is_empty() {
            return Err(Error::invalid_argument(format!("empty host in address {s:?}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::invalid_argument(format!("bad port in address {s:?}: {e}")))?;
        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for HostPort {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let hp: HostPort = "m1.example.com:7051".parse().unwrap();
        assert_eq!(hp, HostPort::new("m1.example.com", 7051));
        assert_eq!(hp.to_string(), "m1.example.com:7051");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("no-port".parse::<HostPort>().is_err());
        assert!(":7051".parse::<HostPort>().is_err());
        assert!("host:notaport".parse::<HostPort>().is_err());
        assert!("host:99999".parse::<HostPort>().is_err());
    }

    #[test]
    fn test_from_socket_addr() {
        let addr: SocketAddr = "127.0.0.1:7051".parse().unwrap();
        assert_eq!(HostPort::from(addr), HostPort::new("127.0.0.1", 7051));
    }
}
