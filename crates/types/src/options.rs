//! Master startup options.

use serde::Deserialize;

use crate::HostPort;

/// Options a master is started with.
///
/// `master_addresses` lists every catalog peer (including this master) in
/// distributed mode. An empty list means a single-node deployment with a
/// local, unreplicated catalog quorum.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterOptions {
    /// The `host:port` of every master in the cluster.
    #[serde(default)]
    pub master_addresses: Vec<HostPort>,
    /// The RPC address this master advertises to its peers.
    #[serde(default)]
    pub advertised_rpc_addr: Option<HostPort>,
}

impl MasterOptions {
    /// True when the catalog runs as a replicated, multi-master quorum.
    pub fn is_distributed(&self) -> bool {
        !self.master_addresses.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_distributed_detection() {
        let local = MasterOptions::default();
        assert!(!local.is_distributed());

        let distributed = MasterOptions {
            master_addresses: vec![
                HostPort::new("m1", 7051),
                HostPort::new("m2", 7051),
                HostPort::new("m3", 7051),
            ],
            advertised_rpc_addr: Some(HostPort::new("m1", 7051)),
        };
        assert!(distributed.is_distributed());
    }
}
