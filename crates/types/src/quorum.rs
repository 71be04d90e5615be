//! Quorum and peer configuration types.
//!
//! A quorum is the ordered set of voter peers that replicate the catalog
//! tablet. Each peer has a permanent UUID (its identity across address
//! changes) and a last-known network address.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::HostPort;

/// A peer's permanent identity, independent of its network address.
pub type PeerUuid = Uuid;

/// Sentinel `opid_index` for a configuration that has not yet been adopted
/// through the replicated log (the initial configuration written at create
/// time).
pub const OPID_INDEX_UNKNOWN: i64 = -1;

/// The term that freshly created consensus metadata starts at.
pub const MINIMUM_TERM: u64 = 0;

/// Membership kind of a peer within a quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberType {
    /// Full voting member.
    Voter,
    /// Replicating but non-voting member.
    NonVoter,
}

/// One peer of a quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftPeer {
    /// The peer's permanent UUID. Absent only transiently while an initial
    /// configuration is being resolved.
    pub permanent_uuid: Option<PeerUuid>,
    /// The address the peer was last reached at.
    pub last_known_addr: Option<HostPort>,
    /// Voting membership kind.
    pub member_type: MemberType,
}

impl RaftPeer {
    /// Creates a voter peer with a known address and no UUID yet.
    pub fn voter_at(addr: HostPort) -> Self {
        Self { permanent_uuid: None, last_known_addr: Some(addr), member_type: MemberType::Voter }
    }

    /// Creates a voter peer with a known UUID and address.
    pub fn voter(uuid: PeerUuid, addr: HostPort) -> Self {
        Self {
            permanent_uuid: Some(uuid),
            last_known_addr: Some(addr),
            member_type: MemberType::Voter,
        }
    }

    /// Short human-readable description for log and error messages.
    pub fn describe(&self) -> String {
        let uuid = self
            .permanent_uuid
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown uuid>".to_string());
        let addr = self
            .last_known_addr
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<unknown addr>".to_string());
        format!("{uuid} ({addr})")
    }
}

/// A quorum configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfig {
    /// True for the degenerate single-node configuration written by a
    /// non-distributed master.
    pub local: bool,
    /// Log index at which this configuration was adopted;
    /// [`OPID_INDEX_UNKNOWN`] for an initial, not-yet-adopted configuration.
    pub opid_index: i64,
    /// The member peers, in configuration order.
    pub peers: Vec<RaftPeer>,
}

impl RaftConfig {
    /// Creates an empty distributed configuration with the unadopted sentinel.
    pub fn new_distributed() -> Self {
        Self { local: false, opid_index: OPID_INDEX_UNKNOWN, peers: Vec::new() }
    }

    /// Creates the single-peer local configuration for `uuid`.
    pub fn new_local(uuid: PeerUuid, addr: Option<HostPort>) -> Self {
        Self {
            local: true,
            opid_index: OPID_INDEX_UNKNOWN,
            peers: vec![RaftPeer {
                permanent_uuid: Some(uuid),
                last_known_addr: addr,
                member_type: MemberType::Voter,
            }],
        }
    }

    /// The addresses of all peers that have one.
    pub fn peer_addrs(&self) -> Vec<HostPort> {
        self.peers.iter().filter_map(|p| p.last_known_addr.clone()).collect()
    }

    /// Looks up a peer by UUID.
    pub fn peer(&self, uuid: &PeerUuid) -> Option<&RaftPeer> {
        self.peers.iter().find(|p| p.permanent_uuid.as_ref() == Some(uuid))
    }
}

/// A snapshot of a quorum's consensus state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    /// The current term.
    pub term: u64,
    /// The leader's UUID, if one is known.
    pub leader_uuid: Option<PeerUuid>,
    /// The committed configuration.
    pub config: RaftConfig,
}

/// A peer's role within the latest committed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    /// The elected leader.
    Leader,
    /// A voting follower.
    Follower,
    /// A non-voting replicating member.
    Learner,
    /// Not a member of the committed configuration.
    NonParticipant,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RaftRole::Leader => "LEADER",
            RaftRole::Follower => "FOLLOWER",
            RaftRole::Learner => "LEARNER",
            RaftRole::NonParticipant => "NON_PARTICIPANT",
        };
        f.write_str(name)
    }
}
