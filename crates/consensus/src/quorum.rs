//! Quorum construction and verification.
//!
//! Two guards live here. Structural verification rejects malformed
//! configurations (missing UUIDs, duplicate peers, non-voters) before they
//! are ever persisted. The load-time peer-set check compares the on-disk
//! quorum against the addresses this master was started with and refuses to
//! proceed on any difference: a master restarted with the wrong peer list
//! must fail fast rather than risk a split brain.

use std::collections::BTreeSet;

use strata_types::{
    ConsensusState, Error, MasterOptions, MemberType, PeerUuid, RaftConfig, RaftPeer, RaftRole,
    Result, ResultExt,
};

use crate::discovery::{set_permanent_uuid_for_peer, PeerResolver};

/// Structurally verifies a committed quorum configuration.
///
/// Requires: at least one peer; every peer has a permanent UUID and a
/// last-known address; no UUID or address appears twice; every peer is a
/// voter.
pub fn verify_raft_config(config: &RaftConfig) -> Result<()> {
    if config.peers.is_empty() {
        return Err(Error::invalid_argument("quorum configuration has no peers"));
    }

    let mut uuids = BTreeSet::new();
    let mut addrs = BTreeSet::new();
    for peer in &config.peers {
        let uuid = peer.permanent_uuid.ok_or_else(|| {
            Error::invalid_argument(format!("peer {} has no permanent UUID", peer.describe()))
        })?;
        let addr = peer.last_known_addr.clone().ok_or_else(|| {
            Error::invalid_argument(format!("peer {} has no last-known address", peer.describe()))
        })?;
        if !uuids.insert(uuid) {
            return Err(Error::invalid_argument(format!("duplicate peer UUID {uuid}")));
        }
        if !addrs.insert(addr.clone()) {
            return Err(Error::invalid_argument(format!("duplicate peer address {addr}")));
        }
        if peer.member_type != MemberType::Voter {
            return Err(Error::invalid_argument(format!(
                "peer {} is not a voter",
                peer.describe()
            )));
        }
    }
    Ok(())
}

/// Builds the initial committed configuration for a distributed catalog.
///
/// Starts from the configured master addresses (all voters, UUIDs blank),
/// resolves each missing UUID with a discovery RPC to the peer's address,
/// then structurally verifies the result.
pub async fn create_distributed_config(
    options: &MasterOptions,
    resolver: &dyn PeerResolver,
) -> Result<RaftConfig> {
    debug_assert!(options.is_distributed());

    let mut config = RaftConfig::new_distributed();
    for addr in &options.master_addresses {
        config.peers.push(RaftPeer::voter_at(addr.clone()));
    }

    for peer in &mut config.peers {
        if peer.permanent_uuid.is_none() {
            tracing::info!(peer = %peer.describe(), "peer has no permanent UUID, resolving");
            set_permanent_uuid_for_peer(resolver, peer).await?;
        }
    }

    verify_raft_config(&config)?;
    tracing::debug!(peers = config.peers.len(), "built distributed quorum configuration");
    Ok(config)
}

/// Verifies a quorum loaded from disk against this master's startup options.
///
/// Runs the structural verification, then compares the on-disk peer address
/// set against `options.master_addresses`; any symmetric difference fails
/// with `InvalidArgument` naming the differing addresses.
pub fn verify_loaded_config(config: &RaftConfig, options: &MasterOptions) -> Result<()> {
    verify_raft_config(config).prepend("invalid quorum configuration on disk")?;

    let from_opts: BTreeSet<String> =
        options.master_addresses.iter().map(ToString::to_string).collect();
    let from_disk: BTreeSet<String> =
        config.peer_addrs().iter().map(ToString::to_string).collect();

    let symm_diff: Vec<String> =
        from_opts.symmetric_difference(&from_disk).cloned().collect();
    if !symm_diff.is_empty() {
        return Err(Error::invalid_argument(format!(
            "on-disk and provided master lists are different: {}",
            symm_diff.join(" ")
        )));
    }
    Ok(())
}

/// Computes a peer's role within the latest committed state.
pub fn consensus_role(uuid: &PeerUuid, cstate: &ConsensusState) -> RaftRole {
    if cstate.leader_uuid.as_ref() == Some(uuid) {
        return RaftRole::Leader;
    }
    match cstate.config.peer(uuid) {
        Some(peer) if peer.member_type == MemberType::Voter => RaftRole::Follower,
        Some(_) => RaftRole::Learner,
        None => RaftRole::NonParticipant,
    }
}
