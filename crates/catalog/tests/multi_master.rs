//! Multi-master catalog tests: quorum bootstrap with UUID discovery over
//! loopback gRPC, leader election, replicated visibility, and restart
//! verification.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use strata_catalog::{Actions, TableMutation};
use strata_consensus::ConsensusMetadata;
use strata_test_utils::{assert_eventually, TestCluster};
use strata_types::{
    DataType, HostPort, MemberType, Schema, TableRecord, TableState, CATALOG_TABLET_ID,
    OPID_INDEX_UNKNOWN,
};

const STARTUP: Duration = Duration::from_secs(60);

fn table_record(name: &str) -> TableRecord {
    TableRecord {
        name: name.to_string(),
        version: 0,
        schema: Schema::builder()
            .add_key_column("id", DataType::String)
            .unwrap()
            .add_column("v", DataType::Int64)
            .unwrap()
            .build()
            .unwrap(),
        state: TableState::Running,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fresh_three_master_cluster() {
    let cluster = TestCluster::new(3).await;
    cluster.wait_all_running(STARTUP).await;
    cluster.wait_for_leader(STARTUP).await;

    // On-disk quorum on every master: three voters, UUIDs resolved by
    // discovery, unadopted opid index.
    let expected_addrs: Vec<HostPort> = cluster.master_addresses();
    for master in &cluster.masters {
        let cmeta = ConsensusMetadata::load(&master.fs, CATALOG_TABLET_ID, master.fs.uuid())
            .expect("load cmeta");
        let config = &cmeta.committed_config;
        assert!(!config.local);
        assert_eq!(config.opid_index, OPID_INDEX_UNKNOWN);
        assert_eq!(config.peers.len(), 3);
        for peer in &config.peers {
            assert!(peer.permanent_uuid.is_some());
            assert_eq!(peer.member_type, MemberType::Voter);
        }
        let mut addrs: Vec<HostPort> =
            config.peers.iter().filter_map(|p| p.last_known_addr.clone()).collect();
        addrs.sort();
        let mut expected = expected_addrs.clone();
        expected.sort();
        assert_eq!(addrs, expected);
    }

    // Exactly one leader at a time, and its callback fired.
    let leaders: Vec<_> = cluster.masters.iter().filter(|m| m.is_leader()).collect();
    assert_eq!(leaders.len(), 1);
    let counter = std::sync::Arc::clone(&leaders[0].leader_callbacks);
    assert_eventually(STARTUP, "elected-leader callback fired", move || {
        let counter = std::sync::Arc::clone(&counter);
        async move { counter.load(Ordering::SeqCst) >= 1 }
    })
    .await;

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_on_leader_replicates_to_followers() {
    let cluster = TestCluster::new(3).await;
    cluster.wait_all_running(STARTUP).await;
    cluster.wait_for_leader(STARTUP).await;

    let record = table_record("replicated");
    let leader = cluster.leader().expect("leader");
    leader
        .catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "shared".to_string(),
                record: record.clone(),
            }),
            ..Default::default()
        })
        .await
        .expect("leader write");

    // Read-your-writes on the issuing master.
    let mut seen = Vec::new();
    leader
        .catalog
        .visit_tables(|id, rec| {
            seen.push((id.to_string(), rec));
            Ok(())
        })
        .expect("leader visit");
    assert_eq!(seen, vec![("shared".to_string(), record.clone())]);

    // Followers converge.
    for follower in cluster.followers() {
        let catalog = &follower.catalog;
        assert_eventually(STARTUP, "follower observes replicated row", || {
            let mut found = false;
            let _ = catalog.visit_tables(|id, _| {
                if id == "shared" {
                    found = true;
                }
                Ok(())
            });
            async move { found }
        })
        .await;
    }

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_write_on_follower_is_rejected() {
    let cluster = TestCluster::new(3).await;
    cluster.wait_all_running(STARTUP).await;
    cluster.wait_for_leader(STARTUP).await;

    let follower = cluster.followers().into_iter().next().expect("a follower");
    let err = follower
        .catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "nope".to_string(),
                record: table_record("nope"),
            }),
            ..Default::default()
        })
        .await
        .expect_err("follower write must fail");
    assert!(err.is_illegal_state(), "expected illegal state, got {err}");

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_with_matching_peers_loads() {
    let mut cluster = TestCluster::new(3).await;
    cluster.wait_all_running(STARTUP).await;
    let leader_index = cluster.wait_for_leader(STARTUP).await;

    let addrs = cluster.master_addresses();
    let follower_index = (leader_index + 1) % cluster.masters.len();
    cluster.masters[follower_index]
        .restart_catalog(addrs)
        .await
        .expect("restart with matching peers");

    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restart_with_divergent_peers_is_rejected() {
    let mut cluster = TestCluster::new(3).await;
    cluster.wait_all_running(STARTUP).await;
    let leader_index = cluster.wait_for_leader(STARTUP).await;

    let restart_index = (leader_index + 1) % cluster.masters.len();
    let replaced_index = (leader_index + 2) % cluster.masters.len();

    // Swap one configured peer for an address that was never in the quorum.
    let mut addrs = cluster.master_addresses();
    let removed = addrs[replaced_index].clone();
    let imposter = HostPort::new("127.0.0.1", 1);
    addrs[replaced_index] = imposter.clone();

    let err = cluster.masters[restart_index]
        .restart_catalog(addrs)
        .await
        .expect_err("divergent peer list must be rejected");
    assert!(err.is_invalid_argument(), "expected invalid argument, got {err}");
    let message = err.to_string();
    assert!(message.contains(&removed.to_string()), "missing {removed} in: {message}");
    assert!(message.contains(&imposter.to_string()), "missing {imposter} in: {message}");

    cluster.shutdown().await;
}
