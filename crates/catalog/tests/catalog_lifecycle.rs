//! Single-master catalog lifecycle tests: creation, writes, visitors,
//! restart, and failure injection.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strata_catalog::{
    catalog_schema, set_fail_during_write, Actions, SysCatalog, SysCatalogContext, TableMutation,
    TabletMutation, INJECTED_FAILURE_MSG,
};
use strata_consensus::RaftRegistry;
use strata_tablet::{FsManager, MaintenanceRegistry};
use strata_test_utils::{StaticPeerResolver, TestDir};
use strata_types::{
    DataType, Error, MasterOptions, PartitionBounds, Schema, TableRecord, TableState,
    TabletRecord, TabletState,
};

fn new_catalog(leader_callbacks: Arc<AtomicUsize>) -> Arc<SysCatalog> {
    let counter = Arc::clone(&leader_callbacks);
    Arc::new(SysCatalog::new(
        SysCatalogContext::builder()
            .options(MasterOptions::default())
            .registry(Arc::new(RaftRegistry::new()))
            .peer_resolver(Arc::new(StaticPeerResolver::new()))
            .leader_cb(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .maintenance_manager(Arc::new(MaintenanceRegistry::new()))
            .build(),
    ))
}

async fn running_catalog(fs: &FsManager) -> (Arc<SysCatalog>, Arc<AtomicUsize>) {
    let leader_callbacks = Arc::new(AtomicUsize::new(0));
    let catalog = new_catalog(Arc::clone(&leader_callbacks));
    catalog.create_new(fs).await.expect("create_new");
    tokio::time::timeout(Duration::from_secs(30), catalog.wait_until_running())
        .await
        .expect("startup deadline")
        .expect("wait_until_running");
    (catalog, leader_callbacks)
}

fn user_schema() -> Schema {
    Schema::builder()
        .add_key_column("id", DataType::String)
        .unwrap()
        .add_column("amount", DataType::Int64)
        .unwrap()
        .build()
        .unwrap()
}

fn table_record(name: &str) -> TableRecord {
    TableRecord {
        name: name.to_string(),
        version: 0,
        schema: user_schema(),
        state: TableState::Preparing,
    }
}

fn tablet_record(table_id: &str) -> TabletRecord {
    TabletRecord {
        table_id: table_id.to_string(),
        partition: Some(PartitionBounds { start_key: vec![], end_key: vec![0x80] }),
        deprecated_start_key: None,
        deprecated_end_key: None,
        replicas: vec![],
        state: TabletState::Preparing,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_write_visit_roundtrip() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, leader_callbacks) = running_catalog(&fs).await;

    // A single-node catalog leads itself; the callback fires from the
    // consensus watcher, so poll rather than assert immediately.
    let counter = Arc::clone(&leader_callbacks);
    strata_test_utils::assert_eventually(
        Duration::from_secs(10),
        "elected-leader callback fired",
        move || {
            let counter = Arc::clone(&counter);
            async move { counter.load(Ordering::SeqCst) >= 1 }
        },
    )
    .await;

    let record = table_record("orders");
    catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "table-1".to_string(),
                record: record.clone(),
            }),
            tablets_to_add: vec![TabletMutation {
                tablet_id: "tablet-1".to_string(),
                record: tablet_record("table-1"),
            }],
            ..Default::default()
        })
        .await
        .expect("write");

    let mut tables = Vec::new();
    catalog
        .visit_tables(|table_id, record| {
            tables.push((table_id.to_string(), record));
            Ok(())
        })
        .expect("visit tables");
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].0, "table-1");
    assert_eq!(tables[0].1, record);

    let mut tablets = Vec::new();
    catalog
        .visit_tablets(|table_id, tablet_id, record| {
            tablets.push((table_id.to_string(), tablet_id.to_string(), record));
            Ok(())
        })
        .expect("visit tablets");
    assert_eq!(tablets.len(), 1);
    assert_eq!(tablets[0].0, "table-1");
    assert_eq!(tablets[0].1, "tablet-1");
    assert!(tablets[0].2.partition.is_some());
    assert!(tablets[0].2.deprecated_start_key.is_none());

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_and_delete_visible_to_visitors() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "t1".to_string(),
                record: table_record("first"),
            }),
            ..Default::default()
        })
        .await
        .expect("add");

    let mut updated = table_record("first");
    updated.state = TableState::Running;
    updated.version = 1;
    catalog
        .write(&Actions {
            table_to_update: Some(TableMutation {
                table_id: "t1".to_string(),
                record: updated.clone(),
            }),
            ..Default::default()
        })
        .await
        .expect("update");

    let mut seen = Vec::new();
    catalog
        .visit_tables(|id, record| {
            seen.push((id.to_string(), record));
            Ok(())
        })
        .expect("visit");
    assert_eq!(seen, vec![("t1".to_string(), updated)]);

    catalog
        .write(&Actions { table_to_delete: Some("t1".to_string()), ..Default::default() })
        .await
        .expect("delete");

    let mut count = 0;
    catalog.visit_tables(|_, _| {
        count += 1;
        Ok(())
    })
    .expect("visit after delete");
    assert_eq!(count, 0);

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_add_and_delete_same_table_in_one_batch() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    // Insert-then-delete ordering within one batch: the final state holds no
    // row and the write reports success.
    catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "ephemeral".to_string(),
                record: table_record("ephemeral"),
            }),
            table_to_delete: Some("ephemeral".to_string()),
            ..Default::default()
        })
        .await
        .expect("write");

    let mut count = 0;
    catalog.visit_tables(|_, _| {
        count += 1;
        Ok(())
    })
    .expect("visit");
    assert_eq!(count, 0);

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_write_is_accepted() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    catalog.write(&Actions::default()).await.expect("empty write");

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_per_row_failure_reports_corruption_without_rollback() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "dup".to_string(),
                record: table_record("dup"),
            }),
            ..Default::default()
        })
        .await
        .expect("first add");

    // Re-adding the same key fails per-row; the sibling tablet add in the
    // same batch still applies.
    let err = catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "dup".to_string(),
                record: table_record("dup-again"),
            }),
            tablets_to_add: vec![TabletMutation {
                tablet_id: "survivor".to_string(),
                record: tablet_record("dup"),
            }],
            ..Default::default()
        })
        .await
        .expect_err("duplicate insert must fail");
    assert!(err.is_corruption());
    assert!(err.to_string().contains("One or more rows failed to write"));

    let mut tablet_ids = Vec::new();
    catalog
        .visit_tablets(|_, tablet_id, _| {
            tablet_ids.push(tablet_id.to_string());
            Ok(())
        })
        .expect("visit tablets");
    assert_eq!(tablet_ids, vec!["survivor".to_string()]);

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fault_injection_fails_every_write() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    set_fail_during_write(1.0);
    let err = catalog
        .write(&Actions {
            table_to_add: Some(TableMutation {
                table_id: "never".to_string(),
                record: table_record("never"),
            }),
            ..Default::default()
        })
        .await
        .expect_err("injected failure");
    set_fail_during_write(0.0);

    assert!(err.is_runtime_error());
    assert!(err.to_string().contains(INJECTED_FAILURE_MSG));

    // Nothing reached the tablet.
    let mut count = 0;
    catalog.visit_tables(|_, _| {
        count += 1;
        Ok(())
    })
    .expect("visit");
    assert_eq!(count, 0);

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_visitor_error_stops_scan() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    for i in 0..3 {
        catalog
            .write(&Actions {
                table_to_add: Some(TableMutation {
                    table_id: format!("t{i}"),
                    record: table_record("t"),
                }),
                ..Default::default()
            })
            .await
            .expect("add");
    }

    let mut visited = 0;
    let err = catalog
        .visit_tables(|_, _| {
            visited += 1;
            Err(Error::runtime_error("visitor bailed"))
        })
        .expect_err("visitor error propagates");
    assert!(err.to_string().contains("visitor bailed"));
    assert_eq!(visited, 1);

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_loads_persisted_rows() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");

    let record = table_record("persistent");
    {
        let (catalog, _) = running_catalog(&fs).await;
        catalog
            .write(&Actions {
                table_to_add: Some(TableMutation {
                    table_id: "keep".to_string(),
                    record: record.clone(),
                }),
                ..Default::default()
            })
            .await
            .expect("write");
        catalog.shutdown().await;
    }

    let catalog = new_catalog(Arc::new(AtomicUsize::new(0)));
    catalog.load(&fs).await.expect("load");
    tokio::time::timeout(Duration::from_secs(30), catalog.wait_until_running())
        .await
        .expect("startup deadline")
        .expect("running");

    let mut seen = Vec::new();
    catalog
        .visit_tables(|id, rec| {
            seen.push((id.to_string(), rec));
            Ok(())
        })
        .expect("visit");
    assert_eq!(seen, vec![("keep".to_string(), record)]);

    catalog.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_load_without_create_is_not_found() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");

    let catalog = new_catalog(Arc::new(AtomicUsize::new(0)));
    let err = catalog.load(&fs).await.expect_err("nothing to load");
    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_twice_fails() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");

    let (catalog, _) = running_catalog(&fs).await;
    catalog.shutdown().await;

    let second = new_catalog(Arc::new(AtomicUsize::new(0)));
    let err = second.create_new(&fs).await.expect_err("second create");
    assert!(err.is_illegal_state());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_schema_drift_on_disk_is_corruption() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");

    {
        let (catalog, _) = running_catalog(&fs).await;
        catalog.shutdown().await;
    }

    // Corrupt the persisted superblock: a fourth column the canonical schema
    // does not have.
    let path = fs.tablet_metadata_path(strata_types::CATALOG_TABLET_ID);
    let content = std::fs::read_to_string(&path).expect("read superblock");
    let mut superblock: serde_json::Value = serde_json::from_str(&content).expect("parse");
    superblock["schema"]["columns"]
        .as_array_mut()
        .expect("columns array")
        .push(serde_json::json!({
            "name": "surprise",
            "data_type": "Int64",
            "is_nullable": false
        }));
    std::fs::write(&path, serde_json::to_string_pretty(&superblock).expect("serialize"))
        .expect("write corrupted superblock");

    let catalog = new_catalog(Arc::new(AtomicUsize::new(0)));
    let err = catalog.load(&fs).await.expect_err("schema drift");
    assert!(err.is_corruption(), "expected corruption, got {err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_write_before_setup_is_illegal_state() {
    let catalog = new_catalog(Arc::new(AtomicUsize::new(0)));
    let err = catalog.write(&Actions::default()).await.expect_err("not running");
    assert!(err.is_illegal_state());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loaded_schema_matches_canonical() {
    let dir = TestDir::new();
    let fs = FsManager::open(dir.path()).expect("open fs");
    let (catalog, _) = running_catalog(&fs).await;

    assert_eq!(catalog.schema().expect("schema"), catalog_schema());
    assert_eq!(
        catalog.key_schema().expect("key schema"),
        catalog_schema().key_projection()
    );

    catalog.shutdown().await;
}
