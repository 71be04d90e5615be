//! On-disk layout and instance identity for a master.
//!
//! The filesystem manager owns a data root with a fixed layout:
//!
//! ```text
//! <root>/instance            this master's permanent UUID
//! <root>/tablet-meta/<id>    tablet superblocks (JSON)
//! <root>/consensus-meta/<id> consensus metadata (JSON)
//! <root>/data/<id>.redb      tablet row stores
//! <root>/wal/<id>.redb       raft logs
//! ```
//!
//! The instance UUID is generated on first open and loaded on every
//! subsequent open; it is the master's identity for the life of the data
//! directory.

use std::path::{Path, PathBuf};

use strata_types::{Error, PeerUuid, Result, ResultExt};
use uuid::Uuid;

const INSTANCE_FILE: &str = "instance";
const TABLET_META_DIR: &str = "tablet-meta";
const CONSENSUS_META_DIR: &str = "consensus-meta";
const DATA_DIR: &str = "data";
const WAL_DIR: &str = "wal";

/// Manages a master's data root and persistent identity.
#[derive(Debug, Clone)]
pub struct FsManager {
    root: PathBuf,
    uuid: PeerUuid,
}

impl FsManager {
    /// Opens (creating if necessary) the data root at `root`.
    ///
    /// On first open a fresh instance UUID is generated and persisted; later
    /// opens load it back.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [
            root.clone(),
            root.join(TABLET_META_DIR),
            root.join(CONSENSUS_META_DIR),
            root.join(DATA_DIR),
            root.join(WAL_DIR),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| Error::Io {
                message: format!("unable to create {}", dir.display()),
                source,
            })?;
        }

        let instance_path = root.join(INSTANCE_FILE);
        let uuid = if instance_path.exists() {
            let content = std::fs::read_to_string(&instance_path).map_err(|source| Error::Io {
                message: format!("unable to read {}", instance_path.display()),
                source,
            })?;
            let uuid = content.trim().parse::<Uuid>().map_err(|e| {
                Error::corruption(format!(
                    "bad instance file {}: {e}",
                    instance_path.display()
                ))
            })?;
            tracing::debug!(uuid = %uuid, root = %root.display(), "loaded existing instance");
            uuid
        } else {
            let uuid = Uuid::new_v4();
            std::fs::write(&instance_path, uuid.to_string()).map_err(|source| Error::Io {
                message: format!("unable to write {}", instance_path.display()),
                source,
            })?;
            tracing::info!(uuid = %uuid, root = %root.display(), "initialized new instance");
            uuid
        };

        Ok(Self { root, uuid })
    }

    /// This master's permanent UUID.
    pub fn uuid(&self) -> PeerUuid {
        self.uuid
    }

    /// The data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the superblock for `tablet_id`.
    pub fn tablet_metadata_path(&self, tablet_id: &str) -> PathBuf {
        self.root.join(TABLET_META_DIR).join(tablet_id)
    }

    /// Path of the consensus metadata for `tablet_id`.
    pub fn consensus_metadata_path(&self, tablet_id: &str) -> PathBuf {
        self.root.join(CONSENSUS_META_DIR).join(tablet_id)
    }

    /// Path of the row store database for `tablet_id`.
    pub fn tablet_data_path(&self, tablet_id: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(format!("{tablet_id}.redb"))
    }

    /// Path of the raft log database for `tablet_id`.
    pub fn wal_path(&self, tablet_id: &str) -> PathBuf {
        self.root.join(WAL_DIR).join(format!("{tablet_id}.redb"))
    }

    /// Reads a JSON metadata file into `T`, reporting a structured NotFound
    /// when the file is absent.
    pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        if !path.exists() {
            return Err(Error::not_found(format!("{} does not exist", path.display())));
        }
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            message: format!("unable to read {}", path.display()),
            source,
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::corruption(format!("unable to parse {}: {e}", path.display())))
    }

    /// Writes `value` to `path` as pretty JSON.
    pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| Error::corruption(format!("unable to serialize {}: {e}", path.display())))?;
        std::fs::write(path, content)
            .map_err(|source| Error::Io {
                message: format!("unable to write {}", path.display()),
                source,
            })
            .prepend("metadata flush failed")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_open_creates_layout() {
        let dir = tempdir().expect("create temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs manager");

        assert!(dir.path().join("instance").exists());
        assert!(dir.path().join("tablet-meta").is_dir());
        assert!(dir.path().join("consensus-meta").is_dir());
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("wal").is_dir());
        assert!(!fs.uuid().is_nil());
    }

    #[test]
    fn test_uuid_stable_across_opens() {
        let dir = tempdir().expect("create temp dir");
        let first = FsManager::open(dir.path()).expect("first open").uuid();
        let second = FsManager::open(dir.path()).expect("second open").uuid();
        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupt_instance_file_is_corruption() {
        let dir = tempdir().expect("create temp dir");
        FsManager::open(dir.path()).expect("initial open");
        std::fs::write(dir.path().join("instance"), "not-a-uuid").expect("overwrite instance");

        let err = FsManager::open(dir.path()).expect_err("open should fail");
        assert!(err.is_corruption());
    }

    #[test]
    fn test_paths_are_per_tablet() {
        let dir = tempdir().expect("create temp dir");
        let fs = FsManager::open(dir.path()).expect("open");
        let id = "00000000000000000000000000000000";
        assert!(fs.tablet_metadata_path(id).ends_with(format!("tablet-meta/{id}")));
        assert!(fs.wal_path(id).ends_with(format!("wal/{id}.redb")));
        assert_ne!(fs.tablet_data_path(id), fs.wal_path(id));
    }
}
