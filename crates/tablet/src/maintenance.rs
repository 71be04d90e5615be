//! Maintenance operations and the manager seam.
//!
//! The tablet peer registers its maintenance work with a manager owned by
//! the surrounding master; the manager decides when (and whether) to run it.

use std::sync::Arc;

use strata_types::{Result, TabletId};

use crate::store::TabletStore;

/// A unit of background maintenance work.
pub trait MaintenanceOp: Send + Sync {
    /// Stable name for logs and scheduling.
    fn name(&self) -> &str;

    /// Performs one round of the operation.
    fn perform(&self) -> Result<()>;
}

/// Accepts maintenance-op registrations.
pub trait MaintenanceManager: Send + Sync {
    /// Registers `op` for periodic execution.
    fn register(&self, op: Arc<dyn MaintenanceOp>);
}

/// A plain registry implementation of [`MaintenanceManager`].
///
/// Collects registered ops; `run_all` executes one round of each. Suitable
/// for masters that drive maintenance from a single timer, and for tests.
#[derive(Default)]
pub struct MaintenanceRegistry {
    ops: parking_lot::Mutex<Vec<Arc<dyn MaintenanceOp>>>,
}

impl MaintenanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered ops.
    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    /// Names of the registered ops, in registration order.
    pub fn op_names(&self) -> Vec<String> {
        self.ops.lock().iter().map(|op| op.name().to_string()).collect()
    }

    /// Runs one round of every registered op, stopping at the first error.
    pub fn run_all(&self) -> Result<()> {
        let ops: Vec<_> = self.ops.lock().clone();
        for op in ops {
            tracing::debug!(op = op.name(), "running maintenance op");
            op.perform()?;
        }
        Ok(())
    }
}

impl MaintenanceManager for MaintenanceRegistry {
    fn register(&self, op: Arc<dyn MaintenanceOp>) {
        tracing::info!(op = op.name(), "registered maintenance op");
        self.ops.lock().push(op);
    }
}

/// Compacts a tablet's row store file to reclaim space after deletions.
pub struct CompactTabletOp {
    name: String,
    store: Arc<TabletStore>,
}

impl CompactTabletOp {
    /// Creates the compaction op for `store`.
    pub fn new(tablet_id: &TabletId, store: Arc<TabletStore>) -> Self {
        Self { name: format!("compact-tablet-{tablet_id}"), store }
    }
}

impl MaintenanceOp for CompactTabletOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn perform(&self) -> Result<()> {
        let reclaimed = self.store.compact()?;
        tracing::debug!(op = %self.name, reclaimed, "tablet compaction pass finished");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingOp {
        runs: AtomicUsize,
    }

    impl MaintenanceOp for CountingOp {
        fn name(&self) -> &str {
            "counting"
        }

        fn perform(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_registry_registers_and_runs() {
        let registry = MaintenanceRegistry::new();
        assert!(registry.is_empty());

        let op = Arc::new(CountingOp { runs: AtomicUsize::new(0) });
        registry.register(op.clone());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.op_names(), vec!["counting".to_string()]);

        registry.run_all().expect("run");
        registry.run_all().expect("run again");
        assert_eq!(op.runs.load(Ordering::SeqCst), 2);
    }
}
