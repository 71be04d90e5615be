//! Write-path fault injection.
//!
//! A process-wide probability, read on every synchronous write and mutable
//! only from tests. Not stored in any object: the knob must affect every
//! catalog instance in the process identically.

use std::sync::atomic::{AtomicU64, Ordering};

use strata_types::{Error, Result};

/// Message carried by every injected write failure.
pub const INJECTED_FAILURE_MSG: &str = "INJECTED FAILURE";

// f64 bit pattern; 0 encodes 0.0.
static FAIL_DURING_WRITE: AtomicU64 = AtomicU64::new(0);

/// Sets the fraction of catalog writes that fail with an injected fault.
///
/// Test-only knob. Values are clamped to `[0.0, 1.0]`.
pub fn set_fail_during_write(fraction: f64) {
    FAIL_DURING_WRITE.store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
}

/// The currently configured failure fraction.
pub fn fail_during_write() -> f64 {
    f64::from_bits(FAIL_DURING_WRITE.load(Ordering::Relaxed))
}

/// Fails with the injected-failure status at the configured probability.
pub(crate) fn maybe_fail_write() -> Result<()> {
    let fraction = fail_during_write();
    if fraction > 0.0 && rand::random::<f64>() < fraction {
        return Err(Error::runtime_error(INJECTED_FAILURE_MSG));
    }
    Ok(())
}
