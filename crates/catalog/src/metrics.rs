//! Catalog metrics via the `metrics` facade.
//!
//! Naming: `strata_catalog_{name}_{unit}`; counters end in `_total`.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

const WRITES_TOTAL: &str = "strata_catalog_writes_total";
const WRITE_LATENCY: &str = "strata_catalog_write_latency_seconds";
const VISIT_ROWS_TOTAL: &str = "strata_catalog_visit_rows_total";
const IS_LEADER: &str = "strata_catalog_is_leader";

pub(crate) fn record_write(latency: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(WRITES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(WRITE_LATENCY).record(latency.as_secs_f64());
}

pub(crate) fn record_visit_rows(entry_type: &'static str, rows: u64) {
    counter!(VISIT_ROWS_TOTAL, "entry_type" => entry_type).increment(rows);
}

pub(crate) fn set_is_leader(is_leader: bool) {
    gauge!(IS_LEADER).set(if is_leader { 1.0 } else { 0.0 });
}
