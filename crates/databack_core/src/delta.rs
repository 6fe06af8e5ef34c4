//! Delta computation and application.
//!
//! Rows are compared by payload only. An updated row therefore shows up as a
//! deletion of the old payload plus an addition of the new one; the resulting
//! state is exact but per-row update history is not kept.

use crate::value::{Delta, Payload, RecordId, RowRecord, Snapshot};
use std::collections::HashSet;
use tracing::debug;

/// Compute the changeset that turns `old` into `new`.
///
/// Records of `new` without a payload-equal record in `old` are added under
/// their own ids (callers build `new` with [`Snapshot::from_payloads`], which
/// assigns fresh ones). Records of `old` without a payload-equal record in
/// `new` are deleted by id.
pub fn compute(old: &Snapshot, new: &Snapshot) -> Delta {
    let old_payloads = old.payload_set();
    let new_payloads = new.payload_set();

    let added: Vec<RowRecord> = new
        .records()
        .iter()
        .filter(|r| !old_payloads.contains(&r.payload))
        .cloned()
        .collect();

    let deleted: Vec<RecordId> = old
        .records()
        .iter()
        .filter(|r| !new_payloads.contains(&r.payload))
        .map(|r| r.id.clone())
        .collect();

    debug!(
        added = added.len(),
        deleted = deleted.len(),
        "Computed delta"
    );

    Delta { added, deleted }
}

/// Apply `delta` to `snapshot` in place.
///
/// Deletions go first. An added record whose payload is already present is
/// skipped, so replaying the same delta twice is harmless.
pub fn apply(snapshot: &mut Snapshot, delta: &Delta) {
    let records = snapshot.records_mut();

    if !delta.deleted.is_empty() {
        let deleted: HashSet<&RecordId> = delta.deleted.iter().collect();
        records.retain(|r| !deleted.contains(&r.id));
    }

    let mut present: HashSet<Payload> = records.iter().map(|r| r.payload.clone()).collect();
    for record in &delta.added {
        if present.insert(record.payload.clone()) {
            records.push(record.clone());
        }
    }
}

/// Changes in `fresh` that the materialized `current` cache does not yet hold.
pub fn drift_check(current: &Snapshot, fresh: &Snapshot) -> Delta {
    compute(current, fresh)
}
