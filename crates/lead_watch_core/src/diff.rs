use std::collections::HashSet;

use crate::record::{NewRecordBatch, NormalizedSnapshot, Record, SnapshotMode};

/// Result of comparing a snapshot against the stored baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub batch: NewRecordBatch,
    /// No baseline existed; the caller should store `current` and move on.
    pub first_observation: bool,
}

/// Records in `current` that the baseline does not already contain.
///
/// A record is matched by equal identity. When both records carry only a
/// derived identity they also match if every field present on both sides
/// (minus `ignore_fields`) has the same value. For text-scan snapshots the
/// structural result only counts when the canonical text changed too.
/// Switching between structured and text-scan snapshots re-establishes the
/// baseline without reporting anything.
pub fn diff(
    baseline: Option<&NormalizedSnapshot>,
    current: &NormalizedSnapshot,
    ignore_fields: &HashSet<String>,
) -> DiffOutcome {
    let Some(baseline) = baseline else {
        return DiffOutcome {
            batch: NewRecordBatch::default(),
            first_observation: true,
        };
    };

    if std::mem::discriminant(&baseline.mode) != std::mem::discriminant(&current.mode) {
        return DiffOutcome {
            batch: NewRecordBatch::default(),
            first_observation: true,
        };
    }

    if let (
        SnapshotMode::TextScan {
            canonical_digest: before,
        },
        SnapshotMode::TextScan {
            canonical_digest: after,
        },
    ) = (&baseline.mode, &current.mode)
    {
        if before == after {
            return DiffOutcome {
                batch: NewRecordBatch::default(),
                first_observation: false,
            };
        }
    }

    let known: HashSet<&str> = baseline
        .records
        .iter()
        .map(|record| record.identity.as_str())
        .collect();
    let derived_baseline: Vec<&Record> = baseline
        .records
        .iter()
        .filter(|record| !record.has_reliable_identity())
        .collect();

    let records = current
        .records
        .iter()
        .filter(|record| {
            if known.contains(record.identity.as_str()) {
                return false;
            }
            if record.has_reliable_identity() {
                return true;
            }
            !derived_baseline
                .iter()
                .any(|old| fields_match(old, record, ignore_fields))
        })
        .cloned()
        .collect();

    DiffOutcome {
        batch: NewRecordBatch { records },
        first_observation: false,
    }
}

/// Equal on every compared field present in both records. Fields missing
/// from either side do not discriminate.
fn fields_match(a: &Record, b: &Record, ignore_fields: &HashSet<String>) -> bool {
    a.fields
        .iter()
        .filter(|(name, _)| !ignore_fields.contains(name))
        .all(|(name, value)| match b.field(name) {
            Some(other) => other == value,
            None => true,
        })
}
