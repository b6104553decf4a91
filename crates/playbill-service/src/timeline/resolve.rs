//! Partitions overlapping occurrences so the most recently updated one wins.

use playbill_core::model::Occurrence;

use crate::error::ServiceResult;

/// ## Summary
/// Resolves conflicts between `occurrences` into non-overlapping segments.
///
/// Each instant is owned by the occurrence with the greatest `updated_at`
/// covering it; on equal `updated_at` the earlier occurrence in start order
/// keeps it. Preempted occurrences, split to the span they were shadowed,
/// are attached to the owner's `overrides`. The input is not modified.
///
/// ## Errors
/// Returns `CoreError::InvalidInterval` if any occurrence ends before it starts.
pub fn resolve_overrides(occurrences: &[Occurrence]) -> ServiceResult<Vec<Occurrence>> {
    for occurrence in occurrences {
        occurrence.validate()?;
    }

    let mut working = occurrences.to_vec();
    working.sort_by_key(|occurrence| occurrence.start);

    // The list grows while it is swept.
    let mut i = 0;
    while i < working.len() {
        if !working[i].overridden {
            sweep_from(&mut working, i);
        }
        i += 1;
    }

    let resolved: Vec<Occurrence> = working
        .into_iter()
        .filter(|occurrence| !occurrence.overridden)
        .collect();

    tracing::debug!(
        input = occurrences.len(),
        resolved = resolved.len(),
        "Resolved occurrence overrides"
    );

    Ok(resolved)
}

/// Settles every later occurrence that starts before `working[i]` ends.
///
/// Starts of entries already in the list never change, and splits are
/// inserted after `i2`, so both indices stay valid while scanning.
fn sweep_from(working: &mut Vec<Occurrence>, i: usize) {
    let mut i2 = i + 1;
    while i2 < working.len() {
        if working[i2].start >= working[i].end {
            break;
        }

        if working[i2].updated_at > working[i].updated_at {
            let later_start = working[i2].start;
            let later_end = working[i2].end;

            if working[i].end > later_end {
                let mut tail = working[i].clone();
                tail.trim_start(later_end);
                working[i].trim_end(later_end);
                insert_by_start(working, tail);
            }

            if working[i].start < later_start {
                let mut shadowed = working[i].clone();
                shadowed.overridden = true;
                working[i].trim_end(later_start);
                shadowed.trim_start(later_start);
                working[i2].add_override(shadowed);
            } else {
                working[i].overridden = true;
                let consumed = working[i].clone();
                working[i2].add_override(consumed);
                break;
            }
        } else {
            let current_end = working[i].end;
            if current_end < working[i2].end {
                let mut tail = working[i2].clone();
                working[i2].trim_end(current_end);
                tail.trim_start(current_end);
                insert_by_start(working, tail);
            }

            working[i2].overridden = true;
            let shadowed = working[i2].clone();
            working[i].add_override(shadowed);
        }

        i2 += 1;
    }
}

/// Inserts before the first occurrence that starts strictly later.
fn insert_by_start(working: &mut Vec<Occurrence>, occurrence: Occurrence) {
    let index = working.partition_point(|other| other.start <= occurrence.start);
    tracing::trace!(
        id = %occurrence.id,
        start = %occurrence.start,
        end = %occurrence.end,
        index,
        "Split occurrence"
    );
    working.insert(index, occurrence);
}
