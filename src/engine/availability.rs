use crate::model::*;

// ── Overlap & gap algorithm ──────────────────────────────────────

/// Outcome of testing one candidate slot against a day's reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotVerdict {
    pub overlaps: bool,
    /// Only ever set when `overlaps` is true.
    pub suggestion: Option<Slot>,
}

/// Test `candidate` against `existing` (sorted by start, same venue and date).
///
/// Overlap uses half-open semantics, so touching slots do not conflict. On
/// overlap the suggestion is the first interior gap of the whole list, see
/// [`first_gap`]; it is not necessarily near the candidate.
pub fn evaluate(candidate: &Slot, existing: &[Slot]) -> SlotVerdict {
    debug_assert!(existing.windows(2).all(|w| w[0].start <= w[1].start));
    if !existing.iter().any(|s| s.overlaps(candidate)) {
        return SlotVerdict {
            overlaps: false,
            suggestion: None,
        };
    }
    SlotVerdict {
        overlaps: true,
        suggestion: first_gap(existing),
    }
}

/// First adjacent pair with `a.end < b.start`, returned as `[a.end, b.start)`.
/// Nothing before the first slot or after the last one is considered.
pub fn first_gap(sorted: &[Slot]) -> Option<Slot> {
    sorted
        .windows(2)
        .find(|w| w[0].end < w[1].start)
        .map(|w| Slot::new(w[0].end, w[1].start))
}

/// Free time inside `window` once every reservation slot is removed.
pub fn free_slots(sorted: &[Slot], window: &Slot) -> Vec<Slot> {
    if !window.is_valid() {
        return Vec::new();
    }
    subtract_intervals(&[*window], &merge_overlapping(sorted))
}

/// Merge sorted overlapping/adjacent slots into disjoint slots.
pub fn merge_overlapping(sorted: &[Slot]) -> Vec<Slot> {
    let mut merged: Vec<Slot> = Vec::new();
    for &slot in sorted {
        if let Some(last) = merged.last_mut()
            && slot.start <= last.end
        {
            last.end = last.end.max(slot.end);
            continue;
        }
        merged.push(slot);
    }
    merged
}

/// `base` minus `to_remove`; both sorted and disjoint.
pub fn subtract_intervals(base: &[Slot], to_remove: &[Slot]) -> Vec<Slot> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Slot::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Slot::new(current_start, current_end));
        }
    }

    result
}
