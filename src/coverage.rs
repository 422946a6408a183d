//! Read-coverage gate (component C3).
//!
//! Decides whether enough of a read's length is covered by its filtered
//! matches to proceed with assignment, per spec §4.3. Long-read mode
//! streams matches into a reused `IntervalSet` and early-exits as soon as
//! the union length clears the threshold; short-read mode only looks at
//! the single longest aligned match.

use crate::archive::ReadBlock;
use crate::interval::IntervalSet;

/// `true` as soon as enough of the read is covered, `false` otherwise.
///
/// `intervals` selects the mode: `None` for short-read (single best
/// match), `Some` for long-read (union of all filtered matches' query
/// spans). The caller owns and reuses the `IntervalSet` across reads.
pub fn ensure_covered(
    min_percent: f64,
    read: &ReadBlock,
    active: &[bool],
    intervals: Option<&mut IntervalSet>,
) -> bool {
    let required = (0.01 * min_percent * read.length as f64).floor() as u64;
    if required == 0 {
        return true;
    }

    match intervals {
        None => active.iter().zip(&read.matches).any(|(&kept, m)| {
            kept && m.aligned_length() >= required
        }),
        Some(set) => {
            set.clear();
            for (kept, m) in active.iter().zip(&read.matches) {
                if !kept {
                    continue;
                }
                set.add(m.aligned_query_start, m.aligned_query_end);
                if set.covered_length() >= required {
                    return true;
                }
            }
            false
        }
    }
}
