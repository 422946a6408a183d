//! Query-coordinate interval accumulation (component C1).
//!
//! Tracks a read's covered query range across an arbitrary number of
//! matches and reports the length of their union. Reused across reads by
//! the coverage gate (`coverage.rs`): `clear()` between reads, then `add()`
//! incrementally as filtered matches are streamed in, checking
//! `covered_length()` after each insertion so the caller can early-exit
//! once the required threshold is reached.
//!
//! Matches may be aligned in reverse-strand orientation, where
//! `alignedQueryStart > alignedQueryEnd`; `add` normalizes the pair before
//! inserting so the union is always computed over `[min, max]`.

/// Accumulates inclusive integer intervals and tracks the length of their
/// union incrementally.
///
/// Kept as a sorted, disjoint run of `(start, end)` pairs (inclusive on
/// both ends) with a running total so `covered_length` is O(1). Insertion
/// is O(n) in the number of currently-stored runs, which in practice stays
/// small: reads carry at most a few hundred matches, and overlapping
/// matches merge runs together rather than growing the vector.
#[derive(Debug, Default, Clone)]
pub struct IntervalSet {
    runs: Vec<(i64, i64)>,
    covered: u64,
}

impl IntervalSet {
    /// Create an empty interval set.
    pub fn new() -> Self {
        Self {
            runs: Vec::new(),
            covered: 0,
        }
    }

    /// Reset to empty without releasing the backing allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.runs.clear();
        self.covered = 0;
    }

    /// Current union length of all intervals added so far.
    #[inline]
    pub fn covered_length(&self) -> u64 {
        self.covered
    }

    /// True if no interval has been added since the last `clear`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Add an inclusive interval, normalizing reversed (start > end) pairs.
    ///
    /// Merges the new interval with any runs it touches or overlaps,
    /// updating the running covered length by the net gain.
    pub fn add(&mut self, start: i64, end: i64) {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };

        // First run that could touch or overlap the new interval on the left.
        let start_i = self
            .runs
            .partition_point(|&(_, run_end)| run_end < lo.saturating_sub(1));

        let mut new_lo = lo;
        let mut new_hi = hi;
        let mut removed_len: u64 = 0;
        let mut i = start_i;

        while i < self.runs.len() && self.runs[i].0 <= new_hi.saturating_add(1) {
            let (run_lo, run_hi) = self.runs[i];
            new_lo = new_lo.min(run_lo);
            new_hi = new_hi.max(run_hi);
            removed_len += run_len(run_lo, run_hi);
            i += 1;
        }

        let new_len = run_len(new_lo, new_hi);
        self.runs
            .splice(start_i..i, std::iter::once((new_lo, new_hi)));
        self.covered = self.covered - removed_len + new_len;
    }
}

#[inline]
fn run_len(lo: i64, hi: i64) -> u64 {
    if hi < lo {
        0
    } else {
        (hi - lo + 1) as u64
    }
}
