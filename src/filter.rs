//! Per-read match filtering (component C2).
//!
//! Selects, for a single classification, the subset of a read's matches
//! that pass the score / expected-value / percent-identity / top-percent
//! rules of spec §4.2. The result is written into a reusable bitmask
//! (one bool per match index) so callers can keep the allocation across
//! reads instead of allocating a fresh `Vec` per iteration.

use crate::archive::ReadBlock;

/// Select matches passing all five filter rules for `classification`.
///
/// `out` is resized to `read.matches.len()` and cleared to `false` before
/// being filled in; callers reuse the same `Vec<bool>` across reads.
pub fn compute(
    min_score: f64,
    top_percent: f64,
    max_expected: f64,
    min_percent_identity: f64,
    read: &ReadBlock,
    classification: &str,
    out: &mut Vec<bool>,
) {
    out.clear();
    out.resize(read.matches.len(), false);

    let mut best_score = f64::NEG_INFINITY;
    for m in &read.matches {
        if passes_base_rules(m, min_score, max_expected, min_percent_identity, classification) {
            best_score = best_score.max(m.bit_score);
        }
    }

    if best_score == f64::NEG_INFINITY {
        return;
    }

    // Rule 5: top-percent cutoff. A no-op when top_percent == 100.
    let cutoff = best_score * (1.0 - top_percent / 100.0);

    for (i, m) in read.matches.iter().enumerate() {
        if passes_base_rules(m, min_score, max_expected, min_percent_identity, classification)
            && m.bit_score >= cutoff
        {
            out[i] = true;
        }
    }
}

#[inline]
fn passes_base_rules(
    m: &crate::archive::MatchBlock,
    min_score: f64,
    max_expected: f64,
    min_percent_identity: f64,
    classification: &str,
) -> bool {
    m.bit_score >= min_score
        && m.expected <= max_expected
        && m.percent_identity
            .map_or(true, |pid| pid >= min_percent_identity)
        && m.id(classification) > 0
}

/// Collect the indices set in a filter bitmask, in input order (filtering
/// is stable per spec §4.2).
pub fn indices(mask: &[bool]) -> impl Iterator<Item = usize> + '_ {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &kept)| kept.then_some(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MatchBlock;
    use std::collections::HashMap;

    fn read_with_matches(matches: Vec<(f64, i32)>) -> ReadBlock {
        ReadBlock {
            uid: 1,
            name: "r".into(),
            header: String::new(),
            length: 100,
            weight: 1,
            complexity: 0.0,
            mate_uid: 0,
            matches: matches
                .into_iter()
                .map(|(score, tax_id)| {
                    let mut class_ids = HashMap::new();
                    class_ids.insert("Taxonomy".to_string(), tax_id);
                    MatchBlock {
                        bit_score: score,
                        expected: 1e-10,
                        percent_identity: Some(99.0),
                        aligned_query_start: 1,
                        aligned_query_end: 100,
                        class_ids,
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn keeps_matches_within_top_percent_of_best() {
        let read = read_with_matches(vec![(100.0, 562), (95.0, 622), (50.0, 1)]);
        let mut out = Vec::new();
        compute(0.0, 10.0, f64::MAX, 0.0, &read, "Taxonomy", &mut out);
        assert_eq!(out, vec![true, true, false]);
    }

    #[test]
    fn top_percent_100_is_a_no_op() {
        let read = read_with_matches(vec![(100.0, 562), (1.0, 622)]);
        let mut out = Vec::new();
        compute(0.0, 100.0, f64::MAX, 0.0, &read, "Taxonomy", &mut out);
        assert_eq!(out, vec![true, true]);
    }

    #[test]
    fn match_without_id_for_classification_is_excluded() {
        let mut read = read_with_matches(vec![(100.0, 562)]);
        read.matches[0].class_ids.insert("KEGG".to_string(), 0);
        let mut out = Vec::new();
        compute(0.0, 100.0, f64::MAX, 0.0, &read, "KEGG", &mut out);
        assert_eq!(out, vec![false]);
    }

    #[test]
    fn unknown_identity_always_passes_identity_rule() {
        let mut read = read_with_matches(vec![(100.0, 562)]);
        read.matches[0].percent_identity = None;
        let mut out = Vec::new();
        compute(0.0, 100.0, f64::MAX, 99.0, &read, "Taxonomy", &mut out);
        assert_eq!(out, vec![true]);
    }

    #[test]
    fn no_passing_matches_yields_empty_mask() {
        let read = read_with_matches(vec![(1.0, 562)]);
        let mut out = Vec::new();
        compute(50.0, 10.0, f64::MAX, 0.0, &read, "Taxonomy", &mut out);
        assert!(out.iter().all(|&k| !k));
    }

    #[test]
    fn indices_preserves_input_order() {
        let mask = vec![false, true, true, false, true];
        assert_eq!(indices(&mask).collect::<Vec<_>>(), vec![1, 2, 4]);
    }
}
