//! Assignment strategies (component C4).
//!
//! Each strategy turns a read's filtered match set into a class id for one
//! classification. Dispatch is modeled as a tagged enum per spec §9 rather
//! than dynamic dispatch across strategy objects: `LcaAlgorithm` selects
//! among the four taxonomy strategies, and non-taxonomy classifications
//! choose between best-hit and LCA (optionally multi-gene) independently
//! of the taxonomy algorithm in use.

use std::collections::HashMap;

use crate::archive::ReadBlock;
use crate::classification::ClassificationTree;
use crate::interval::IntervalSet;

/// Which of the four taxonomy LCA strategies (spec §3 Parameters,
/// §4.4) is in effect for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcaAlgorithm {
    Naive,
    Weighted,
    NaiveLongRead,
    CoverageLongRead,
}

/// Strategy for a non-taxonomy (functional) classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionalStrategy {
    BestHit,
    BestHitMultiGene,
    Lca,
}

/// A coarse taxonomic rank ladder used only by the 16S identity clamp
/// (spec §4.4). Ordinal order is finest (`Species`) to coarsest
/// (`Phylum`); a tree with no rank information for an id should return
/// `None` from `ClassificationTree::rank`, which makes the clamp a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Species,
    Genus,
    Family,
    Order,
    Class,
    Phylum,
}

/// The most permissive (coarsest) rank any single active match's percent
/// identity implies should bound the LCA to, or `None` if no match's
/// identity crosses any of the six thresholds.
fn identity_implied_rank(percent_identity: f64) -> Option<Rank> {
    if percent_identity >= 97.0 {
        Some(Rank::Species)
    } else if percent_identity >= 95.0 {
        Some(Rank::Genus)
    } else if percent_identity >= 90.0 {
        Some(Rank::Family)
    } else if percent_identity >= 85.0 {
        Some(Rank::Order)
    } else if percent_identity >= 80.0 {
        Some(Rank::Class)
    } else if percent_identity >= 75.0 {
        Some(Rank::Phylum)
    } else {
        None
    }
}

/// Climb from `id` toward the root until its rank (if the tree exposes
/// one) is at least as coarse as `required`.
fn clamp_to_rank(
    tree: &dyn ClassificationTree,
    id: i32,
    required: Rank,
    rank_of: &impl Fn(i32) -> Option<Rank>,
) -> i32 {
    let mut current = id;
    loop {
        if current == tree.root() {
            return current;
        }
        if let Some(r) = rank_of(current) {
            if r >= required {
                return current;
            }
        }
        let next = tree.parent(current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// LCA-naive (spec §4.4, Taxonomy, short-read).
///
/// Folds `lca` over the filtered matches' ids, discarding 0s. When
/// `use_identity_filter` is set and any active match's identity implies a
/// 16S-style rank bound, the result is clamped to at most that rank via
/// `rank_of` (returns `None` for ids the tree has no rank data for, which
/// makes the clamp a no-op — see DESIGN.md).
pub fn lca_naive(
    tree: &dyn ClassificationTree,
    read: &ReadBlock,
    active: &[bool],
    classification: &str,
    use_identity_filter: bool,
    rank_of: impl Fn(i32) -> Option<Rank>,
) -> i32 {
    let ids: Vec<i32> = active
        .iter()
        .zip(&read.matches)
        .filter(|(&kept, _)| kept)
        .map(|(_, m)| m.id(classification))
        .collect();
    let raw = tree.lca_of(&ids);
    if raw == 0 || !use_identity_filter {
        return raw;
    }

    let required = active
        .iter()
        .zip(&read.matches)
        .filter(|(&kept, _)| kept)
        .filter_map(|(_, m)| m.percent_identity)
        .filter_map(identity_implied_rank)
        .max();

    match required {
        Some(r) => clamp_to_rank(tree, raw, r, &rank_of),
        None => raw,
    }
}

/// LCA for a non-taxonomy classification (spec §4.4): same fold as
/// `lca_naive` without the 16S clamp.
pub fn lca_functional(read: &ReadBlock, active: &[bool], classification: &str, tree: &dyn ClassificationTree) -> i32 {
    let ids: Vec<i32> = active
        .iter()
        .zip(&read.matches)
        .filter(|(&kept, _)| kept)
        .map(|(_, m)| m.id(classification))
        .collect();
    tree.lca_of(&ids)
}

/// Deepest id whose cumulative weight reaches `weighted_lca_percent`,
/// ties broken by the LCA of the tied winners. Shared by `lca_weighted`
/// and `lca_coverage_long_read`, which differ only in how a weight map is
/// built.
fn deepest_above_threshold(
    tree: &dyn ClassificationTree,
    weights: &HashMap<i32, f64>,
    total: f64,
    weighted_lca_percent: f64,
) -> i32 {
    if total <= 0.0 {
        return 0;
    }
    let threshold = weighted_lca_percent / 100.0 * total;
    let max_depth = weights
        .iter()
        .filter(|&(_, &w)| w >= threshold)
        .map(|(&id, _)| tree.depth(id))
        .max();
    let Some(max_depth) = max_depth else {
        return 0;
    };
    let winners: Vec<i32> = weights
        .iter()
        .filter(|&(&id, &w)| w >= threshold && tree.depth(id) == max_depth)
        .map(|(&id, _)| id)
        .collect();
    if winners.len() == 1 {
        winners[0]
    } else {
        tree.lca_of(&winners)
    }
}

/// LCA-weighted (spec §4.4): per-id weight is the sum of bit-scores of
/// active matches reaching it via an ancestor walk.
pub fn lca_weighted(
    tree: &dyn ClassificationTree,
    read: &ReadBlock,
    active: &[bool],
    classification: &str,
    weighted_lca_percent: f64,
) -> i32 {
    let mut weights: HashMap<i32, f64> = HashMap::new();
    let mut total = 0.0;
    for (kept, m) in active.iter().zip(&read.matches) {
        if !kept {
            continue;
        }
        let id = m.id(classification);
        if id <= 0 {
            continue;
        }
        total += m.bit_score;
        for ancestor in tree.ancestors(id) {
            *weights.entry(ancestor).or_insert(0.0) += m.bit_score;
        }
    }
    deepest_above_threshold(tree, &weights, total, weighted_lca_percent)
}

/// LCA-coverage-long-read (spec §4.4): like `lca_weighted` but weights
/// are per-id *covered query lengths* instead of bit-score sums — each
/// ancestor's weight is the union length of the query spans of every
/// active match whose own id's ancestor chain passes through it.
pub fn lca_coverage_long_read(
    tree: &dyn ClassificationTree,
    read: &ReadBlock,
    active: &[bool],
    classification: &str,
    weighted_lca_percent: f64,
) -> i32 {
    let mut spans: HashMap<i32, IntervalSet> = HashMap::new();
    for (kept, m) in active.iter().zip(&read.matches) {
        if !kept {
            continue;
        }
        let id = m.id(classification);
        if id <= 0 {
            continue;
        }
        for ancestor in tree.ancestors(id) {
            spans
                .entry(ancestor)
                .or_insert_with(IntervalSet::new)
                .add(m.aligned_query_start, m.aligned_query_end);
        }
    }
    let total = spans.get(&tree.root()).map(|s| s.covered_length() as f64).unwrap_or(0.0);
    let weights: HashMap<i32, f64> = spans
        .into_iter()
        .map(|(id, set)| (id, set.covered_length() as f64))
        .collect();
    deepest_above_threshold(tree, &weights, total, weighted_lca_percent)
}

/// Best-hit (spec §4.4, non-taxonomy, short-read): id of the
/// highest-scoring active match, ties broken by input order.
pub fn best_hit(read: &ReadBlock, active: &[bool], classification: &str) -> i32 {
    let mut best: Option<&crate::archive::MatchBlock> = None;
    for (kept, m) in active.iter().zip(&read.matches) {
        if !kept {
            continue;
        }
        match best {
            Some(b) if m.bit_score <= b.bit_score => {}
            _ => best = Some(m),
        }
    }
    best.map(|m| m.id(classification)).unwrap_or(0)
}

/// A non-overlapping "gene segment" seed chosen by greedy descending-score
/// selection (spec §4.4).
pub struct Segment {
    pub match_index: usize,
}

/// Greedily partition active matches into non-overlapping query segments.
///
/// Candidates are visited by descending bit-score (ties by input order).
/// A candidate is skipped — not added as a new segment — if its query
/// interval overlaps an already-chosen segment's interval by more than
/// 50% of the shorter of the two interval lengths. The returned order is
/// selection order, which is what spec §4.4 means by "the first segment".
pub fn select_segments(read: &ReadBlock, active: &[bool]) -> Vec<Segment> {
    let mut candidates: Vec<usize> = active
        .iter()
        .enumerate()
        .filter_map(|(i, &kept)| kept.then_some(i))
        .collect();
    candidates.sort_by(|&a, &b| {
        read.matches[b]
            .bit_score
            .partial_cmp(&read.matches[a].bit_score)
            .unwrap()
            .then(a.cmp(&b))
    });

    let mut chosen: Vec<(i64, i64, usize)> = Vec::new();
    for idx in candidates {
        let m = &read.matches[idx];
        let (lo, hi) = normalize(m.aligned_query_start, m.aligned_query_end);
        let overlaps_too_much = chosen.iter().any(|&(clo, chi, _)| {
            let ov = overlap_length(lo, hi, clo, chi);
            if ov == 0 {
                return false;
            }
            let shorter = (hi - lo + 1).min(chi - clo + 1);
            (ov as f64) > 0.5 * shorter as f64
        });
        if !overlaps_too_much {
            chosen.push((lo, hi, idx));
        }
    }

    chosen
        .into_iter()
        .map(|(_, _, match_index)| Segment { match_index })
        .collect()
}

#[inline]
fn normalize(start: i64, end: i64) -> (i64, i64) {
    if start <= end {
        (start, end)
    } else {
        (end, start)
    }
}

#[inline]
fn overlap_length(a_lo: i64, a_hi: i64, b_lo: i64, b_hi: i64) -> i64 {
    let lo = a_lo.max(b_lo);
    let hi = a_hi.min(b_hi);
    (hi - lo + 1).max(0)
}

/// LCA-naive-long-read for Taxonomy (spec §4.4): LCA across each
/// segment's representative id.
pub fn lca_naive_long_read(
    tree: &dyn ClassificationTree,
    read: &ReadBlock,
    segments: &[Segment],
    classification: &str,
) -> i32 {
    let ids: Vec<i32> = segments
        .iter()
        .map(|s| read.matches[s.match_index].id(classification))
        .collect();
    tree.lca_of(&ids)
}

/// Best-hit-multi-gene / naive-long-read functional output (spec §4.4):
/// one id per segment, in selection order. The pipeline treats
/// `ids[0]` as the primary assignment and the rest as "other class ids".
pub fn segment_ids(read: &ReadBlock, segments: &[Segment], classification: &str) -> Vec<i32> {
    segments
        .iter()
        .map(|s| read.matches[s.match_index].id(classification))
        .collect()
}
