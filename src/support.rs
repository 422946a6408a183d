//! Min-support / disabled-taxa corrector (component C6).
//!
//! Runs once per LCA-enabled classification after the streaming loop
//! completes. Walks the ids that actually received weight bottom-up
//! (deepest first, via a depth-ordered max-heap so processing order never
//! affects the result — spec §4.6's determinism requirement) and
//! redirects any id below the support threshold, or any disabled id
//! regardless of its weight, up the tree. The returned `fromId -> toId`
//! map is fed to `UpdateLog::append_class` by the pipeline driver; actual
//! rewriting happens at commit.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::classification::ClassificationTree;

/// Compute the redirect map for one classification.
///
/// `weight_map` is `UpdateLog::class_id_to_weight_map(classification)`.
/// `threshold` is the effective min-support weight (already resolved from
/// either the absolute or percent form by the caller).
pub fn correct(
    tree: &dyn ClassificationTree,
    weight_map: &HashMap<i32, f64>,
    threshold: f64,
) -> HashMap<i32, i32> {
    let mut acc: HashMap<i32, f64> = weight_map.clone();
    let mut redirect: HashMap<i32, i32> = HashMap::new();
    let mut processed: HashSet<i32> = HashSet::new();
    let mut heap: BinaryHeap<(u32, Reverse<i32>)> = weight_map
        .keys()
        .map(|&id| (tree.depth(id), Reverse(id)))
        .collect();

    while let Some((_, Reverse(id))) = heap.pop() {
        if processed.contains(&id) || id == tree.root() {
            continue;
        }
        processed.insert(id);

        let weight = *acc.get(&id).unwrap_or(&0.0);
        let target = if tree.disabled_ids().contains(&id) {
            Some(tree.nearest_enabled_ancestor(id))
        } else if weight < threshold {
            Some(tree.parent(id))
        } else {
            None
        };

        if let Some(target) = target {
            if target != id {
                redirect.insert(id, target);
                *acc.entry(target).or_insert(0.0) += weight;
                if !processed.contains(&target) {
                    heap.push((tree.depth(target), Reverse(target)));
                }
            }
        }
    }

    redirect
}

/// Resolve the effective support threshold from either the absolute or
/// percent form (spec §4.6): `minSupportPercent`, when set, overrides
/// `minSupport` and is computed against the number of reads that reached
/// an assignment this run (with-hits plus assigned-via-mate).
pub fn effective_threshold(
    min_support: u64,
    min_support_percent: f64,
    reads_with_hits: u64,
    reads_assigned_via_mate: u64,
) -> f64 {
    if min_support_percent > 0.0 {
        (min_support_percent / 100.0 * (reads_with_hits + reads_assigned_via_mate) as f64).ceil()
    } else {
        min_support as f64
    }
}
