//! Per-read assignment accumulation (component C5).
//!
//! `UpdateLog` is append-only during streaming (`add_item`); rewrites
//! recorded by the min-support corrector (`support.rs`) via `append_class`
//! are a separate layer composed only at `commit` time, so a read's
//! logged `classIds` never change shape mid-stream (spec §4.5 invariant).

use std::collections::HashMap;

use crate::archive::ArchiveConnector;
use crate::error::Result;

/// One `(readUid, weight, classIds[])` record (spec §3).
#[derive(Debug, Clone)]
pub struct UpdateLogEntry {
    pub read_uid: u64,
    pub weight: f64,
    pub class_ids: HashMap<String, i32>,
}

/// Accumulates per-read assignments and composes min-support rewrites at
/// commit time.
#[derive(Debug, Default)]
pub struct UpdateLog {
    entries: Vec<UpdateLogEntry>,
    /// Per-classification `fromId -> toId` rewrite rules, applied as a
    /// chain (possibly several bottom-up hops) at commit.
    rewrites: HashMap<String, HashMap<i32, i32>>,
}

impl UpdateLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            rewrites: HashMap::new(),
        }
    }

    /// Append one assignment record. Append-only: never mutates or
    /// removes existing entries.
    pub fn add_item(&mut self, read_uid: u64, weight: f64, class_ids: HashMap<String, i32>) {
        self.entries.push(UpdateLogEntry {
            read_uid,
            weight,
            class_ids,
        });
    }

    pub fn entries(&self) -> &[UpdateLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of weights grouped by `classIds[classification]`, as the log
    /// stands right now (before any rewrites are applied). This is what
    /// the min-support corrector (C6) reads to decide which ids fall
    /// below threshold.
    pub fn class_id_to_weight_map(&self, classification: &str) -> HashMap<i32, f64> {
        let mut totals: HashMap<i32, f64> = HashMap::new();
        for entry in &self.entries {
            if let Some(&id) = entry.class_ids.get(classification) {
                *totals.entry(id).or_insert(0.0) += entry.weight;
            }
        }
        totals
    }

    /// Count of entries grouped by `classIds[classification]`, ignoring
    /// weight entirely (each entry contributes 1.0). Used by the
    /// min-support corrector instead of `class_id_to_weight_map` when
    /// `useWeightedReadCounts` is off (spec §3) — support is measured in
    /// read counts rather than summed weight.
    pub fn class_id_to_count_map(&self, classification: &str) -> HashMap<i32, f64> {
        let mut totals: HashMap<i32, f64> = HashMap::new();
        for entry in &self.entries {
            if let Some(&id) = entry.class_ids.get(classification) {
                *totals.entry(id).or_insert(0.0) += 1.0;
            }
        }
        totals
    }

    /// Record that, in `classification`, entries currently assigned
    /// `from_id` should be reinterpreted as `to_id` at commit.
    pub fn append_class(&mut self, classification: &str, from_id: i32, to_id: i32) {
        self.rewrites
            .entry(classification.to_string())
            .or_default()
            .insert(from_id, to_id);
    }

    /// Follow the rewrite chain for `id` in `classification` to its fixed
    /// point. Bounded by the number of rewrite rules to guard against an
    /// accidental cycle.
    fn resolve(&self, classification: &str, id: i32) -> i32 {
        let Some(rules) = self.rewrites.get(classification) else {
            return id;
        };
        let mut current = id;
        for _ in 0..rules.len() + 1 {
            match rules.get(&current) {
                Some(&next) if next != current => current = next,
                _ => return current,
            }
        }
        current
    }

    /// Apply all recorded rewrites, then hand the resulting entries to
    /// the archive connector. The only operation in the pipeline that may
    /// perform I/O.
    pub fn commit<C: ArchiveConnector>(
        mut self,
        connector: &mut C,
        classification_names: &[String],
    ) -> Result<()> {
        for entry in &mut self.entries {
            for name in classification_names {
                if let Some(&id) = entry.class_ids.get(name) {
                    let resolved = self.resolve(name, id);
                    entry.class_ids.insert(name.clone(), resolved);
                }
            }
        }
        connector.update_classifications(classification_names, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(pairs: &[(&str, i32)]) -> HashMap<String, i32> {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn weight_map_aggregates_by_class_id() {
        let mut log = UpdateLog::new();
        log.add_item(1, 3.0, ids(&[("Taxonomy", 562)]));
        log.add_item(2, 2.0, ids(&[("Taxonomy", 562)]));
        log.add_item(3, 5.0, ids(&[("Taxonomy", 622)]));

        let map = log.class_id_to_weight_map("Taxonomy");
        assert_eq!(map.get(&562), Some(&5.0));
        assert_eq!(map.get(&622), Some(&5.0));
    }

    #[test]
    fn rewrites_do_not_affect_weight_map_before_commit() {
        let mut log = UpdateLog::new();
        log.add_item(1, 3.0, ids(&[("Taxonomy", 562)]));
        log.append_class("Taxonomy", 562, 1224);

        let map = log.class_id_to_weight_map("Taxonomy");
        assert_eq!(map.get(&562), Some(&3.0));
        assert_eq!(map.get(&1224), None);
    }

    #[test]
    fn resolve_follows_chained_rewrites() {
        let mut log = UpdateLog::new();
        log.append_class("Taxonomy", 562, 1224);
        log.append_class("Taxonomy", 1224, 1);
        assert_eq!(log.resolve("Taxonomy", 562), 1);
        assert_eq!(log.resolve("Taxonomy", 1224), 1);
        assert_eq!(log.resolve("Taxonomy", 999), 999);
    }

    #[test]
    fn append_only_never_mutates_existing_entries() {
        let mut log = UpdateLog::new();
        log.add_item(1, 1.0, ids(&[("Taxonomy", 562)]));
        let before = log.entries()[0].class_ids.clone();
        log.append_class("Taxonomy", 562, 1224);
        assert_eq!(log.entries()[0].class_ids, before);
    }
}
