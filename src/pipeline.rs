//! Pipeline driver (component C7): the per-read streaming loop plus the
//! post-stream min-support correction and commit, per spec §4.7.
//!
//! A single pass over `ArchiveConnector::all_reads_iterator` assigns every
//! classification for a read and appends one entry to an `UpdateLog`.
//! `WorkerScratch` is reused across reads so the loop does not allocate a
//! fresh filter mask or `IntervalSet` per read (spec §9).

use std::collections::HashMap;

use crate::archive::{ArchiveConnector, MateReader, ReadBlock, LOW_COMPLEXITY_ID, NO_HITS_ID, UNASSIGNED_ID};
use crate::classification::ClassificationRegistry;
use crate::coverage;
use crate::error::{ClassifyError, Result};
use crate::filter;
use crate::interval::IntervalSet;
use crate::strategies::{self, FunctionalStrategy, LcaAlgorithm};
use crate::support;
use crate::updatelog::UpdateLog;

/// Match-filtering thresholds for one classification (spec §3, §4.2).
#[derive(Debug, Clone)]
pub struct FilterParams {
    pub min_score: f64,
    pub top_percent: f64,
    pub max_expected: f64,
    pub min_percent_identity: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            min_score: 0.0,
            top_percent: 10.0,
            max_expected: 1.0,
            min_percent_identity: 0.0,
        }
    }
}

/// All run parameters (spec §3). `filters` holds per-classification
/// overrides; a classification without an entry falls back to
/// `default_filter`.
#[derive(Debug, Clone)]
pub struct Params {
    pub taxonomy_name: String,
    pub functional_names: Vec<String>,
    pub filters: HashMap<String, FilterParams>,
    pub default_filter: FilterParams,
    pub lca_algorithm: LcaAlgorithm,
    pub functional_strategy: FunctionalStrategy,
    pub weighted_lca_percent: f64,
    pub use_identity_filter: bool,
    pub min_percent_coverage: f64,
    pub min_complexity: f32,
    pub min_support: u64,
    pub min_support_percent: f64,
    /// Attempt mate-pair reconciliation for reads with no passing
    /// taxonomy matches (spec §4.7 step 4). Only ever consulted against
    /// rma6 archives (`ArchiveConnector::is_rma6`).
    pub paired: bool,
    /// Long-read regime (spec §3): scales effective weight by read
    /// length, forces the taxonomy filter's `topPercent` to 100 when the
    /// algorithm is `NaiveLongRead`, and switches the coverage gate (C3)
    /// to interval-union mode instead of single-best-match mode.
    pub long_reads: bool,
    /// When true, per-class weight aggregation (min-support threshold,
    /// §4.6) sums each read's effective weight; when false it counts one
    /// per read regardless of weight (see DESIGN.md for why both readings
    /// of spec §3's `useWeightedReadCounts` are plausible and which one
    /// this crate picked).
    pub use_weighted_read_counts: bool,
}

impl Params {
    pub fn filter_for(&self, classification: &str) -> &FilterParams {
        self.filters.get(classification).unwrap_or(&self.default_filter)
    }

    /// The taxonomy filter actually applied, with `topPercent` forced to
    /// 100 in `NaiveLongRead` mode (spec §3 invariant).
    fn taxonomy_filter(&self) -> FilterParams {
        let mut f = self.filter_for(&self.taxonomy_name).clone();
        if self.lca_algorithm == LcaAlgorithm::NaiveLongRead {
            f.top_percent = 100.0;
        }
        f
    }
}

/// Run-level counters (spec §4.7, §8's counter-partition invariant).
///
/// `reads_with_hits`, `reads_no_hits`, `reads_low_complexity`, and
/// `reads_coverage_rejected` partition `reads_found` (spec §8): each read
/// contributes to exactly one of them, decided from the read's own
/// filtered-match outcome (low-complexity and coverage rejection
/// pre-empt the rest). `reads_assigned_via_mate` is a separate, additive
/// counter layered on top — mate-pair reconciliation may upgrade a
/// `no_hits`/`coverage_rejected` read's *committed* taxon id without
/// moving it out of the bucket its own matches earned it.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub reads_found: u64,
    pub reads_with_hits: u64,
    pub reads_coverage_rejected: u64,
    pub reads_assigned_via_mate: u64,
    pub reads_low_complexity: u64,
    pub reads_no_hits: u64,
}

/// Per-read scratch buffers reused across the whole streaming loop.
#[derive(Debug, Default)]
struct WorkerScratch {
    mask: Vec<bool>,
    intervals: IntervalSet,
}

/// Drive the full pipeline: stream every read, assign each classification,
/// run the min-support corrector, and commit.
pub fn run_pipeline<C: ArchiveConnector>(
    connector: &mut C,
    mate_reader: &mut impl MateReader,
    registry: &ClassificationRegistry,
    params: &Params,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<Stats> {
    let taxonomy = registry.get(&params.taxonomy_name).ok_or_else(|| ClassifyError::Malformed {
        read_uid: 0,
        message: format!("no classification tree registered for {}", params.taxonomy_name),
    })?;

    let (min_score, max_expected) = archive_prefilter_bounds(params);
    let mut iter = connector.all_reads_iterator(min_score, max_expected)?;

    let mut log = UpdateLog::new();
    let mut stats = Stats::default();
    let mut scratch = WorkerScratch::default();
    let mut mate_scratch = WorkerScratch::default();

    while let Some(read) = iter.next_read()? {
        if is_cancelled() {
            return Err(ClassifyError::Cancelled);
        }
        stats.reads_found += 1;

        let weight = (if read.weight == 0 { 1 } else { read.weight } as f64)
            * if params.long_reads { read.length as f64 } else { 1.0 };

        if read.complexity > 0.0 && read.complexity + 0.01 < params.min_complexity {
            stats.reads_low_complexity += 1;
            log.add_item(read.uid, weight, all_classifications(params).map(|name| (name, LOW_COMPLEXITY_ID)).collect());
            continue;
        }

        let taxonomy_filter = params.taxonomy_filter();
        filter::compute(
            taxonomy_filter.min_score,
            taxonomy_filter.top_percent,
            taxonomy_filter.max_expected,
            taxonomy_filter.min_percent_identity,
            &read,
            &params.taxonomy_name,
            &mut scratch.mask,
        );

        // Pre-mate partition (spec §4.7 step 3, §8): decided solely from
        // this read's own filtered matches, before any mate-pair lookup.
        let mut taxon_id = if !scratch.mask.iter().any(|&k| k) {
            stats.reads_no_hits += 1;
            NO_HITS_ID
        } else {
            match assign_taxonomy(taxonomy, &read, &mut scratch, params) {
                TaxonomyOutcome::CoverageRejected => {
                    stats.reads_coverage_rejected += 1;
                    UNASSIGNED_ID
                }
                TaxonomyOutcome::Assigned(id) => {
                    stats.reads_with_hits += 1;
                    id
                }
            }
        };

        // Mate-pair reconciliation (spec §4.7 step 4): attempted for any
        // read with a mate, regardless of which bucket it landed in
        // above. Only adjusts the *committed* taxon id, never the
        // partition counters.
        if params.paired && read.mate_uid != 0 && connector.is_rma6() {
            mate_reader.seek(read.mate_uid)?;
            if let Some(mate) = mate_reader.read_block(taxonomy_filter.min_score, taxonomy_filter.max_expected)? {
                filter::compute(
                    taxonomy_filter.min_score,
                    taxonomy_filter.top_percent,
                    taxonomy_filter.max_expected,
                    taxonomy_filter.min_percent_identity,
                    &mate,
                    &params.taxonomy_name,
                    &mut mate_scratch.mask,
                );
                let mate_id = if !mate_scratch.mask.iter().any(|&k| k) {
                    NO_HITS_ID
                } else {
                    match assign_taxonomy(taxonomy, &mate, &mut mate_scratch, params) {
                        TaxonomyOutcome::CoverageRejected => UNASSIGNED_ID,
                        TaxonomyOutcome::Assigned(id) => id,
                    }
                };

                if taxon_id <= 0 && mate_id > 0 {
                    taxon_id = mate_id;
                    stats.reads_assigned_via_mate += 1;
                } else if taxon_id > 0 && mate_id > 0 {
                    // Reference behavior preserved verbatim (spec §9 open
                    // question): the `b == taxId` branch takes the mate's
                    // id rather than the LCA, which looks asymmetric
                    // against the documented intent of "combine via LCA".
                    let b = taxonomy.lca(taxon_id, mate_id);
                    if b == taxon_id {
                        taxon_id = mate_id;
                    } else if b != mate_id {
                        taxon_id = b;
                    }
                    // else (b == mate_id): keep taxon_id unchanged.
                }
            }
        }

        let mut class_ids: HashMap<String, i32> = HashMap::new();
        class_ids.insert(params.taxonomy_name.clone(), normalize_known(taxonomy, taxon_id));

        // Functional classifications running best-hit-multi-gene segment
        // their own filtered match set independently of taxonomy's own
        // segmentation (spec §4.4: "For functional classifications, each
        // segment emits a potentially distinct id; primary id is the
        // first segment's, the rest are appended through
        // getOtherClassIds"). Collected here and turned into extra update
        // log entries once `class_ids` holds every classification's
        // primary assignment for this read.
        let mut multi_gene_segments: Vec<(String, Vec<strategies::Segment>)> = Vec::new();

        for name in &params.functional_names {
            let tree = registry.get(name).ok_or_else(|| ClassifyError::Malformed {
                read_uid: read.uid,
                message: format!("no classification tree registered for {name}"),
            })?;
            let f = params.filter_for(name);
            filter::compute(f.min_score, f.top_percent, f.max_expected, f.min_percent_identity, &read, name, &mut scratch.mask);

            if params.functional_strategy == FunctionalStrategy::BestHitMultiGene && scratch.mask.iter().any(|&k| k) {
                let segments = strategies::select_segments(&read, &scratch.mask);
                let primary = strategies::segment_ids(&read, &segments, name).into_iter().next().unwrap_or(0);
                class_ids.insert(name.clone(), normalize_known(tree, primary));
                if segments.len() > 1 {
                    multi_gene_segments.push((name.clone(), segments));
                }
            } else {
                let id = assign_functional(tree, &read, &scratch.mask, name, params);
                class_ids.insert(name.clone(), normalize_known(tree, id));
            }
        }

        log.add_item(read.uid, weight, class_ids.clone());

        if params.lca_algorithm == LcaAlgorithm::NaiveLongRead && taxon_id > 0 {
            filter::compute(
                taxonomy_filter.min_score,
                taxonomy_filter.top_percent,
                taxonomy_filter.max_expected,
                taxonomy_filter.min_percent_identity,
                &read,
                &params.taxonomy_name,
                &mut scratch.mask,
            );
            let segments = strategies::select_segments(&read, &scratch.mask);
            if segments.len() > 1 {
                let per_segment_weight = weight / segments.len() as f64;
                let ids = strategies::segment_ids(&read, &segments, &params.taxonomy_name);
                for id in ids.into_iter().skip(1) {
                    let mut extra = class_ids.clone();
                    extra.insert(params.taxonomy_name.clone(), normalize_known(taxonomy, id));
                    log.add_item(read.uid, per_segment_weight, extra);
                }
            }
        }

        for (name, segments) in &multi_gene_segments {
            let tree = registry.get(name).expect("validated above");
            let per_segment_weight = weight / segments.len() as f64;
            let ids = strategies::segment_ids(&read, segments, name);
            for id in ids.into_iter().skip(1) {
                let mut extra = class_ids.clone();
                extra.insert(name.clone(), normalize_known(tree, id));
                log.add_item(read.uid, per_segment_weight, extra);
            }
        }
    }

    // Post-stream min-support / disabled-taxa correction (spec §4.6),
    // restricted to the LCA-driven classifications: taxonomy always runs
    // an LCA, functional classifications only when configured for one.
    let mut lca_classifications: Vec<String> = vec![params.taxonomy_name.clone()];
    if params.functional_strategy == FunctionalStrategy::Lca {
        lca_classifications.extend(params.functional_names.iter().cloned());
    }

    let threshold = support::effective_threshold(
        params.min_support,
        params.min_support_percent,
        stats.reads_with_hits,
        stats.reads_assigned_via_mate,
    );

    for name in &lca_classifications {
        let tree = registry.get(name).expect("registered above");
        let weights = if params.use_weighted_read_counts {
            log.class_id_to_weight_map(name)
        } else {
            log.class_id_to_count_map(name)
        };
        let redirect = support::correct(tree, &weights, threshold);
        for (from_id, to_id) in redirect {
            log.append_class(name, from_id, to_id);
        }
    }

    let classification_names: Vec<String> = all_classifications(params).collect();
    log.commit(connector, &classification_names)?;

    connector.set_number_of_reads(stats.reads_found);
    Ok(stats)
}

fn all_classifications(params: &Params) -> impl Iterator<Item = String> + '_ {
    std::iter::once(params.taxonomy_name.clone()).chain(params.functional_names.iter().cloned())
}

/// Widest min-score / max-expected bounds across every classification's
/// filter, so the archive-level prefilter never drops a match some
/// classification's own filter would otherwise have kept.
fn archive_prefilter_bounds(params: &Params) -> (f64, f64) {
    let mut min_score = params.default_filter.min_score;
    let mut max_expected = params.default_filter.max_expected;
    for f in params.filters.values() {
        min_score = min_score.min(f.min_score);
        max_expected = max_expected.max(f.max_expected);
    }
    (min_score, max_expected)
}

/// Outcome of assigning taxonomy to a read whose filtered match set is
/// non-empty: either it failed the coverage gate (spec §4.7 step 3,
/// "coverage-rejected"), or a strategy ran and produced an id (which may
/// itself be 0 — e.g. a weighted-LCA threshold nobody cleared — without
/// that making the read "coverage-rejected").
enum TaxonomyOutcome {
    CoverageRejected,
    Assigned(i32),
}

fn assign_taxonomy(
    tree: &dyn crate::classification::ClassificationTree,
    read: &ReadBlock,
    scratch: &mut WorkerScratch,
    params: &Params,
) -> TaxonomyOutcome {
    let covered = if params.long_reads {
        coverage::ensure_covered(params.min_percent_coverage, read, &scratch.mask, Some(&mut scratch.intervals))
    } else {
        coverage::ensure_covered(params.min_percent_coverage, read, &scratch.mask, None)
    };
    if !covered {
        return TaxonomyOutcome::CoverageRejected;
    }

    TaxonomyOutcome::Assigned(match params.lca_algorithm {
        LcaAlgorithm::Naive => strategies::lca_naive(
            tree,
            read,
            &scratch.mask,
            &params.taxonomy_name,
            params.use_identity_filter,
            |id| tree.rank(id),
        ),
        LcaAlgorithm::Weighted => {
            strategies::lca_weighted(tree, read, &scratch.mask, &params.taxonomy_name, params.weighted_lca_percent)
        }
        LcaAlgorithm::NaiveLongRead => {
            let segments = strategies::select_segments(read, &scratch.mask);
            strategies::lca_naive_long_read(tree, read, &segments, &params.taxonomy_name)
        }
        LcaAlgorithm::CoverageLongRead => strategies::lca_coverage_long_read(
            tree,
            read,
            &scratch.mask,
            &params.taxonomy_name,
            params.weighted_lca_percent,
        ),
    })
}

/// Assigns a non-taxonomy classification's id for strategies that produce
/// exactly one id per read (`BestHit`, `Lca`). `BestHitMultiGene` is
/// handled by the caller instead, since its additional per-segment ids
/// need to become extra update-log entries rather than a single id.
fn assign_functional(
    tree: &dyn crate::classification::ClassificationTree,
    read: &ReadBlock,
    mask: &[bool],
    classification: &str,
    params: &Params,
) -> i32 {
    if !mask.iter().any(|&k| k) {
        return NO_HITS_ID;
    }
    match params.functional_strategy {
        FunctionalStrategy::BestHit => strategies::best_hit(read, mask, classification),
        FunctionalStrategy::BestHitMultiGene => {
            strategies::segment_ids(read, &strategies::select_segments(read, mask), classification)
                .into_iter()
                .next()
                .unwrap_or(0)
        }
        FunctionalStrategy::Lca => strategies::lca_functional(read, mask, classification, tree),
    }
}

/// Downgrade an id the tree doesn't know about to unassigned; negative
/// sentinels pass through unchanged (spec §4.7 step 7).
fn normalize_known(tree: &dyn crate::classification::ClassificationTree, id: i32) -> i32 {
    if id > 0 && !tree.known_ids().contains(&id) {
        UNASSIGNED_ID
    } else {
        id
    }
}
