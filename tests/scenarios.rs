//! Crate-level scenario tests (spec.md §8) exercised through the flat-file
//! parsing path (`readclass::parsing`) rather than through hand-built
//! `ReadBlock`/`MatchBlock` values, the way the per-module unit tests do.
//! This is the layer the CLI (`src/main.rs`) actually drives, so it is
//! worth covering end to end with real files on disk.

use std::collections::HashSet;
use std::io::{BufReader, Write};

use tempfile::NamedTempFile;

use readclass::archive::{InMemoryArchive, InMemoryMateReader};
use readclass::classification::{ClassificationRegistry, InMemoryClassificationTree};
use readclass::parsing::{read_reads, read_tree};
use readclass::pipeline::{run_pipeline, FilterParams, Params};
use readclass::strategies::{FunctionalStrategy, LcaAlgorithm};

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

/// root(1) -> 1224 (Gammaproteobacteria) -> {562 (E. coli), 622 (Shigella)}
fn tree_file() -> NamedTempFile {
    write_temp("1\t1\n1224\t1\n562\t1224\n622\t1224\n")
}

fn base_params() -> Params {
    Params {
        taxonomy_name: "Taxonomy".to_string(),
        functional_names: vec![],
        filters: Default::default(),
        default_filter: FilterParams {
            min_score: 0.0,
            top_percent: 10.0,
            max_expected: 1.0,
            min_percent_identity: 0.0,
        },
        lca_algorithm: LcaAlgorithm::Naive,
        functional_strategy: FunctionalStrategy::BestHit,
        weighted_lca_percent: 80.0,
        use_identity_filter: false,
        min_percent_coverage: 0.0,
        min_complexity: 0.0,
        min_support: 0,
        min_support_percent: 0.0,
        paired: false,
        long_reads: false,
        use_weighted_read_counts: true,
    }
}

fn run(reads_text: &str, params: &Params) -> InMemoryArchive {
    let tree_parent = read_tree(BufReader::new(tree_file().reopen().unwrap())).unwrap();
    let tree = InMemoryClassificationTree::new(tree_parent, HashSet::new());
    let mut registry = ClassificationRegistry::new();
    registry.register("Taxonomy", Box::new(tree));

    let reads_file = write_temp(reads_text);
    let reads = read_reads(BufReader::new(reads_file.reopen().unwrap())).unwrap();

    let mut archive = InMemoryArchive::new(reads, params.paired);
    let mut mate_reader = InMemoryMateReader::new(&archive);
    run_pipeline(&mut archive, &mut mate_reader, &registry, params, &|| false).unwrap();
    archive
}

/// Scenario 1 (spec.md §8): two matches on the same taxon, topPercent=10,
/// naive LCA -> taxId=562.
#[test]
fn scenario_1_same_taxon_two_matches() {
    let reads = "1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,99.0,1,100,562;95.0,1e-10,99.0,1,100,562\n";
    let params = base_params();
    let archive = run(reads, &params);
    assert_eq!(archive.committed_class_id("Taxonomy", 1), Some(562));
}

/// Scenario 2: two matches on sibling taxa -> LCA is their parent, 1224.
#[test]
fn scenario_2_siblings_lca_to_parent() {
    let reads = "1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,99.0,1,100,562;99.0,1e-10,99.0,1,100,622\n";
    let params = base_params();
    let archive = run(reads, &params);
    assert_eq!(archive.committed_class_id("Taxonomy", 1), Some(1224));
}

/// Scenario 3: low-complexity reads are flagged without running any
/// strategy, but still logged (and therefore committed) with their own
/// weight intact.
#[test]
fn scenario_3_low_complexity_read_is_flagged() {
    let reads = "1\tr1\t1\t1000\t0.1\t0\t100.0,1e-10,99.0,1,100,562\n";
    let mut params = base_params();
    params.min_complexity = 0.3;
    let archive = run(reads, &params);
    assert_eq!(archive.committed_class_id("Taxonomy", 1), Some(readclass::LOW_COMPLEXITY_ID));
}

/// Scenario 5: mate-pair reconciliation, both branches.
#[test]
fn scenario_5_mate_pair_reconciliation() {
    // taxId=0 (no hits), mate taxId=9606 -> result 9606.
    let tree_parent = {
        let mut t = std::collections::HashMap::new();
        t.insert(1, 1);
        t.insert(9604, 1);
        t.insert(9605, 9604);
        t.insert(9606, 9605);
        t
    };
    let tree = InMemoryClassificationTree::new(tree_parent, HashSet::new());
    let mut registry = ClassificationRegistry::new();
    registry.register("Taxonomy", Box::new(tree));

    let reads_text = "1\tr1\t1\t100\t0.0\t2\t\n2\tr2\t1\t100\t0.0\t1\t100.0,1e-10,99.0,1,100,9606\n";
    let reads_file = write_temp(reads_text);
    let reads = read_reads(BufReader::new(reads_file.reopen().unwrap())).unwrap();

    let mut params = base_params();
    params.paired = true;
    let mut archive = InMemoryArchive::new(reads, true);
    let mut mate_reader = InMemoryMateReader::new(&archive);
    let stats = run_pipeline(&mut archive, &mut mate_reader, &registry, &params, &|| false).unwrap();

    assert_eq!(stats.reads_assigned_via_mate, 1);
    assert_eq!(archive.committed_class_id("Taxonomy", 1), Some(9606));
}

/// Determinism (spec.md §8): identical inputs and parameters produce
/// byte-identical committed assignments across two independent runs.
#[test]
fn determinism_across_independent_runs() {
    let reads = "1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,99.0,1,100,562;99.0,1e-10,99.0,1,100,622\n\
                 2\tr2\t3\t500\t0.0\t0\t50.0,1e-5,95.0,1,100,622\n";
    let params = base_params();
    let first = run(reads, &params);
    let second = run(reads, &params);
    assert_eq!(first.committed_class_id("Taxonomy", 1), second.committed_class_id("Taxonomy", 1));
    assert_eq!(first.committed_class_id("Taxonomy", 2), second.committed_class_id("Taxonomy", 2));
}

/// Top-percent idempotence (spec.md §8): `topPercent=100` with
/// `longReads=true` agrees with `lcaAlgorithm=NaiveLongRead`'s forced
/// 100% filtering stage. Both matches share taxon 562 and fully overlap
/// in query space, so `NaiveLongRead`'s segmentation collapses to a
/// single segment and the two algorithms' fold-over-ids step sees the
/// same input either way.
#[test]
fn top_percent_100_matches_naive_long_read_filtering() {
    let reads = "1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,99.0,1,500,562;10.0,1e-10,99.0,1,500,562\n";

    let mut explicit_100 = base_params();
    explicit_100.long_reads = true;
    explicit_100.default_filter.top_percent = 100.0;
    let a = run(reads, &explicit_100);

    let mut forced_100 = base_params();
    forced_100.long_reads = true;
    forced_100.lca_algorithm = LcaAlgorithm::NaiveLongRead;
    // default_filter.top_percent left at 10; pipeline::Params::taxonomy_filter
    // forces it to 100 internally for NaiveLongRead.
    let b = run(reads, &forced_100);

    assert_eq!(a.committed_class_id("Taxonomy", 1), b.committed_class_id("Taxonomy", 1));
}
