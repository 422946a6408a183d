//! External archive interfaces (§6) and an in-memory reference
//! implementation used by the CLI demo harness and the test suite.
//!
//! The real binary archive reader/writer is explicitly out of scope for
//! this crate (spec §1); the pipeline driver (`pipeline.rs`) only ever
//! talks to the small traits below. `InMemoryArchive` is a minimal,
//! fully-buffered stand-in that satisfies the same streaming contract —
//! forward-only iteration plus an independent seekable mate-pair handle —
//! without depending on any concrete on-disk format.

use std::collections::HashMap;

use crate::error::Result;
use crate::updatelog::UpdateLog;

/// Sentinel: no class id assigned.
pub const UNASSIGNED_ID: i32 = 0;
/// Sentinel: read had no passing matches.
pub const NO_HITS_ID: i32 = -1;
/// Sentinel: read was rejected for low sequence complexity.
pub const LOW_COMPLEXITY_ID: i32 = -4;

/// A single alignment of a read against a reference sequence.
#[derive(Debug, Clone)]
pub struct MatchBlock {
    pub bit_score: f64,
    pub expected: f64,
    /// `None` means "unknown identity" — such matches always pass the
    /// percent-identity filter rule (spec §4.2 rule 3).
    pub percent_identity: Option<f64>,
    /// 1-based, inclusive; may be reversed (`start > end`) on the reverse
    /// strand.
    pub aligned_query_start: i64,
    pub aligned_query_end: i64,
    /// Reference-derived class id per classification name; 0 = none.
    pub class_ids: HashMap<String, i32>,
}

impl MatchBlock {
    /// `|end - start| + 1`, the aligned length regardless of orientation.
    #[inline]
    pub fn aligned_length(&self) -> u64 {
        (self.aligned_query_end - self.aligned_query_start).unsigned_abs() + 1
    }

    /// The class id this match carries for `classification`, or 0 if none.
    #[inline]
    pub fn id(&self, classification: &str) -> i32 {
        self.class_ids.get(classification).copied().unwrap_or(0)
    }
}

/// A read and its precomputed alignment matches.
#[derive(Debug, Clone)]
pub struct ReadBlock {
    pub uid: u64,
    pub name: String,
    pub header: String,
    pub length: u32,
    /// Parsed weight; 0 means "not specified", normalized to 1 downstream.
    pub weight: u32,
    /// 0.0 is treated as "unknown" per spec §3.
    pub complexity: f32,
    /// 0 if the read has no mate.
    pub mate_uid: u64,
    pub matches: Vec<MatchBlock>,
}

/// Forward-only iterator over a sample's read blocks.
pub trait ReadBlockIterator {
    fn next_read(&mut self) -> Result<Option<ReadBlock>>;
    fn progress(&self) -> u64;
    fn max_progress(&self) -> u64;
}

/// The archive collaborator the pipeline driver pulls reads from and
/// commits assignments to.
pub trait ArchiveConnector {
    type Iter: ReadBlockIterator;

    fn all_reads_iterator(&self, min_score: f64, max_expected: f64) -> Result<Self::Iter>;
    fn update_classifications(&mut self, names: &[String], log: UpdateLog) -> Result<()>;
    fn set_number_of_reads(&mut self, n: u64);
    fn classification_size(&self, name: &str) -> u64;
    /// Mate-pair reconciliation (spec §4.7 step 4) is only attempted
    /// against rma6 archives.
    fn is_rma6(&self) -> bool;
}

/// Second, independent handle used to fetch a read's mate without
/// disturbing the primary sequential iterator.
pub trait MateReader {
    fn seek(&mut self, uid: u64) -> Result<()>;
    fn read_block(&mut self, min_score: f64, max_expected: f64) -> Result<Option<ReadBlock>>;
}

/// A fully-buffered, in-memory archive: the reference implementation of
/// the connector traits above, used by tests and the CLI demo harness.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArchive {
    reads: Vec<ReadBlock>,
    rma6: bool,
    committed: HashMap<String, HashMap<u64, i32>>,
    number_of_reads: u64,
}

impl InMemoryArchive {
    pub fn new(reads: Vec<ReadBlock>, rma6: bool) -> Self {
        Self {
            reads,
            rma6,
            committed: HashMap::new(),
            number_of_reads: 0,
        }
    }

    /// Read-by-uid lookup used by the mate reader and by tests inspecting
    /// committed state.
    pub fn read_by_uid(&self, uid: u64) -> Option<&ReadBlock> {
        self.reads.iter().find(|r| r.uid == uid)
    }

    /// All reads in archive order, for callers (the CLI's output writer)
    /// that need to walk the sample once more after the pipeline commits.
    pub fn reads(&self) -> &[ReadBlock] {
        &self.reads
    }

    /// Committed `classIds[c]` for a read, after `update_classifications`.
    pub fn committed_class_id(&self, classification: &str, uid: u64) -> Option<i32> {
        self.committed.get(classification)?.get(&uid).copied()
    }

    pub fn number_of_reads(&self) -> u64 {
        self.number_of_reads
    }
}

/// Iterator over an `InMemoryArchive`'s reads, applying the archive-level
/// score/expected prefilter the real connector would apply before the
/// read ever reaches the pipeline.
pub struct InMemoryIterator {
    reads: std::vec::IntoIter<ReadBlock>,
    min_score: f64,
    max_expected: f64,
    seen: u64,
    total: u64,
}

impl ReadBlockIterator for InMemoryIterator {
    fn next_read(&mut self) -> Result<Option<ReadBlock>> {
        for mut read in self.reads.by_ref() {
            read.matches
                .retain(|m| m.bit_score >= self.min_score && m.expected <= self.max_expected);
            self.seen += 1;
            return Ok(Some(read));
        }
        Ok(None)
    }

    fn progress(&self) -> u64 {
        self.seen
    }

    fn max_progress(&self) -> u64 {
        self.total
    }
}

impl ArchiveConnector for InMemoryArchive {
    type Iter = InMemoryIterator;

    fn all_reads_iterator(&self, min_score: f64, max_expected: f64) -> Result<Self::Iter> {
        let total = self.reads.len() as u64;
        Ok(InMemoryIterator {
            reads: self.reads.clone().into_iter(),
            min_score,
            max_expected,
            seen: 0,
            total,
        })
    }

    fn update_classifications(&mut self, names: &[String], log: UpdateLog) -> Result<()> {
        for name in names {
            self.committed.entry(name.clone()).or_default();
        }
        for entry in log.entries() {
            for name in names {
                if let Some(&id) = entry.class_ids.get(name) {
                    self.committed
                        .get_mut(name)
                        .expect("classification registered above")
                        .insert(entry.read_uid, id);
                }
            }
        }
        Ok(())
    }

    fn set_number_of_reads(&mut self, n: u64) {
        self.number_of_reads = n;
    }

    fn classification_size(&self, name: &str) -> u64 {
        self.committed.get(name).map(|m| m.len() as u64).unwrap_or(0)
    }

    fn is_rma6(&self) -> bool {
        self.rma6
    }
}

/// Independent seekable handle into an `InMemoryArchive`'s reads, modeling
/// the second file position the real mate-pair pathway opens (spec §9).
pub struct InMemoryMateReader {
    reads: Vec<ReadBlock>,
    cursor: Option<usize>,
}

impl InMemoryMateReader {
    pub fn new(archive: &InMemoryArchive) -> Self {
        Self {
            reads: archive.reads.clone(),
            cursor: None,
        }
    }
}

impl MateReader for InMemoryMateReader {
    fn seek(&mut self, uid: u64) -> Result<()> {
        self.cursor = self.reads.iter().position(|r| r.uid == uid);
        Ok(())
    }

    fn read_block(&mut self, min_score: f64, max_expected: f64) -> Result<Option<ReadBlock>> {
        let Some(idx) = self.cursor.take() else {
            return Ok(None);
        };
        let mut read = self.reads[idx].clone();
        read.matches
            .retain(|m| m.bit_score >= min_score && m.expected <= max_expected);
        Ok(Some(read))
    }
}
