//! Flat-file parsing for the demo archive and classification-tree formats
//! (SPEC_FULL.md §6.4). These formats exist only for the CLI harness and
//! the test suite; they are not the persisted archive contract, which is
//! out of scope for this crate.
//!
//! Reads file, one read per line, tab-separated:
//! `uid  name  weight  length  complexity  mateUid  matches`
//! where `matches` is `;`-separated entries of
//! `bitScore,expected,percentIdentity,qstart,qend,taxId[,name=id]*`
//! (`percentIdentity` may be empty for "unknown"). Tree files are
//! `id\tparent` pairs, one per line, with the root mapping to itself.

use std::collections::HashMap;
use std::io::BufRead;

use memchr::memchr;

use crate::archive::{MatchBlock, ReadBlock};
use crate::error::{ClassifyError, Result};

/// Fast unsigned-integer parse, no allocation, no UTF-8 re-validation
/// (caller already has `&str`/ASCII input).
#[inline(always)]
fn parse_u64_fast(s: &str) -> Option<u64> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.wrapping_mul(10).wrapping_add(d as u64);
    }
    Some(n)
}

fn split_tab(line: &str) -> Vec<&str> {
    line.split('\t').collect()
}

/// Parse one `id\tparent` line from a classification tree file.
pub fn parse_tree_line(line: &str, line_no: usize) -> Result<(i32, i32)> {
    let cols = split_tab(line);
    if cols.len() < 2 {
        return Err(ClassifyError::Parse {
            line: line_no,
            message: "expected id<TAB>parent".to_string(),
        });
    }
    let id: i32 = cols[0].parse().map_err(|_| ClassifyError::Parse {
        line: line_no,
        message: format!("bad id '{}'", cols[0]),
    })?;
    let parent: i32 = cols[1].parse().map_err(|_| ClassifyError::Parse {
        line: line_no,
        message: format!("bad parent '{}'", cols[1]),
    })?;
    Ok((id, parent))
}

/// Read a whole `id\tparent` tree file into the parent map consumed by
/// `InMemoryClassificationTree::new`.
pub fn read_tree(reader: impl BufRead) -> Result<HashMap<i32, i32>> {
    let mut parent = HashMap::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (id, p) = parse_tree_line(&line, i + 1)?;
        parent.insert(id, p);
    }
    Ok(parent)
}

/// Parse one match entry: `bitScore,expected,percentIdentity,qstart,qend,taxId[,name=id]*`.
fn parse_match(field: &str, line_no: usize) -> Result<MatchBlock> {
    let cols: Vec<&str> = field.split(',').collect();
    if cols.len() < 6 {
        return Err(ClassifyError::Parse {
            line: line_no,
            message: format!("malformed match entry '{field}'"),
        });
    }
    let bad = |what: &str| ClassifyError::Parse {
        line: line_no,
        message: format!("bad {what} in match entry '{field}'"),
    };

    let bit_score: f64 = cols[0].parse().map_err(|_| bad("bitScore"))?;
    let expected: f64 = cols[1].parse().map_err(|_| bad("expected"))?;
    let percent_identity = if cols[2].is_empty() {
        None
    } else {
        Some(cols[2].parse::<f64>().map_err(|_| bad("percentIdentity"))?)
    };
    let aligned_query_start: i64 = cols[3].parse().map_err(|_| bad("qstart"))?;
    let aligned_query_end: i64 = cols[4].parse().map_err(|_| bad("qend"))?;
    let tax_id: i32 = cols[5].parse().map_err(|_| bad("taxId"))?;

    let mut class_ids = HashMap::new();
    class_ids.insert("Taxonomy".to_string(), tax_id);
    for extra in &cols[6..] {
        let eq = memchr(b'=', extra.as_bytes()).ok_or_else(|| bad("extra classification"))?;
        let name = &extra[..eq];
        let id: i32 = extra[eq + 1..].parse().map_err(|_| bad("extra classification id"))?;
        class_ids.insert(name.to_string(), id);
    }

    Ok(MatchBlock {
        bit_score,
        expected,
        percent_identity,
        aligned_query_start,
        aligned_query_end,
        class_ids,
    })
}

/// Parse one read line: `uid  name  weight  length  complexity  mateUid  matches`.
/// The `matches` column may be empty (a read with no alignment hits).
pub fn parse_read_line(line: &str, line_no: usize) -> Result<ReadBlock> {
    let cols = split_tab(line);
    if cols.len() < 6 {
        return Err(ClassifyError::Parse {
            line: line_no,
            message: "expected 7 tab-separated columns".to_string(),
        });
    }
    let bad = |what: &str| ClassifyError::Parse {
        line: line_no,
        message: format!("bad {what}"),
    };

    let uid = parse_u64_fast(cols[0]).ok_or_else(|| bad("uid"))?;
    let name = cols[1].to_string();
    let weight: u32 = cols[2].parse().map_err(|_| bad("weight"))?;
    let length: u32 = cols[3].parse().map_err(|_| bad("length"))?;
    let complexity: f32 = cols[4].parse().map_err(|_| bad("complexity"))?;
    let mate_uid = parse_u64_fast(cols[5]).ok_or_else(|| bad("mateUid"))?;

    let matches = match cols.get(6) {
        Some(field) if !field.is_empty() => field
            .split(';')
            .map(|m| parse_match(m, line_no))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    Ok(ReadBlock {
        uid,
        name: name.clone(),
        header: name,
        length,
        weight,
        complexity,
        mate_uid,
        matches,
    })
}

/// Read a whole reads file into memory, in file order.
pub fn read_reads(reader: impl BufRead) -> Result<Vec<ReadBlock>> {
    let mut reads = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        reads.push(parse_read_line(&line, i + 1)?);
    }
    Ok(reads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_a_read_with_two_matches_and_an_extra_classification() {
        let line = "1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,99.0,1,100,562,KEGG=42;90.0,1e-8,95.0,1,100,622";
        let read = parse_read_line(line, 1).unwrap();
        assert_eq!(read.uid, 1);
        assert_eq!(read.matches.len(), 2);
        assert_eq!(read.matches[0].id("Taxonomy"), 562);
        assert_eq!(read.matches[0].id("KEGG"), 42);
        assert_eq!(read.matches[1].id("Taxonomy"), 622);
        assert_eq!(read.matches[1].percent_identity, Some(95.0));
    }

    #[test]
    fn read_with_no_matches_column_is_empty() {
        let line = "1\tr1\t1\t1000\t0.0\t0\t";
        let read = parse_read_line(line, 1).unwrap();
        assert!(read.matches.is_empty());
    }

    #[test]
    fn unknown_percent_identity_is_none() {
        let line = "1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,,1,100,562";
        let read = parse_read_line(line, 1).unwrap();
        assert_eq!(read.matches[0].percent_identity, None);
    }

    #[test]
    fn short_line_is_a_parse_error() {
        let err = parse_read_line("1\tr1", 3).unwrap_err();
        assert!(matches!(err, ClassifyError::Parse { line: 3, .. }));
    }

    #[test]
    fn reads_a_whole_tree_file() {
        let data = "1\t1\n1224\t1\n562\t1224\n";
        let parent = read_tree(Cursor::new(data)).unwrap();
        assert_eq!(parent.get(&562), Some(&1224));
        assert_eq!(parent.get(&1), Some(&1));
    }

    #[test]
    fn reads_a_whole_reads_file_skipping_comments() {
        let data = "# comment\n1\tr1\t1\t1000\t0.0\t0\t100.0,1e-10,99.0,1,100,562\n";
        let reads = read_reads(Cursor::new(data)).unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].uid, 1);
    }
}
