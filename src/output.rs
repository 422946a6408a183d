//! Per-read assignment table output (SPEC_FULL.md §6.4 demo format).
//!
//! Writes one line per read: `uid\tname` followed by one `\tid` per
//! classification in a fixed column order. Uses itoa for integer
//! formatting to avoid allocation in the hot path, the same way the
//! archive-adjacent formatting code in this crate's ancestry does.

use std::io::{BufWriter, Write};

use crate::error::Result;

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Buffered writer for the assignment table.
pub struct AssignmentTableWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> AssignmentTableWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    /// Write the header row naming the classification columns.
    pub fn write_header(&mut self, classifications: &[String]) -> Result<()> {
        self.writer.write_all(b"uid\tname")?;
        for name in classifications {
            self.writer.write_all(b"\t")?;
            self.writer.write_all(name.as_bytes())?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write one read's row: uid, name, then one class id per
    /// `classifications`, in that order (0 if the read has no entry for
    /// a given classification).
    pub fn write_row(&mut self, uid: u64, name: &str, classifications: &[String], class_ids: &std::collections::HashMap<String, i32>) -> Result<()> {
        self.writer.write_all(self.itoa_buf.format(uid).as_bytes())?;
        self.writer.write_all(b"\t")?;
        self.writer.write_all(name.as_bytes())?;
        for classification in classifications {
            let id = class_ids.get(classification).copied().unwrap_or(0);
            self.writer.write_all(b"\t")?;
            self.writer.write_all(self.itoa_buf.format(id).as_bytes())?;
        }
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_row() {
        let mut output = Vec::new();
        let classifications = vec!["Taxonomy".to_string(), "KEGG".to_string()];
        {
            let mut writer = AssignmentTableWriter::new(&mut output);
            writer.write_header(&classifications).unwrap();
            let mut ids = std::collections::HashMap::new();
            ids.insert("Taxonomy".to_string(), 562);
            writer.write_row(1, "r1", &classifications, &ids).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "uid\tname\tTaxonomy\tKEGG\n1\tr1\t562\t0\n");
    }
}
