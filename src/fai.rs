//! FASTA index (.fai) builder and parser.
//!
//! The .fai format (samtools faidx) stores per-record line geometry that
//! enables O(1) random access into a FASTA file:
//!
//! ```text
//! NAME\tLENGTH\tOFFSET\tLINEBASES\tLINEWIDTH
//! ```
//!
//! - NAME: sequence identifier
//! - LENGTH: total sequence length in bases
//! - OFFSET: byte offset in the uncompressed stream of the first base
//! - LINEBASES: bases per full line
//! - LINEWIDTH: bytes per full line, including the terminator

use std::io::{self, BufRead, Write};

use indexmap::IndexMap;

use crate::error::{FastaError, Result};

/// A single entry in a FASTA index: the line geometry of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaiEntry
{
    /// Sequence identifier, e.g. `"chr1"`.
    pub name: String,
    /// Total sequence length in bases.
    pub length: u64,
    /// Byte offset in the uncompressed stream of the first base.
    pub offset: u64,
    /// Bases per full line (excludes the terminator).
    pub linebases: u64,
    /// Bytes per full line (includes the terminator).
    pub linewidth: u64,
    /// Reserved for quality-offset indices (FASTQ-style `.fai`); unused
    /// by this core.
    pub qualoffset: Option<u64>,
}

impl FaiEntry
{
    /// Byte offset, relative to the start of the uncompressed stream, of
    /// the end of this record (one past its last byte, excluding any
    /// trailing blank line).
    pub fn end_offset(&self) -> u64
    {
        self.offset + crate::byterange::base_to_byte(self.length, self.linebases, self.linewidth)
    }
}

/// An insertion-ordered mapping from sequence id to [`FaiEntry`],
/// preserving on-disk record order.
#[derive(Debug, Clone, Default)]
pub struct FastaIndex
{
    entries: IndexMap<String, FaiEntry>,
}

impl FastaIndex
{
    /// Parses a `.fai` file from any line-buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self>
    {
        let mut entries = IndexMap::new();

        for line in reader.lines() {
            let line = line.map_err(FastaError::Io)?;
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 5 {
                return Err(FastaError::Format(format!(
                    "expected 5 tab-separated fields in FAI line, got {}: {line:?}",
                    fields.len()
                )));
            }

            let parse_u64 = |s: &str, field: &str| -> Result<u64> {
                s.parse::<u64>().map_err(|_| {
                    FastaError::Format(format!("invalid {field} {s:?} in FAI line: {line:?}"))
                })
            };

            let name = fields[0].to_string();
            let entry = FaiEntry {
                name: name.clone(),
                length: parse_u64(fields[1], "length")?,
                offset: parse_u64(fields[2], "offset")?,
                linebases: parse_u64(fields[3], "linebases")?,
                linewidth: parse_u64(fields[4], "linewidth")?,
                qualoffset: None,
            };

            if entry.linewidth < entry.linebases {
                return Err(FastaError::Format(format!(
                    "linewidth {} < linebases {} for sequence '{}'",
                    entry.linewidth, entry.linebases, entry.name
                )));
            }

            if entries.insert(name.clone(), entry).is_some() {
                return Err(FastaError::Format(format!(
                    "duplicate sequence name '{name}' in FAI"
                )));
            }
        }

        Ok(FastaIndex { entries })
    }

    /// Returns the entry for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&FaiEntry>
    {
        self.entries.get(name)
    }

    /// Returns whether `name` is present in the index.
    pub fn contains(&self, name: &str) -> bool
    {
        self.entries.contains_key(name)
    }

    /// Number of indexed sequences.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Iterates entries in on-disk (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &FaiEntry>
    {
        self.entries.values()
    }

    /// Sequence ids in on-disk order.
    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.entries.keys().map(String::as_str)
    }

    /// The entry immediately following `name` in on-disk order, if any.
    pub fn entry_after(&self, name: &str) -> Option<&FaiEntry>
    {
        let idx = self.entries.get_index_of(name)?;
        self.entries.get_index(idx + 1).map(|(_, entry)| entry)
    }
}

/// Per-record accumulator used while scanning the FASTA for the FAI
/// builder below.
struct RecordState
{
    name: String,
    length: u64,
    offset: u64,
    linebases: Option<u64>,
    linewidth: Option<u64>,
    seen_short_linebases: bool,
    seen_short_linewidth: bool,
}

impl RecordState
{
    fn write(&self, destination: &mut impl Write) -> io::Result<()>
    {
        writeln!(
            destination,
            "{}\t{}\t{}\t{}\t{}",
            self.name,
            self.length,
            self.offset,
            self.linebases.unwrap_or(0),
            self.linewidth.unwrap_or(0),
        )
    }
}

/// Scans a decompressed FASTA text stream line-by-line and writes a
/// `.fai` index to `destination`.
///
/// `lines` must yield each line of the FASTA text including its
/// terminator (so offsets can be computed as cumulative byte counts);
/// the final line may omit the terminator.
pub fn build_index<R, W>(mut lines: R, destination: &mut W) -> Result<()>
where
    R: Iterator<Item = io::Result<String>>,
    W: Write,
{
    let mut offset: u64 = 0;
    let mut current: Option<RecordState> = None;
    let mut saw_blank_line = false;

    while let Some(line) = lines.next().transpose().map_err(FastaError::Io)? {
        offset += line.len() as u64;
        let stripped = line.trim_end_matches(['\n', '\r']);

        if saw_blank_line {
            return Err(FastaError::Format(
                "blank line in the middle of the FASTA file".to_string(),
            ));
        }

        if stripped.is_empty() {
            saw_blank_line = true;
            continue;
        }

        if let Some(rest) = stripped.strip_prefix('>') {
            if let Some(finished) = current.take() {
                finished.write(destination).map_err(FastaError::Io)?;
            }
            let name = rest.split_whitespace().next().unwrap_or("").to_string();
            current = Some(RecordState {
                name,
                length: 0,
                offset,
                linebases: None,
                linewidth: None,
                seen_short_linebases: false,
                seen_short_linewidth: false,
            });
        } else {
            let record = current.as_mut().ok_or_else(|| {
                FastaError::Format("sequence data before any '>' header".to_string())
            })?;

            let line_bases = stripped.len() as u64;
            match record.linebases {
                None => record.linebases = Some(line_bases),
                Some(expected) if line_bases != expected => {
                    if record.seen_short_linebases {
                        return Err(FastaError::Format(format!(
                            "unequal line bases in sequence record '{}'",
                            record.name
                        )));
                    }
                    record.seen_short_linebases = true;
                }
                _ => {}
            }

            let line_width = line.len() as u64;
            match record.linewidth {
                None => record.linewidth = Some(line_width),
                Some(expected) if line_width != expected => {
                    let terminator_width = line_width - line_bases;
                    let expected_terminator = expected - record.linebases.unwrap_or(line_bases);
                    if terminator_width != expected_terminator {
                        return Err(FastaError::Format(format!(
                            "inconsistent line terminator width in sequence record '{}'",
                            record.name
                        )));
                    }
                    if record.seen_short_linewidth {
                        return Err(FastaError::Format(format!(
                            "unequal line widths in sequence record '{}'",
                            record.name
                        )));
                    }
                    record.seen_short_linewidth = true;
                }
                _ => {}
            }

            record.length += line_bases;
        }
    }

    if let Some(finished) = current {
        finished.write(destination).map_err(FastaError::Io)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Cursor;

    fn lines_of(text: &str) -> impl Iterator<Item = io::Result<String>> + '_
    {
        let mut rest = text;
        std::iter::from_fn(move || {
            if rest.is_empty() {
                return None;
            }
            let idx = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
            let (line, tail) = rest.split_at(idx);
            rest = tail;
            Some(Ok(line.to_string()))
        })
    }

    const SPEC_FASTA: &str = ">seq1\nACTG\nACTG\nAC\n>seq2\nGTC\nG\n";

    #[test]
    fn builder_matches_spec_example()
    {
        let mut out = Vec::new();
        build_index(lines_of(SPEC_FASTA), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "seq1\t10\t6\t4\t5\nseq2\t4\t25\t3\t4\n"
        );
    }

    #[test]
    fn parser_round_trips_builder_output()
    {
        let mut fai_bytes = Vec::new();
        build_index(lines_of(SPEC_FASTA), &mut fai_bytes).unwrap();

        let index = FastaIndex::from_reader(Cursor::new(fai_bytes)).unwrap();
        assert_eq!(index.len(), 2);
        let seq1 = index.get("seq1").unwrap();
        assert_eq!(seq1.length, 10);
        assert_eq!(seq1.offset, 6);
        assert_eq!(seq1.linebases, 4);
        assert_eq!(seq1.linewidth, 5);

        assert_eq!(index.entry_after("seq1").unwrap().name, "seq2");
        assert!(index.entry_after("seq2").is_none());
    }

    #[test]
    fn tolerates_one_short_final_line()
    {
        let fasta = ">only\nACGTACGT\nACGT\n";
        let mut out = Vec::new();
        build_index(lines_of(fasta), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "only\t12\t6\t8\t9\n");
    }

    #[test]
    fn rejects_second_short_line()
    {
        let fasta = ">only\nACGTACGT\nACGT\nAC\n";
        let mut out = Vec::new();
        let err = build_index(lines_of(fasta), &mut out).unwrap_err();
        assert!(matches!(err, FastaError::Format(_)));
    }

    #[test]
    fn rejects_blank_line_mid_record()
    {
        let fasta = ">only\nACGT\n\nACGT\n";
        let mut out = Vec::new();
        let err = build_index(lines_of(fasta), &mut out).unwrap_err();
        assert!(matches!(err, FastaError::Format(_)));
    }

    #[test]
    fn allows_blank_line_at_end_of_file()
    {
        let fasta = ">only\nACGT\n\n";
        let mut out = Vec::new();
        build_index(lines_of(fasta), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "only\t4\t6\t4\t5\n");
    }

    #[test]
    fn handles_crlf_terminators()
    {
        let fasta = ">only\r\nACGT\r\nAC\r\n";
        let mut out = Vec::new();
        build_index(lines_of(fasta), &mut out).unwrap();
        // terminator width is 2 (\r\n); tolerated short final line.
        assert_eq!(String::from_utf8(out).unwrap(), "only\t6\t7\t4\t6\n");
    }

    #[test]
    fn rejects_inconsistent_terminator_width()
    {
        let fasta = ">only\nACGT\nACGT\r\n";
        let mut out = Vec::new();
        let err = build_index(lines_of(fasta), &mut out).unwrap_err();
        assert!(matches!(err, FastaError::Format(_)));
    }

    #[test]
    fn parser_rejects_malformed_line()
    {
        let err = FastaIndex::from_reader(Cursor::new(b"chr1\t100\t0\t80\n".to_vec())).unwrap_err();
        assert!(matches!(err, FastaError::Format(_)));
    }

    #[test]
    fn parser_rejects_duplicate_name()
    {
        let data = b"chr1\t100\t0\t80\t81\nchr1\t100\t200\t80\t81\n".to_vec();
        let err = FastaIndex::from_reader(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, FastaError::Format(_)));
    }
}
