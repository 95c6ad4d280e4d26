//! Block-compressed file index (.gzi), shared shape for BGZF and ZSTD.
//!
//! The .gzi format stores the boundaries between compressed blocks, each
//! paired with the count of uncompressed bytes that precede it. This
//! enables random access into a block-compressed file: to reach an
//! arbitrary uncompressed offset, binary-search for the covering block
//! and seek to its compressed offset.
//!
//! Binary format (little-endian), byte-compatible with samtools' `.gzi`:
//! `u64 count`, then `count` pairs of `(u64 compressed, u64 uncompressed)`.

use std::io::{self, Read, Write};

use crate::error::{FastaError, Result};

/// One boundary between compressed blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedBlock
{
    /// Byte offset of this block's start in the compressed file.
    pub compressed_offset: u64,
    /// Count of uncompressed bytes preceding this block.
    pub uncompressed_offset: u64,
}

/// An ordered GZI index with an implicit leading `(0, 0)` entry.
///
/// Stored as two parallel arrays so the binary search over
/// `uncompressed_offset` touches no unrelated fields.
#[derive(Debug, Clone, Default)]
pub struct GziIndex
{
    compressed_offsets: Vec<u64>,
    uncompressed_offsets: Vec<u64>,
}

impl GziIndex
{
    /// Builds an index from a full set of on-disk entries (as produced by
    /// [`crate::bgzf::build_gzi`] / the ZSTD frame indexer), prepending
    /// the implicit `(0, 0)` entry.
    pub fn from_entries(entries: Vec<CompressedBlock>) -> Self
    {
        let mut compressed_offsets = Vec::with_capacity(entries.len() + 1);
        let mut uncompressed_offsets = Vec::with_capacity(entries.len() + 1);
        compressed_offsets.push(0);
        uncompressed_offsets.push(0);
        for entry in entries {
            compressed_offsets.push(entry.compressed_offset);
            uncompressed_offsets.push(entry.uncompressed_offset);
        }
        GziIndex {
            compressed_offsets,
            uncompressed_offsets,
        }
    }

    /// Parses a `.gzi` file, prepending the implicit `(0, 0)` entry.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self>
    {
        let mut count_buf = [0u8; 8];
        reader.read_exact(&mut count_buf).map_err(FastaError::Io)?;
        let count = u64::from_le_bytes(count_buf) as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let mut pair = [0u8; 16];
            reader.read_exact(&mut pair).map_err(FastaError::Io)?;
            let compressed_offset = u64::from_le_bytes(pair[0..8].try_into().unwrap());
            let uncompressed_offset = u64::from_le_bytes(pair[8..16].try_into().unwrap());
            entries.push(CompressedBlock {
                compressed_offset,
                uncompressed_offset,
            });
        }

        Ok(Self::from_entries(entries))
    }

    /// Writes the index in `.gzi` format, omitting the implicit leading
    /// `(0, 0)` entry (callers only ever build one via
    /// [`Self::from_entries`], which always has it at index 0).
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()>
    {
        let count = self.compressed_offsets.len() as u64 - 1;
        writer.write_all(&count.to_le_bytes())?;
        for i in 1..self.compressed_offsets.len() {
            writer.write_all(&self.compressed_offsets[i].to_le_bytes())?;
            writer.write_all(&self.uncompressed_offsets[i].to_le_bytes())?;
        }
        Ok(())
    }

    /// Number of entries, including the implicit `(0, 0)` leading entry.
    pub fn len(&self) -> usize
    {
        self.compressed_offsets.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.compressed_offsets.is_empty()
    }

    /// Index of the last entry with `uncompressed_offset <= target`,
    /// searching from `lo` onward. `lo` lets BGZF narrow the search using
    /// the `MAX_BLOCK_SIZE` bound; pass 0 for an unrestricted search.
    pub fn covering_block(&self, target: u64, lo: usize) -> usize
    {
        let lo = lo.min(self.uncompressed_offsets.len() - 1);
        match self.uncompressed_offsets[lo..].binary_search(&target) {
            Ok(i) => lo + i,
            Err(0) => lo,
            Err(i) => lo + i - 1,
        }
    }

    /// Scans forward from `start_block` while the *next* entry still
    /// starts strictly before `end` (exclusive uncompressed offset),
    /// returning the index of the last block that must be read.
    pub fn last_block_before(&self, start_block: usize, end: u64) -> usize
    {
        let mut block = start_block;
        while block + 1 < self.uncompressed_offsets.len()
            && self.uncompressed_offsets[block + 1] < end
        {
            block += 1;
        }
        block
    }

    pub fn compressed_offset(&self, block: usize) -> u64
    {
        self.compressed_offsets[block]
    }

    pub fn uncompressed_offset(&self, block: usize) -> u64
    {
        self.uncompressed_offsets[block]
    }

    /// `Some(length)` if there's a following block to derive the
    /// compressed length from, `None` if `block` is the last one (read to
    /// EOF in that case).
    pub fn compressed_block_len(&self, block: usize) -> Option<u64>
    {
        self.compressed_offsets
            .get(block + 1)
            .map(|next| next - self.compressed_offsets[block])
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn sample() -> GziIndex
    {
        GziIndex::from_entries(vec![
            CompressedBlock {
                compressed_offset: 100,
                uncompressed_offset: 10_000,
            },
            CompressedBlock {
                compressed_offset: 250,
                uncompressed_offset: 20_000,
            },
            CompressedBlock {
                compressed_offset: 400,
                uncompressed_offset: 30_000,
            },
        ])
    }

    #[test]
    fn implicit_leading_entry()
    {
        let idx = sample();
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.compressed_offset(0), 0);
        assert_eq!(idx.uncompressed_offset(0), 0);
    }

    #[test]
    fn covering_block_exact_and_between()
    {
        let idx = sample();
        assert_eq!(idx.covering_block(0, 0), 0);
        assert_eq!(idx.covering_block(5_000, 0), 0);
        assert_eq!(idx.covering_block(10_000, 0), 1);
        assert_eq!(idx.covering_block(15_000, 0), 1);
        assert_eq!(idx.covering_block(25_000, 0), 2);
        assert_eq!(idx.covering_block(40_000, 0), 3);
    }

    #[test]
    fn last_block_before_scans_forward()
    {
        let idx = sample();
        let start = idx.covering_block(12_000, 0);
        assert_eq!(idx.last_block_before(start, 25_000), 2);
    }

    #[test]
    fn write_then_read_round_trips()
    {
        let idx = sample();
        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();

        let parsed = GziIndex::from_reader(io::Cursor::new(buf)).unwrap();
        assert_eq!(parsed.len(), idx.len());
        for i in 0..idx.len() {
            assert_eq!(parsed.compressed_offset(i), idx.compressed_offset(i));
            assert_eq!(parsed.uncompressed_offset(i), idx.uncompressed_offset(i));
        }
    }

    #[test]
    fn compressed_block_len_reads_to_eof_on_last()
    {
        let idx = sample();
        assert_eq!(idx.compressed_block_len(0), Some(100));
        assert_eq!(idx.compressed_block_len(3), None);
    }
}
