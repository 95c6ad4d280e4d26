//! ZSTD-framed block-compressed FASTA support.
//!
//! Unlike BGZF, a ZSTD stream has no convention reserving extra header
//! bytes for the frame's compressed size, so block boundaries are found
//! by decompressing frame-by-frame rather than by reading a fixed-size
//! header. Only present when the `zstd` feature is enabled.

use std::io::{Read, Seek, SeekFrom};

use zstd::stream::raw::Operation;

use crate::error::{FastaError, Result};
use crate::gzi::{CompressedBlock, GziIndex};

const MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Whether `source` begins with the ZSTD frame magic number. Restores
/// the stream position afterward.
pub fn is_zstd<R: Read + Seek>(source: &mut R) -> Result<bool>
{
    let start = source.stream_position().map_err(FastaError::Io)?;
    let mut header = [0u8; 4];
    let mut total = 0;
    while total < header.len() {
        let n = source.read(&mut header[total..]).map_err(FastaError::Io)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    source
        .seek(SeekFrom::Start(start))
        .map_err(FastaError::Io)?;
    Ok(total == header.len() && header == MAGIC)
}

/// Reads and decompresses exactly one ZSTD frame from `source`, leaving
/// the stream positioned at the start of the next frame. Returns
/// `Ok(None)` at a clean EOF.
///
/// Feeds the raw streaming decoder one byte at a time instead of through
/// a buffered reader: a `BufRead`-backed decoder would pull ahead into
/// the next frame and there is no way to hand those bytes back to a
/// plain `Read` source, which would corrupt frame-at-a-time iteration.
pub fn read_chunk<R: Read>(source: &mut R) -> Result<Option<Vec<u8>>>
{
    let mut first = [0u8; 1];
    if source.read(&mut first).map_err(FastaError::Io)? == 0 {
        return Ok(None);
    }

    let mut decoder = zstd::stream::raw::Decoder::new().map_err(FastaError::Io)?;
    let mut pending = vec![first[0]];
    let mut payload = Vec::new();
    let mut out_buf = vec![0u8; 1 << 16];

    loop {
        let mut input = zstd::stream::raw::InBuffer::around(&pending);
        let mut output = zstd::stream::raw::OutBuffer::around(&mut out_buf);
        let remaining = decoder
            .run(&mut input, &mut output)
            .map_err(FastaError::Io)?;
        let consumed = input.pos();
        let produced = output.pos();
        payload.extend_from_slice(&out_buf[..produced]);
        pending.drain(..consumed);

        if remaining == 0 {
            break;
        }

        let mut next_byte = [0u8; 1];
        if source.read(&mut next_byte).map_err(FastaError::Io)? == 0 {
            return Err(FastaError::Format("truncated ZSTD frame".to_string()));
        }
        pending.push(next_byte[0]);
    }

    Ok(Some(payload))
}

/// Walks a ZSTD stream frame by frame from the start, recording
/// `(compressed_offset, uncompressed_offset)` at each frame boundary.
/// Discards only the redundant leading `(0, 0)` entry; unlike BGZF,
/// there is no trailing empty-frame EOF marker to drop.
pub fn build_gzi<R: Read + Seek>(source: &mut R) -> Result<GziIndex>
{
    source.seek(SeekFrom::Start(0)).map_err(FastaError::Io)?;

    let mut blocks = Vec::new();
    let mut compressed_offset = 0u64;
    let mut uncompressed_offset = 0u64;

    loop {
        let before = compressed_offset;
        let payload = match read_chunk(source)? {
            Some(p) => p,
            None => break,
        };
        if payload.is_empty() {
            break;
        }

        blocks.push(CompressedBlock {
            compressed_offset: before,
            uncompressed_offset,
        });

        uncompressed_offset += payload.len() as u64;
        compressed_offset = source.stream_position().map_err(FastaError::Io)?;
    }

    if !blocks.is_empty() {
        blocks.remove(0);
    }

    Ok(GziIndex::from_entries(blocks))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Cursor;

    fn compress_frames(chunks: &[&[u8]]) -> Vec<u8>
    {
        let mut out = Vec::new();
        for chunk in chunks {
            let frame = zstd::stream::encode_all(Cursor::new(chunk), 0).unwrap();
            out.extend_from_slice(&frame);
        }
        out
    }

    #[test]
    fn detects_zstd_magic()
    {
        let data = compress_frames(&[b"ACGT"]);
        let mut cursor = Cursor::new(data);
        assert!(is_zstd(&mut cursor).unwrap());
        assert_eq!(cursor.stream_position().unwrap(), 0);
    }

    #[test]
    fn reads_frames_independently()
    {
        let data = compress_frames(&[b"ACGT\n", b"GGCC\n"]);
        let mut cursor = Cursor::new(data);
        let first = read_chunk(&mut cursor).unwrap().unwrap();
        assert_eq!(first, b"ACGT\n");
        let second = read_chunk(&mut cursor).unwrap().unwrap();
        assert_eq!(second, b"GGCC\n");
        assert!(read_chunk(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn build_gzi_drops_only_leading_entry()
    {
        let data = compress_frames(&[b"ACGT\n", b"GGCC\n", b"TTAA\n"]);
        let mut cursor = Cursor::new(data);
        let gzi = build_gzi(&mut cursor).unwrap();
        // implicit (0,0) plus two recorded frame starts (frames 2 and 3)
        assert_eq!(gzi.len(), 3);
        assert_eq!(gzi.uncompressed_offset(1), 5);
        assert_eq!(gzi.uncompressed_offset(2), 10);
    }
}
