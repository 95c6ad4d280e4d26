//! BGZF (Blocked GZIP Format) codec.
//!
//! BGZF is a concatenation of independent gzip members, each carrying its
//! own compressed size in a fixed `BC` extra field. That makes every
//! member independently decompressible, which is what lets the GZI index
//! map uncompressed offsets onto compressed block starts.

use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use crate::error::{FastaError, Result};
use crate::gzi::{CompressedBlock, GziIndex};

/// No BGZF block decompresses to more than this many bytes.
pub const MAX_BLOCK_SIZE: usize = 65_536;
/// Largest uncompressed payload that is guaranteed to fit a block once
/// compressed, derived so that `deflate_bound(payload) + 26 <= 65_536`.
pub const UNCOMPRESSED_PAYLOAD_BOUND: usize = 65_485;

const HEADER_LEN: usize = 18;
const TRAILER_LEN: usize = 8;
/// Fixed prefix: ID1 ID2 CM FLG MTIME(4) XFL OS XLEN(2) SI1 SI2 SLEN(2).
const HEADER_PREFIX: [u8; 16] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, b'B', b'C', 0x02, 0x00,
];

/// Upper bound on compressed size for a `len`-byte raw DEFLATE stream,
/// zlib's `compressBound` formula. `compress_vec` only ever writes into a
/// `Vec`'s existing spare capacity rather than growing it, so the
/// destination buffer must be sized to this bound up front: incompressible
/// input (e.g. already-compressed or random bytes) can come out slightly
/// larger than it went in.
fn deflate_bound(len: usize) -> usize
{
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

fn write_block<W: Write>(destination: &mut W, payload: &[u8]) -> Result<()>
{
    if payload.len() > UNCOMPRESSED_PAYLOAD_BOUND {
        return Err(FastaError::Argument(format!(
            "payload of {} bytes exceeds the BGZF uncompressed block bound of {UNCOMPRESSED_PAYLOAD_BOUND}",
            payload.len()
        )));
    }

    let mut compressed = Vec::with_capacity(deflate_bound(payload.len()));
    let mut compressor = Compress::new(Compression::default(), false);
    compressor
        .compress_vec(payload, &mut compressed, FlushCompress::Finish)
        .map_err(|e| FastaError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    // total block size - 1 = header + extra + compressed + trailer - 1
    let bsize = HEADER_LEN + compressed.len() + TRAILER_LEN - 1;
    if bsize + 1 >= MAX_BLOCK_SIZE {
        return Err(FastaError::Format(
            "data compressed too large to fit into a single BGZF block".to_string(),
        ));
    }

    destination
        .write_all(&HEADER_PREFIX)
        .map_err(FastaError::Io)?;
    destination
        .write_all(&(bsize as u16).to_le_bytes())
        .map_err(FastaError::Io)?;
    destination.write_all(&compressed).map_err(FastaError::Io)?;
    destination
        .write_all(&crc32(payload).to_le_bytes())
        .map_err(FastaError::Io)?;
    destination
        .write_all(&(payload.len() as u32).to_le_bytes())
        .map_err(FastaError::Io)?;

    Ok(())
}

/// Compresses `source` into a BGZF stream, splitting input into blocks of
/// at most [`UNCOMPRESSED_PAYLOAD_BOUND`] bytes. Splits opportunistically
/// at the last newline in a candidate block so blocks end on line
/// boundaries where possible, then terminates the stream with the
/// standard empty EOF block.
pub fn compress<R: Read, W: Write>(source: &mut R, destination: &mut W) -> Result<()>
{
    let mut remainder: Vec<u8> = Vec::new();

    loop {
        let mut chunk = vec![0u8; UNCOMPRESSED_PAYLOAD_BOUND - remainder.len()];
        let n = source.read(&mut chunk).map_err(FastaError::Io)?;
        chunk.truncate(n);

        let mut block = std::mem::take(&mut remainder);
        block.extend_from_slice(&chunk);

        if block.is_empty() {
            break;
        }

        match block.iter().rposition(|&b| b == b'\n') {
            Some(idx) => {
                remainder = block.split_off(idx + 1);
                write_block(destination, &block)?;
            }
            None => {
                write_block(destination, &block)?;
            }
        }

        if n == 0 {
            break;
        }
    }

    if !remainder.is_empty() {
        write_block(destination, &remainder)?;
    }

    write_block(destination, &[])?;
    Ok(())
}

/// Reads one BGZF block from `source`, decompressing its payload.
/// Returns `Ok(None)` at a clean EOF (no more bytes to read).
pub fn read_block<R: Read>(source: &mut R) -> Result<Option<Vec<u8>>>
{
    let mut header = [0u8; HEADER_LEN];
    let n = read_fill(source, &mut header)?;
    if n == 0 {
        return Ok(None);
    }
    if n < HEADER_LEN {
        return Err(FastaError::Format(
            "truncated BGZF block header".to_string(),
        ));
    }
    if header[0..2] != [0x1f, 0x8b] {
        return Err(FastaError::Format(
            "invalid gzip magic in BGZF block".to_string(),
        ));
    }

    let bsize = u16::from_le_bytes([header[16], header[17]]) as usize;
    let remainder_len = (bsize + 1)
        .checked_sub(HEADER_LEN)
        .ok_or_else(|| FastaError::Format(format!("invalid BGZF BSIZE {bsize}")))?;

    let mut remainder = vec![0u8; remainder_len];
    source.read_exact(&mut remainder).map_err(FastaError::Io)?;

    if remainder_len < TRAILER_LEN {
        return Err(FastaError::Format(
            "BGZF block too short for trailer".to_string(),
        ));
    }
    let (compressed, trailer) = remainder.split_at(remainder_len - TRAILER_LEN);
    let expected_crc = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
    let expected_isize = u32::from_le_bytes(trailer[4..8].try_into().unwrap());

    let mut payload = Vec::with_capacity(MAX_BLOCK_SIZE);
    let mut decompressor = Decompress::new(false);
    decompressor
        .decompress_vec(compressed, &mut payload, FlushDecompress::Finish)
        .map_err(|e| FastaError::Format(format!("BGZF deflate stream corrupt: {e}")))?;

    if crc32(&payload) != expected_crc {
        log::warn!("BGZF block failed CRC32 validation");
    }
    if payload.len() as u32 != expected_isize {
        log::warn!("BGZF block data size does not match metadata");
    }

    Ok(Some(payload))
}

fn read_fill<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize>
{
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..]).map_err(FastaError::Io)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Whether `source` begins with the BGZF-specific header (gzip magic plus
/// the `BC` extra subfield). Restores the stream position afterward.
pub fn is_bgzf<R: Read + Seek>(source: &mut R) -> Result<bool>
{
    let start = source.stream_position().map_err(FastaError::Io)?;
    let mut header = [0u8; HEADER_PREFIX.len()];
    let n = read_fill(source, &mut header)?;
    source
        .seek(SeekFrom::Start(start))
        .map_err(FastaError::Io)?;
    Ok(n == header.len() && header == HEADER_PREFIX)
}

/// Whether `source` begins with the plain gzip magic number. Restores the
/// stream position afterward.
pub fn is_gzip<R: Read + Seek>(source: &mut R) -> Result<bool>
{
    let start = source.stream_position().map_err(FastaError::Io)?;
    let mut header = [0u8; 2];
    let n = read_fill(source, &mut header)?;
    source
        .seek(SeekFrom::Start(start))
        .map_err(FastaError::Io)?;
    Ok(n == 2 && header == [0x1f, 0x8b])
}

/// Walks a BGZF file block by block from the start, recording
/// `(compressed_offset, uncompressed_offset)` at each block boundary.
/// Discards the redundant first entry and the trailing EOF marker before
/// building the index, matching the samtools `.gzi` layout.
pub fn build_gzi<R: Read + Seek>(source: &mut R) -> Result<GziIndex>
{
    source.seek(SeekFrom::Start(0)).map_err(FastaError::Io)?;

    let mut blocks = Vec::new();
    let mut compressed_offset = 0u64;
    let mut uncompressed_offset = 0u64;

    loop {
        let mut header = [0u8; HEADER_LEN];
        let n = read_fill(source, &mut header)?;
        if n == 0 {
            break;
        }
        if n < HEADER_LEN {
            return Err(FastaError::Format(
                "truncated BGZF block header".to_string(),
            ));
        }

        blocks.push(CompressedBlock {
            compressed_offset,
            uncompressed_offset,
        });

        let bsize = u16::from_le_bytes([header[16], header[17]]) as u64;
        let remainder_len = (bsize + 1).saturating_sub(HEADER_LEN as u64);
        source
            .seek(SeekFrom::Current(remainder_len as i64 - TRAILER_LEN as i64))
            .map_err(FastaError::Io)?;

        let mut trailer = [0u8; TRAILER_LEN];
        source.read_exact(&mut trailer).map_err(FastaError::Io)?;
        let isize = u32::from_le_bytes(trailer[4..8].try_into().unwrap());
        uncompressed_offset += isize as u64;

        compressed_offset = source.stream_position().map_err(FastaError::Io)?;
    }

    // drop the redundant (0,0) first entry and the trailing EOF marker.
    if blocks.len() >= 2 {
        blocks.remove(0);
        blocks.pop();
    } else {
        blocks.clear();
    }

    Ok(GziIndex::from_entries(blocks))
}

fn crc32(data: &[u8]) -> u32
{
    const POLY: u32 = 0xEDB8_8320;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}
