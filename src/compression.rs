//! Compression format detection and dispatch.
//!
//! A [`FASTAFile`](crate::fasta::FASTAFile) doesn't know at compile time
//! which of plain, BGZF, gzip, or ZSTD a stream is framed as; this module
//! centralizes the "which backend does this operation" decisions so the
//! rest of the crate can work against the [`Compression`] enum instead of
//! re-deriving capability rules at every call site.

use std::io::{Read, Seek};

use crate::bgzf;
use crate::error::{FastaError, Result};
use crate::gzi::GziIndex;

/// The compression framing of a FASTA backing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression
{
    /// Uncompressed, line-wrapped text.
    None,
    /// BGZF: a concatenation of independently-deflated gzip members with
    /// a `BC` extra field carrying block size. Supports random access
    /// via a `.gzi` index.
    Bgzf,
    /// Plain (non-block) gzip. Streamable but not seekable; a `.gzi`
    /// index cannot be built for it.
    Gzip,
    /// ZSTD frame-per-block stream. Supports random access via a `.gzi`
    /// index, same shape as BGZF's.
    Zstd,
}

impl Compression
{
    /// Whether this format's random-access index (`.gzi`) can be built
    /// and used at all, independent of whether the `zstd` feature is
    /// compiled in.
    pub fn supports_gzi(self) -> bool
    {
        matches!(self, Compression::Bgzf | Compression::Zstd)
    }

    /// Whether support for this format is compiled into this build.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_enabled(self) -> bool
    {
        match self {
            Compression::Zstd => cfg!(feature = "zstd"),
            _ => true,
        }
    }
}

/// Detects a stream's compression by sniffing magic bytes, trying BGZF,
/// then plain gzip, then ZSTD (if enabled), then falling back to `None`.
/// Leaves the stream position unchanged.
pub fn detect<R: Read + Seek>(source: &mut R) -> Result<Compression>
{
    if bgzf::is_bgzf(source)? {
        return Ok(Compression::Bgzf);
    }
    if bgzf::is_gzip(source)? {
        return Ok(Compression::Gzip);
    }
    #[cfg(feature = "zstd")]
    {
        if crate::zstd_codec::is_zstd(source)? {
            return Ok(Compression::Zstd);
        }
    }
    Ok(Compression::None)
}

/// Reads and decompresses the next chunk (BGZF block or ZSTD frame) from
/// `source`. Returns `Ok(None)` at a clean EOF. Not meaningful for
/// [`Compression::None`] or [`Compression::Gzip`].
pub fn read_chunk<R: Read>(source: &mut R, compression: Compression) -> Result<Option<Vec<u8>>>
{
    match compression {
        Compression::Bgzf => bgzf::read_block(source),
        #[cfg(feature = "zstd")]
        Compression::Zstd => crate::zstd_codec::read_chunk(source),
        #[cfg(not(feature = "zstd"))]
        Compression::Zstd => Err(zstd_disabled()),
        Compression::None | Compression::Gzip => Err(FastaError::Capability(format!(
            "cannot read a compressed chunk from a {compression:?} stream"
        ))),
    }
}

/// Builds a `.gzi`-equivalent index by walking `source` from the start.
pub fn build_gzi<R: Read + Seek>(source: &mut R, compression: Compression) -> Result<GziIndex>
{
    match compression {
        Compression::Bgzf => bgzf::build_gzi(source),
        #[cfg(feature = "zstd")]
        Compression::Zstd => crate::zstd_codec::build_gzi(source),
        #[cfg(not(feature = "zstd"))]
        Compression::Zstd => Err(zstd_disabled()),
        Compression::Gzip => Err(FastaError::Capability(
            "plain gzip files can't have a useful block index; use bgzip instead".to_string(),
        )),
        Compression::None => Err(FastaError::Capability(
            "an uncompressed FASTA file doesn't need a block index".to_string(),
        )),
    }
}

#[cfg_attr(feature = "zstd", allow(dead_code))]
fn zstd_disabled() -> FastaError
{
    FastaError::Capability(
        "ZSTD support is not compiled into this build; enable the `zstd` feature".to_string(),
    )
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_bgzf()
    {
        let mut buf = Vec::new();
        bgzf::compress(&mut Cursor::new(b"ACGT\n"), &mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(detect(&mut cursor).unwrap(), Compression::Bgzf);
    }

    #[test]
    fn detects_plain()
    {
        let mut cursor = Cursor::new(b">seq1\nACGT\n".to_vec());
        assert_eq!(detect(&mut cursor).unwrap(), Compression::None);
    }

    #[test]
    fn gzip_has_no_gzi()
    {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = build_gzi(&mut cursor, Compression::Gzip).unwrap_err();
        assert!(matches!(err, FastaError::Capability(_)));
    }
}
