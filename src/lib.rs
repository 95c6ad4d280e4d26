//! Indexed random access into FASTA files backed by plain, BGZF, or
//! ZSTD-framed storage.
//!
//! A [`fasta::FASTAFile`] wraps a seekable byte stream, detects its
//! compression, and (when a `.fai`/`.gzi` sidecar is available or can be
//! built) answers `fetch(seqid, start, stop, step)` queries in time
//! proportional to the requested region rather than the whole file.

pub mod bgzf;
pub mod byterange;
pub mod compression;
pub mod error;
pub mod fai;
pub mod fasta;
pub mod gzi;
#[cfg(feature = "zstd")]
pub mod zstd_codec;

pub use error::{FastaError, Result};
pub use fasta::{FASTAFile, FASTARecord};
