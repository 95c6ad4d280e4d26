//! Error classification for the indexed FASTA engine.
//!
//! Callers need to distinguish malformed input, unsupported capability
//! requests, and failed lookups without parsing strings, so this keeps a
//! small enum that still carries `io::Error` through unchanged via `From`.

use std::fmt;
use std::io;

/// Errors produced by the FAI/GZI/BGZF/FASTA engine.
#[derive(Debug)]
pub enum FastaError
{
    /// Passed through from the backing stream.
    Io(io::Error),
    /// Malformed FASTA or index input: unequal line geometry, a blank
    /// line mid-record, a missing leading `>`, etc.
    Format(String),
    /// A sequence id was not present in the index.
    Lookup(String),
    /// The operation requires a capability the file doesn't have:
    /// random access without a FAI, compressed random access without a
    /// GZI, GZI requested for plain gzip, or ZSTD support not compiled
    /// in.
    Capability(String),
    /// An invalid argument was supplied: a zero step, an out-of-range
    /// integer index, or a key that is neither an integer nor a slice.
    Argument(String),
}

impl fmt::Display for FastaError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            FastaError::Io(e) => write!(f, "{e}"),
            FastaError::Format(msg) => write!(f, "malformed FASTA input: {msg}"),
            FastaError::Lookup(msg) => write!(f, "{msg}"),
            FastaError::Capability(msg) => write!(f, "{msg}"),
            FastaError::Argument(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FastaError
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)>
    {
        match self {
            FastaError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FastaError
{
    fn from(e: io::Error) -> Self
    {
        FastaError::Io(e)
    }
}

impl From<FastaError> for io::Error
{
    fn from(e: FastaError) -> Self
    {
        match e {
            FastaError::Io(e) => e,
            FastaError::Format(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            FastaError::Lookup(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FastaError::Capability(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            FastaError::Argument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, FastaError>;

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn format_error_displays_message()
    {
        let e = FastaError::Format("unequal line bases".to_string());
        assert_eq!(e.to_string(), "malformed FASTA input: unequal line bases");
    }

    #[test]
    fn io_error_round_trips()
    {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let wrapped: FastaError = io_err.into();
        assert!(matches!(wrapped, FastaError::Io(_)));
    }

    #[test]
    fn converts_to_io_error_with_matching_kind()
    {
        let e: io::Error = FastaError::Capability("use bgzip for random access".into()).into();
        assert_eq!(e.kind(), io::ErrorKind::Unsupported);
    }
}
