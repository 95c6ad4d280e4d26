//! FASTAFile façade and FASTARecord handle.
//!
//! Ties together the byte-range arithmetic, the BGZF/ZSTD codecs, the
//! compression dispatch, and the FAI parser into a single type that
//! answers whole-record iteration and random subsequence fetches across
//! plain, BGZF, and ZSTD-framed backing streams.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::compression::{self, Compression};
use crate::error::{FastaError, Result};
use crate::fai::FastaIndex;
use crate::gzi::GziIndex;

/// A handle to one FASTA record, either still backed by its file or
/// already materialized into an owned sequence.
///
/// A lazy handle detaches from its file the moment its sequence is
/// read in full, so a record can outlive the file it was read from.
pub enum FASTARecord<'a, R: Read + Seek>
{
    Lazy
    {
        file: &'a FASTAFile<R>, id: String
    },
    Materialized
    {
        id: String,
        description: String,
        sequence: String,
    },
}

impl<'a, R: Read + Seek> FASTARecord<'a, R>
{
    /// Sequence id.
    pub fn id(&self) -> &str
    {
        match self {
            FASTARecord::Lazy { id, .. } => id,
            FASTARecord::Materialized { id, .. } => id,
        }
    }

    /// Description text following the id on the header line, if any.
    /// Empty for a lazy handle that hasn't been materialized (the FAI
    /// does not carry descriptions).
    pub fn description(&self) -> &str
    {
        match self {
            FASTARecord::Lazy { .. } => "",
            FASTARecord::Materialized { description, .. } => description,
        }
    }

    /// Total sequence length in bases.
    pub fn len(&self) -> Result<u64>
    {
        match self {
            FASTARecord::Lazy { file, id } => file.seqid_length(id),
            FASTARecord::Materialized { sequence, .. } => Ok(sequence.chars().count() as u64),
        }
    }

    pub fn is_empty(&self) -> Result<bool>
    {
        Ok(self.len()? == 0)
    }

    /// Forces full materialization, reading the whole sequence from the
    /// file if still lazy. Idempotent.
    pub fn materialize(&mut self) -> Result<()>
    {
        if let FASTARecord::Lazy { file, id } = self {
            let sequence = file.fetch(id, None, None, None)?;
            *self = FASTARecord::Materialized {
                id: id.clone(),
                description: String::new(),
                sequence,
            };
        }
        Ok(())
    }

    /// The full sequence, materializing if necessary.
    pub fn sequence(&mut self) -> Result<&str>
    {
        self.materialize()?;
        match self {
            FASTARecord::Materialized { sequence, .. } => Ok(sequence),
            FASTARecord::Lazy { .. } => unreachable!(),
        }
    }

    /// `record[i]`: a single base at integer index `i` (negative indices
    /// count from the end).
    pub fn get(&self, i: i64) -> Result<String>
    {
        let len = self.len()? as i64;
        if i >= len || i < -len {
            return Err(FastaError::Argument(format!(
                "FASTA sequence index {i} out of range for length {len}"
            )));
        }
        let start = i;
        let stop = i + 1;
        self.slice(Some(start), Some(stop), None)
    }

    /// `record[start:stop:step]`: delegates to the file's fetch engine
    /// when still lazy, or slices the in-memory string directly once
    /// materialized.
    pub fn slice(&self, start: Option<i64>, stop: Option<i64>, step: Option<i64>)
        -> Result<String>
    {
        if let Some(0) = step {
            return Err(FastaError::Argument(
                "slice step cannot be zero".to_string(),
            ));
        }

        match self {
            FASTARecord::Lazy { file, id } => file.fetch(id, start, stop, step),
            FASTARecord::Materialized { sequence, .. } => {
                slice_materialized(sequence, start, stop, step)
            }
        }
    }
}

/// Applies the same slice semantics as [`FASTAFile::fetch`] to an
/// already-materialized in-memory sequence.
fn slice_materialized(
    sequence: &str,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<String>
{
    let chars: Vec<char> = sequence.chars().collect();
    let length = chars.len() as i64;
    let step = step.unwrap_or(1);

    let (mut start, mut stop) = normalize_bounds(start, stop, step, length)?;
    if start == stop {
        return Ok(String::new());
    }
    if (step > 0 && start > stop) || (step < 0 && start < stop) {
        return Ok(String::new());
    }
    if start > stop {
        std::mem::swap(&mut start, &mut stop);
        start += 1;
        stop += 1;
    }

    let selected: String = chars[start as usize..stop as usize].iter().collect();
    Ok(apply_step(&selected, step))
}

fn normalize_bounds(
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
    length: i64,
) -> Result<(i64, i64)>
{
    let start = match start {
        None => {
            if step > 0 {
                0
            } else {
                length
            }
        }
        Some(s) => {
            let s = if s < 0 { length + s } else { s };
            s.clamp(-1, length)
        }
    };
    let stop = match stop {
        None => {
            if step > 0 {
                length
            } else {
                -1
            }
        }
        Some(s) => {
            let s = if s < 0 { length + s } else { s };
            s.clamp(-1, length)
        }
    };
    Ok((start, stop))
}

fn apply_step(sequence: &str, step: i64) -> String
{
    if step == 1 {
        return sequence.to_string();
    }
    let chars: Vec<char> = sequence.chars().collect();
    if step > 0 {
        chars.iter().step_by(step as usize).collect()
    } else {
        chars.iter().rev().step_by((-step) as usize).collect()
    }
}

/// A FASTA file opened for indexed and/or streaming access.
pub struct FASTAFile<R: Read + Seek>
{
    path: Option<PathBuf>,
    stream: Mutex<R>,
    compression: Compression,
    index: Option<FastaIndex>,
    index_compressed: Option<GziIndex>,
}

impl FASTAFile<BufReader<File>>
{
    /// Opens a FASTA file from a path, auto-detecting compression and
    /// locating sidecar `.fai`/`.gzi` indices by suffix convention
    /// (`<path>.fai`, `<path>.gzi`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(FastaError::Io)?;
        let mut stream = BufReader::new(file);

        let compression = compression::detect(&mut stream)?;

        let fai_path = append_suffix(path, ".fai");
        let index = if fai_path.exists() {
            let fai_file = File::open(&fai_path).map_err(FastaError::Io)?;
            Some(FastaIndex::from_reader(BufReader::new(fai_file))?)
        } else {
            None
        };

        let gzi_path = append_suffix(path, ".gzi");
        let index_compressed = if compression.supports_gzi() && gzi_path.exists() {
            let gzi_file = File::open(&gzi_path).map_err(FastaError::Io)?;
            Some(GziIndex::from_reader(BufReader::new(gzi_file))?)
        } else {
            None
        };

        Ok(FASTAFile {
            path: Some(path.to_path_buf()),
            stream: Mutex::new(stream),
            compression,
            index,
            index_compressed,
        })
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf
{
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl<R: Read + Seek> FASTAFile<R>
{
    /// Wraps an already-open stream. Compression is auto-detected;
    /// `index`/`index_compressed` must be supplied explicitly since
    /// there is no path to derive sidecar files from.
    pub fn from_stream(
        mut stream: R,
        index: Option<FastaIndex>,
        index_compressed: Option<GziIndex>,
    ) -> Result<Self>
    {
        let compression = compression::detect(&mut stream)?;
        Ok(FASTAFile {
            path: None,
            stream: Mutex::new(stream),
            compression,
            index,
            index_compressed,
        })
    }

    pub fn compression(&self) -> Compression
    {
        self.compression
    }

    /// The path this file was opened from, if any. `None` for a
    /// `FASTAFile` built from an in-memory stream via
    /// [`FASTAFile::from_stream`]; such a file cannot be reopened in
    /// another process.
    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    /// Reopens this file from its backing path with a fresh stream and
    /// mutex, carrying the FAI/GZI across unchanged. Only available when
    /// the file was opened from a path, since an in-memory stream cannot
    /// be reopened elsewhere.
    pub fn try_clone(&self) -> Result<FASTAFile<BufReader<File>>>
    {
        let path = self.path.as_ref().ok_or_else(|| {
            FastaError::Capability(
                "can't clone a FASTAFile based on an in-memory stream".to_string(),
            )
        })?;
        let file = File::open(path).map_err(FastaError::Io)?;
        Ok(FASTAFile {
            path: Some(path.clone()),
            stream: Mutex::new(BufReader::new(file)),
            compression: self.compression,
            index: self.index.clone(),
            index_compressed: self.index_compressed.clone(),
        })
    }

    pub fn has_index(&self) -> bool
    {
        self.index.is_some()
    }

    pub fn contains(&self, seqid: &str) -> Result<bool>
    {
        match &self.index {
            Some(index) => Ok(index.contains(seqid)),
            None => Err(FastaError::Capability(
                "checking if a sequence is in a FASTA file requires an index".to_string(),
            )),
        }
    }

    /// Returns a lazy handle to `seqid`, failing if it isn't present in
    /// the FAI or if the file has no index at all.
    pub fn get(&self, seqid: &str) -> Result<FASTARecord<'_, R>>
    {
        let index = self.index.as_ref().ok_or_else(|| {
            FastaError::Capability("random access to a FASTA file requires an index".to_string())
        })?;
        if self.compression == Compression::Gzip {
            return Err(FastaError::Capability(
                "random access into a plain gzipped FASTA file is not supported, use bgzip"
                    .to_string(),
            ));
        }
        if !index.contains(seqid) {
            return Err(FastaError::Lookup(format!(
                "SeqID '{seqid}' is not present in FASTA file"
            )));
        }
        Ok(FASTARecord::Lazy {
            file: self,
            id: seqid.to_string(),
        })
    }

    fn seqid_length(&self, seqid: &str) -> Result<u64>
    {
        let index = self.index.as_ref().ok_or_else(|| {
            FastaError::Capability("can't lazily get length of seqid without index".to_string())
        })?;
        index
            .get(seqid)
            .map(|e| e.length)
            .ok_or_else(|| FastaError::Lookup(format!("SeqID '{seqid}' is not present")))
    }

    /// Resolves a subsequence for `seqid` over `[start, stop)` with
    /// `step`, following Python-slice semantics: negative indices count
    /// from the end, bounds clamp to `[-1, length]`, a reversed range is
    /// handled by swapping and applying `step` at the end.
    pub fn fetch(
        &self,
        seqid: &str,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<String>
    {
        let index = self.index.as_ref().ok_or_else(|| {
            FastaError::Capability(
                "cannot randomly access a FASTA file without an index".to_string(),
            )
        })?;
        let entry = index
            .get(seqid)
            .ok_or_else(|| FastaError::Lookup(format!("SeqID '{seqid}' is not present")))?;

        if self.compression != Compression::None && self.index_compressed.is_none() {
            return Err(FastaError::Capability(
                "cannot randomly access a compressed FASTA file without a compressed index"
                    .to_string(),
            ));
        }

        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(FastaError::Argument(
                "slice step cannot be zero".to_string(),
            ));
        }
        let length = entry.length as i64;

        let (mut start, mut stop) = normalize_bounds(start, stop, step, length)?;
        if start == stop {
            return Ok(String::new());
        }
        if (step > 0 && start > stop) || (step < 0 && start < stop) {
            return Ok(String::new());
        }
        if start > stop {
            std::mem::swap(&mut start, &mut stop);
            start += 1;
            stop += 1;
        }

        let byte_start_rel =
            crate::byterange::base_to_byte(start as u64, entry.linebases, entry.linewidth);
        let byte_stop_rel =
            crate::byterange::base_to_byte(stop as u64, entry.linebases, entry.linewidth);
        let byte_len = byte_stop_rel - byte_start_rel;
        let byte_start = entry.offset + byte_start_rel;

        let raw = if self.compression == Compression::None {
            let mut guard = self.stream.lock().unwrap();
            guard
                .seek(SeekFrom::Start(byte_start))
                .map_err(FastaError::Io)?;
            let mut buf = vec![0u8; byte_len as usize];
            guard.read_exact(&mut buf).map_err(FastaError::Io)?;
            buf
        } else {
            self.fetch_compressed(byte_start, byte_len)?
        };

        let sequence = strip_terminators(&raw);
        Ok(apply_step(&sequence, step))
    }

    fn fetch_compressed(&self, byte_start: u64, byte_len: u64) -> Result<Vec<u8>>
    {
        let gzi = self.index_compressed.as_ref().ok_or_else(|| {
            FastaError::Capability(
                "cannot randomly access a compressed FASTA file without a compressed index"
                    .to_string(),
            )
        })?;

        let lo = if self.compression == Compression::Bgzf {
            (byte_start / crate::bgzf::MAX_BLOCK_SIZE as u64) as usize
        } else {
            0
        };
        let block_start = gzi.covering_block(byte_start, lo);
        let block_stop = gzi.last_block_before(block_start, byte_start + byte_len);

        let mut compressed = Vec::new();
        {
            let mut guard = self.stream.lock().unwrap();
            guard
                .seek(SeekFrom::Start(gzi.compressed_offset(block_start)))
                .map_err(FastaError::Io)?;
            for i in block_start..=block_stop {
                match gzi.compressed_block_len(i) {
                    Some(len) => {
                        let mut buf = vec![0u8; len as usize];
                        guard.read_exact(&mut buf).map_err(FastaError::Io)?;
                        compressed.extend_from_slice(&buf);
                    }
                    None => {
                        let mut buf = Vec::new();
                        guard.read_to_end(&mut buf).map_err(FastaError::Io)?;
                        compressed.extend_from_slice(&buf);
                    }
                }
            }
        }

        let uncompressed = self.decompress(&compressed)?;
        let rel_start = byte_start - gzi.uncompressed_offset(block_start);
        let rel_end = (rel_start + byte_len).min(uncompressed.len() as u64);
        Ok(uncompressed[rel_start as usize..rel_end as usize].to_vec())
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>>
    {
        match self.compression {
            Compression::Bgzf => {
                let mut cursor = io::Cursor::new(compressed);
                let mut out = Vec::new();
                while let Some(block) = crate::bgzf::read_block(&mut cursor)? {
                    out.extend_from_slice(&block);
                }
                Ok(out)
            }
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                let mut cursor = io::Cursor::new(compressed);
                let mut out = Vec::new();
                while let Some(frame) = crate::zstd_codec::read_chunk(&mut cursor)? {
                    out.extend_from_slice(&frame);
                }
                Ok(out)
            }
            #[cfg(not(feature = "zstd"))]
            Compression::Zstd => Err(FastaError::Capability(
                "ZSTD support is not compiled into this build; enable the `zstd` feature"
                    .to_string(),
            )),
            Compression::None | Compression::Gzip => Err(FastaError::Capability(format!(
                "cannot decompress a chunk of {:?}",
                self.compression
            ))),
        }
    }

    /// Iterates whole records in on-disk order, selecting among the four
    /// modes by (compression, has-FAI).
    pub fn iter(&self) -> Result<FASTAIter<'_, R>>
    {
        match (self.compression, &self.index) {
            (Compression::None, Some(_))
            | (Compression::Bgzf, Some(_))
            | (Compression::Zstd, Some(_)) => Ok(FASTAIter::Indexed(IndexedIter {
                file: self,
                position: 0,
                next_header_start: 0,
            })),
            (Compression::None, None) => {
                let mut guard = self.stream.lock().unwrap();
                guard.seek(SeekFrom::Start(0)).map_err(FastaError::Io)?;
                Ok(FASTAIter::Unindexed(UnindexedIter {
                    file: self,
                    offset: 0,
                    started: false,
                }))
            }
            (Compression::Gzip, _) => {
                let mut guard = self.stream.lock().unwrap();
                guard.seek(SeekFrom::Start(0)).map_err(FastaError::Io)?;
                drop(guard);
                Ok(FASTAIter::Gzip(GzipLineIter::new(self)?))
            }
            (Compression::Bgzf, None) | (Compression::Zstd, None) => {
                Ok(FASTAIter::Chunked(ChunkedIter::new(self)?))
            }
        }
    }
}

fn strip_terminators(raw: &[u8]) -> String
{
    let mut out = String::with_capacity(raw.len());
    for &b in raw {
        if b != b'\n' && b != b'\r' {
            out.push(b as char);
        }
    }
    out
}

fn parse_header(line: &str) -> (String, String)
{
    let rest = line.trim_end_matches(['\n', '\r']);
    let rest = rest.strip_prefix('>').unwrap_or(rest);
    let mut parts = rest.splitn(2, ' ');
    let id = parts.next().unwrap_or("").to_string();
    let description = parts.next().unwrap_or("").to_string();
    (id, description)
}

/// Iterator over whole [`FASTARecord`]s, dispatching to one of the four
/// iteration strategies described in the component design.
pub enum FASTAIter<'a, R: Read + Seek>
{
    Indexed(IndexedIter<'a, R>),
    Unindexed(UnindexedIter<'a, R>),
    Gzip(GzipLineIter<'a, R>),
    Chunked(ChunkedIter<'a, R>),
}

impl<'a, R: Read + Seek> Iterator for FASTAIter<'a, R>
{
    type Item = Result<FASTARecord<'a, R>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        match self {
            FASTAIter::Indexed(it) => it.next(),
            FASTAIter::Unindexed(it) => it.next(),
            FASTAIter::Gzip(it) => it.next(),
            FASTAIter::Chunked(it) => it.next(),
        }
    }
}

/// Plain/BGZF/ZSTD iteration backed by a FAI: for each id in FAI order,
/// the exact byte span of the record is known from its entry and the
/// next entry's offset (or EOF), so a single read retrieves the whole
/// record.
pub struct IndexedIter<'a, R: Read + Seek>
{
    file: &'a FASTAFile<R>,
    position: usize,
    next_header_start: u64,
}

impl<'a, R: Read + Seek> Iterator for IndexedIter<'a, R>
{
    type Item = Result<FASTARecord<'a, R>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let index = self.file.index.as_ref()?;
        let total = index.len();
        if self.position >= total {
            return None;
        }
        let entry = index.iter().nth(self.position)?.clone();
        let is_last = self.position + 1 == total;
        self.position += 1;

        let start = self.next_header_start;
        let terminator_width = entry.linewidth - entry.linebases;
        self.next_header_start = entry.end_offset() + terminator_width;

        let record = (|| -> Result<FASTARecord<'a, R>> {
            // Compressed sources can't seek the raw file to `start`: that
            // offset is a position in the uncompressed view, so the GZI
            // must resolve it to the covering block(s) first, same as a
            // random `fetch`. The last record's end is already exact from
            // the FAI length field, so there's no need to read to EOF
            // here the way the uncompressed path does.
            let raw = match self.file.compression {
                Compression::None => {
                    if is_last {
                        self.file.read_to_eof_from(start)?
                    } else {
                        self.file
                            .read_plain_range(start, entry.end_offset() - start)?
                    }
                }
                _ => self
                    .file
                    .fetch_compressed(start, entry.end_offset() - start)?,
            };

            let text = bytes_to_text(raw)?;
            let mut lines = text.splitn(2, '\n');
            let header = lines.next().unwrap_or("");
            let (id, description) = parse_header(header);
            let sequence: String = lines
                .next()
                .unwrap_or("")
                .split('\n')
                .collect::<Vec<_>>()
                .join("");
            Ok(FASTARecord::Materialized {
                id,
                description,
                sequence,
            })
        })();

        Some(record)
    }
}

/// `raw` is already decompressed text by the time it reaches here; only
/// the UTF-8 conversion is left to do. Kept as its own function so the
/// error message is shared between the plain and compressed paths.
fn bytes_to_text(raw: Vec<u8>) -> Result<String>
{
    String::from_utf8(raw)
        .map_err(|e| FastaError::Format(format!("FASTA record is not valid UTF-8: {e}")))
}

impl<R: Read + Seek> FASTAFile<R>
{
    fn read_plain_range(&self, start: u64, len: u64) -> Result<Vec<u8>>
    {
        let mut guard = self.stream.lock().unwrap();
        guard.seek(SeekFrom::Start(start)).map_err(FastaError::Io)?;
        let mut buf = vec![0u8; len as usize];
        guard.read_exact(&mut buf).map_err(FastaError::Io)?;
        Ok(buf)
    }

    fn read_to_eof_from(&self, start: u64) -> Result<Vec<u8>>
    {
        let mut guard = self.stream.lock().unwrap();
        guard.seek(SeekFrom::Start(start)).map_err(FastaError::Io)?;
        let mut buf = Vec::new();
        guard.read_to_end(&mut buf).map_err(FastaError::Io)?;
        Ok(buf)
    }
}

/// Plain, no FAI: reads line by line, accumulating data lines between
/// headers; the first line of the file must be a header.
pub struct UnindexedIter<'a, R: Read + Seek>
{
    file: &'a FASTAFile<R>,
    offset: u64,
    started: bool,
}

impl<'a, R: Read + Seek> UnindexedIter<'a, R>
{
    fn read_line(&mut self) -> Result<Option<String>>
    {
        let mut guard = self.file.stream.lock().unwrap();
        guard
            .seek(SeekFrom::Start(self.offset))
            .map_err(FastaError::Io)?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = guard.read(&mut byte).map_err(FastaError::Io)?;
            if n == 0 {
                break;
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        self.offset = guard.stream_position().map_err(FastaError::Io)?;
        if line.is_empty() {
            return Ok(None);
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| FastaError::Format(format!("FASTA line is not valid UTF-8: {e}")))
    }
}

impl<'a, R: Read + Seek> Iterator for UnindexedIter<'a, R>
{
    type Item = Result<FASTARecord<'a, R>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let next_body = |iter: &mut Self, first_line: String| -> Result<FASTARecord<'a, R>> {
            if !first_line.starts_with('>') {
                return Err(FastaError::Format(
                    "first line in a FASTA file must start with '>'".to_string(),
                ));
            }
            let (id, description) = parse_header(&first_line);

            let mut sequence = String::new();
            loop {
                let save_offset = iter.offset;
                match iter.read_line() {
                    Ok(Some(line)) => {
                        if line.starts_with('>') {
                            iter.offset = save_offset;
                            break;
                        }
                        sequence.push_str(line.trim_end_matches(['\n', '\r']));
                    }
                    Ok(None) => break,
                    Err(e) => return Err(e),
                }
            }

            Ok(FASTARecord::Materialized {
                id,
                description,
                sequence,
            })
        };

        if !self.started {
            self.started = true;
        }

        match self.read_line() {
            Ok(Some(line)) => Some(next_body(self, line)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Plain gzip, no GZI possible: identical shape to [`UnindexedIter`], but
/// reads through a text-mode gzip decoder that remembers its own
/// position rather than seeking the shared stream (gzip is not
/// seekable).
pub struct GzipLineIter<'a, R: Read + Seek>
{
    file: &'a FASTAFile<R>,
    lines: std::iter::Peekable<std::vec::IntoIter<String>>,
}

impl<'a, R: Read + Seek> GzipLineIter<'a, R>
{
    fn new(file: &'a FASTAFile<R>) -> Result<Self>
    {
        let mut guard = file.stream.lock().unwrap();
        guard.seek(SeekFrom::Start(0)).map_err(FastaError::Io)?;
        let mut raw = Vec::new();
        guard.read_to_end(&mut raw).map_err(FastaError::Io)?;
        drop(guard);

        let mut decoder = flate2::read::GzDecoder::new(io::Cursor::new(raw));
        let mut text = String::new();
        decoder.read_to_string(&mut text).map_err(FastaError::Io)?;

        let lines: Vec<String> = text.lines().map(|l| l.to_string()).collect();
        Ok(GzipLineIter {
            file,
            lines: lines.into_iter().peekable(),
        })
    }
}

impl<'a, R: Read + Seek> Iterator for GzipLineIter<'a, R>
{
    type Item = Result<FASTARecord<'a, R>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let _ = self.file; // retained for lifetime symmetry with other modes
        let header = self.lines.next()?;
        if !header.starts_with('>') {
            return Some(Err(FastaError::Format(
                "first line in a FASTA file must start with '>'".to_string(),
            )));
        }
        let (id, description) = parse_header(&header);
        let mut sequence = String::new();
        while let Some(next_line) = self.lines.peek() {
            if next_line.starts_with('>') {
                break;
            }
            sequence.push_str(&self.lines.next().unwrap());
        }
        Some(Ok(FASTARecord::Materialized {
            id,
            description,
            sequence,
        }))
    }
}

/// BGZF/ZSTD without a FAI: consumes one chunk at a time via the codec's
/// `read_chunk`, decodes UTF-8, carries a residual buffer across chunk
/// boundaries, and splits on `\n`.
pub struct ChunkedIter<'a, R: Read + Seek>
{
    file: &'a FASTAFile<R>,
    offset: u64,
    buffer: String,
    exhausted: bool,
}

/// Finds the start of the next record after `buffer`'s own leading `>`,
/// i.e. the position of a `>` that starts a line. A `>` inside a header
/// description or sequence payload doesn't count.
fn next_header_start(buffer: &str) -> Option<usize>
{
    buffer[1..].find("\n>").map(|i| i + 2)
}

impl<'a, R: Read + Seek> ChunkedIter<'a, R>
{
    fn new(file: &'a FASTAFile<R>) -> Result<Self>
    {
        let mut guard = file.stream.lock().unwrap();
        guard.seek(SeekFrom::Start(0)).map_err(FastaError::Io)?;
        drop(guard);
        Ok(ChunkedIter {
            file,
            offset: 0,
            buffer: String::new(),
            exhausted: false,
        })
    }

    fn fill(&mut self) -> Result<bool>
    {
        if self.exhausted {
            return Ok(false);
        }
        let mut guard = self.file.stream.lock().unwrap();
        guard
            .seek(SeekFrom::Start(self.offset))
            .map_err(FastaError::Io)?;
        let chunk = compression::read_chunk(&mut *guard, self.file.compression)?;
        self.offset = guard.stream_position().map_err(FastaError::Io)?;
        drop(guard);

        match chunk {
            Some(bytes) if !bytes.is_empty() => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    FastaError::Format(format!("FASTA chunk is not valid UTF-8: {e}"))
                })?;
                self.buffer.push_str(&text);
                Ok(true)
            }
            _ => {
                self.exhausted = true;
                Ok(false)
            }
        }
    }
}

impl<'a, R: Read + Seek> Iterator for ChunkedIter<'a, R>
{
    type Item = Result<FASTARecord<'a, R>>;

    fn next(&mut self) -> Option<Self::Item>
    {
        loop {
            if self.buffer.starts_with('>') || (self.exhausted && !self.buffer.is_empty()) {
                break;
            }
            match self.fill() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => return Some(Err(e)),
            }
        }

        if self.buffer.is_empty() {
            return None;
        }
        if !self.buffer.starts_with('>') {
            return Some(Err(FastaError::Format(
                "first line in a FASTA file must start with '>'".to_string(),
            )));
        }

        loop {
            let next_header = next_header_start(&self.buffer);
            if next_header.is_some() || self.exhausted {
                break;
            }
            match self.fill() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => return Some(Err(e)),
            }
        }

        let record_text = match next_header_start(&self.buffer) {
            Some(i) => {
                let remainder = self.buffer.split_off(i);
                std::mem::replace(&mut self.buffer, remainder)
            }
            None => std::mem::take(&mut self.buffer),
        };

        let mut lines = record_text.splitn(2, '\n');
        let header = lines.next().unwrap_or("");
        let (id, description) = parse_header(header);
        let sequence: String = lines
            .next()
            .unwrap_or("")
            .split('\n')
            .collect::<Vec<_>>()
            .join("");

        Some(Ok(FASTARecord::Materialized {
            id,
            description,
            sequence,
        }))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use std::io::Cursor;

    const SPEC_FASTA: &str = ">seq1\nACTG\nACTG\nAC\n>seq2\nGTC\nG\n";
    const SPEC_FAI: &str = "seq1\t10\t6\t4\t5\nseq2\t4\t25\t3\t4\n";

    fn file_with_index() -> FASTAFile<Cursor<Vec<u8>>>
    {
        let index = FastaIndex::from_reader(io::BufReader::new(Cursor::new(
            SPEC_FAI.as_bytes().to_vec(),
        )))
        .unwrap();
        FASTAFile::from_stream(
            Cursor::new(SPEC_FASTA.as_bytes().to_vec()),
            Some(index),
            None,
        )
        .unwrap()
    }

    #[test]
    fn spec_scenarios_plain()
    {
        let file = file_with_index();

        assert_eq!(file.fetch("seq1", Some(1), Some(2), None).unwrap(), "C");
        assert_eq!(file.fetch("seq2", Some(3), Some(4), None).unwrap(), "G");
        assert_eq!(file.fetch("seq1", Some(-2), Some(-1), None).unwrap(), "A");
        assert_eq!(file.fetch("seq1", Some(0), Some(2), None).unwrap(), "AC");
        assert_eq!(file.fetch("seq1", Some(2), Some(6), None).unwrap(), "TGAC");
        assert_eq!(file.fetch("seq2", None, Some(100), None).unwrap(), "GTCG");
        assert_eq!(file.fetch("seq2", None, None, Some(-1)).unwrap(), "GCTG");
        assert_eq!(file.fetch("seq1", None, None, Some(2)).unwrap(), "ATATA");
        assert_eq!(file.fetch("seq1", Some(4), Some(4), None).unwrap(), "");
        assert_eq!(file.fetch("seq1", Some(6), Some(4), None).unwrap(), "");
        assert_eq!(file.fetch("seq1", Some(15), Some(20), None).unwrap(), "");
        assert_eq!(
            file.fetch("seq1", Some(-1), Some(4), Some(-1)).unwrap(),
            "CAGTC"
        );

        let record = file.get("seq1").unwrap();
        assert_eq!(record.len().unwrap(), 10);
        assert!(file.contains("seq1").unwrap());
        assert!(file.get("seqN").is_err());
    }

    #[test]
    fn fetch_full_record_matches_iteration()
    {
        let file = file_with_index();
        let full = file.fetch("seq1", None, None, None).unwrap();
        assert_eq!(full, "ACTGACTGAC");

        let records: Vec<_> = file.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let mut seq1 = records.into_iter().find(|r| r.id() == "seq1").unwrap();
        assert_eq!(seq1.sequence().unwrap(), "ACTGACTGAC");
    }

    #[test]
    fn iteration_order_matches_disk_order()
    {
        let file = file_with_index();
        let records: Vec<_> = file.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["seq1", "seq2"]);
    }

    #[test]
    fn unindexed_iteration_without_fai()
    {
        let file = FASTAFile::from_stream(Cursor::new(SPEC_FASTA.as_bytes().to_vec()), None, None)
            .unwrap();
        let records: Vec<_> = file.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), "seq1");
        if let FASTARecord::Materialized { sequence, .. } = &records[0] {
            assert_eq!(sequence, "ACTGACTGAC");
        } else {
            panic!("expected materialized record");
        }
    }

    #[test]
    fn fetch_requires_index()
    {
        let file = FASTAFile::from_stream(Cursor::new(SPEC_FASTA.as_bytes().to_vec()), None, None)
            .unwrap();
        let err = file.fetch("seq1", None, None, None).unwrap_err();
        assert!(matches!(err, FastaError::Capability(_)));
    }

    #[test]
    fn chunked_iteration_ignores_embedded_angle_bracket()
    {
        let raw = ">seq1 desc>with>brackets\nAC>GT\n>seq2\nGGCC\n";
        let mut compressed = Vec::new();
        crate::bgzf::compress(&mut Cursor::new(raw.as_bytes()), &mut compressed).unwrap();

        let file = FASTAFile::from_stream(Cursor::new(compressed), None, None).unwrap();
        assert_eq!(file.compression(), Compression::Bgzf);
        let records: Vec<_> = file.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["seq1", "seq2"]);

        if let FASTARecord::Materialized {
            description,
            sequence,
            ..
        } = &records[0]
        {
            assert_eq!(description, "desc>with>brackets");
            assert_eq!(sequence, "AC>GT");
        } else {
            panic!("expected materialized record");
        }
    }

    #[test]
    fn bgzf_backed_fetch_matches_plain()
    {
        let mut compressed = Vec::new();
        crate::bgzf::compress(&mut Cursor::new(SPEC_FASTA.as_bytes()), &mut compressed).unwrap();
        let gzi = crate::bgzf::build_gzi(&mut Cursor::new(compressed.clone())).unwrap();
        let index = FastaIndex::from_reader(io::BufReader::new(Cursor::new(
            SPEC_FAI.as_bytes().to_vec(),
        )))
        .unwrap();

        let file = FASTAFile::from_stream(Cursor::new(compressed), Some(index), Some(gzi)).unwrap();
        assert_eq!(file.compression(), Compression::Bgzf);
        assert_eq!(
            file.fetch("seq1", Some(-1), Some(4), Some(-1)).unwrap(),
            "CAGTC"
        );
        assert_eq!(file.fetch("seq2", None, None, None).unwrap(), "GTCG");
    }

    #[test]
    fn bgzf_backed_iteration_matches_plain()
    {
        let mut compressed = Vec::new();
        crate::bgzf::compress(&mut Cursor::new(SPEC_FASTA.as_bytes()), &mut compressed).unwrap();
        let gzi = crate::bgzf::build_gzi(&mut Cursor::new(compressed.clone())).unwrap();
        let index = FastaIndex::from_reader(io::BufReader::new(Cursor::new(
            SPEC_FAI.as_bytes().to_vec(),
        )))
        .unwrap();

        let file = FASTAFile::from_stream(Cursor::new(compressed), Some(index), Some(gzi)).unwrap();
        let records: Vec<_> = file.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["seq1", "seq2"]);

        let mut seq1 = records.into_iter().find(|r| r.id() == "seq1").unwrap();
        assert_eq!(seq1.sequence().unwrap(), "ACTGACTGAC");
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_backed_fetch_matches_plain()
    {
        let mut compressed = Vec::new();
        for line in SPEC_FASTA.split_inclusive('\n') {
            let frame = zstd::stream::encode_all(Cursor::new(line.as_bytes()), 0).unwrap();
            compressed.extend_from_slice(&frame);
        }
        let gzi = crate::zstd_codec::build_gzi(&mut Cursor::new(compressed.clone())).unwrap();
        let index = FastaIndex::from_reader(io::BufReader::new(Cursor::new(
            SPEC_FAI.as_bytes().to_vec(),
        )))
        .unwrap();

        let file = FASTAFile::from_stream(Cursor::new(compressed), Some(index), Some(gzi)).unwrap();
        assert_eq!(file.compression(), Compression::Zstd);
        assert_eq!(
            file.fetch("seq1", Some(-1), Some(4), Some(-1)).unwrap(),
            "CAGTC"
        );
        assert_eq!(file.fetch("seq2", None, None, None).unwrap(), "GTCG");
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn zstd_backed_iteration_matches_plain()
    {
        let mut compressed = Vec::new();
        for line in SPEC_FASTA.split_inclusive('\n') {
            let frame = zstd::stream::encode_all(Cursor::new(line.as_bytes()), 0).unwrap();
            compressed.extend_from_slice(&frame);
        }
        let gzi = crate::zstd_codec::build_gzi(&mut Cursor::new(compressed.clone())).unwrap();
        let index = FastaIndex::from_reader(io::BufReader::new(Cursor::new(
            SPEC_FAI.as_bytes().to_vec(),
        )))
        .unwrap();

        let file = FASTAFile::from_stream(Cursor::new(compressed), Some(index), Some(gzi)).unwrap();
        let records: Vec<_> = file.iter().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["seq1", "seq2"]);

        let mut seq1 = records.into_iter().find(|r| r.id() == "seq1").unwrap();
        assert_eq!(seq1.sequence().unwrap(), "ACTGACTGAC");
    }

    #[test]
    fn materialized_integer_index_matches_lazy()
    {
        let file = file_with_index();
        let mut record = file.get("seq1").unwrap();
        record.materialize().unwrap();
        assert_eq!(record.get(1).unwrap(), "C");
        assert_eq!(record.get(-2).unwrap(), "A");
    }

    #[test]
    fn slice_step_zero_is_an_argument_error()
    {
        let file = file_with_index();
        let record = file.get("seq1").unwrap();
        let err = record.slice(None, None, Some(0)).unwrap_err();
        assert!(matches!(err, FastaError::Argument(_)));
    }
}
