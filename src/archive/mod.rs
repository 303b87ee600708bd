//! Streaming access to downloaded payloads.
//!
//! The [ArchiveOpener] and [ArchiveReader] traits are the only surface the rest of the agent
//! sees: open a file, walk its entries with [ArchiveReader::next_header] and pull decoded bytes
//! with [ArchiveReader::read_data]. The bundled implementation lives in [stream].
pub mod stream;

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

pub use stream::{StreamArchive, StreamArchiveOpener};

/// Default read block size for payload archives.
pub const DEFAULT_BLOCK_SIZE: usize = 10240;

/// Errors reported by the archive reader.
///
/// The message is the reader's own diagnostic, kept verbatim.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ArchiveError {
    #[error("{0}")]
    Native(String),
}

/// The entry currently positioned for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pathname: String,
    size: Option<u64>,
}

impl ArchiveEntry {
    pub fn new<S: Into<String>>(pathname: S, size: Option<u64>) -> Self {
        Self {
            pathname: pathname.into(),
            size,
        }
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// Size of the entry data when the container records it. Raw streams have no size.
    pub fn size(&self) -> Option<u64> {
        self.size
    }
}

/// Result of advancing the reader. End of entries is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextHeader {
    Entry(ArchiveEntry),
    EndOfEntries,
}

pub trait ArchiveReader {
    /// Advances to the next entry.
    ///
    /// [NextHeader::EndOfEntries] is returned once; further calls fail.
    fn next_header(&mut self) -> Result<NextHeader, ArchiveError>;

    /// Fills `buf` with up to `buf.len()` decoded bytes of the current entry.
    /// Zero means the entry is exhausted.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError>;

    /// Releases the reader. Dropping it has the same effect.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

pub trait ArchiveOpener: Send + Sync {
    type Reader: ArchiveReader;

    /// Opens `path` accepting every supported compression filter plus the raw and empty formats.
    fn open_for_reading(&self, path: &Path, block_size: usize)
        -> Result<Self::Reader, ArchiveError>;
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("writing payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("output offset of {seek} chunks of {chunk_size} bytes is out of range")]
    SeekOutOfRange { seek: u64, chunk_size: usize },
}

/// Chunk layout used to copy an entry into its destination.
///
/// `skip` and `seek` are expressed in chunks of the input and output respectively. `count`
/// limits the number of copied chunks; `None` copies until the entry is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub chunk_size: usize,
    pub skip: u64,
    pub seek: u64,
    pub count: Option<u64>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            chunk_size: 128 * 1024,
            skip: 0,
            seek: 0,
            count: None,
        }
    }
}

/// Streams the data of the current entry of `reader` into `writer`, one chunk at a time.
///
/// Returns the number of bytes written.
pub fn copy_data<R, W>(
    reader: &mut R,
    writer: &mut W,
    options: &CopyOptions,
) -> Result<u64, ExtractError>
where
    R: ArchiveReader + ?Sized,
    W: Write + Seek,
{
    let chunk_size = options.chunk_size.max(1);
    let offset = seek_offset(options.seek, chunk_size)?;
    let mut buffer = vec![0u8; chunk_size];

    for _ in 0..options.skip {
        if fill_chunk(reader, &mut buffer)? == 0 {
            return Ok(0);
        }
    }

    writer.seek(SeekFrom::Start(offset))?;

    let mut written = 0u64;
    let mut chunks = 0u64;
    while options.count.map_or(true, |count| chunks < count) {
        let len = fill_chunk(reader, &mut buffer)?;
        if len == 0 {
            break;
        }
        writer.write_all(&buffer[..len])?;
        written += len as u64;
        chunks += 1;
    }
    writer.flush()?;

    Ok(written)
}

/// Byte offset of the first written chunk, `seek * chunk_size`.
pub fn seek_offset(seek: u64, chunk_size: usize) -> Result<u64, ExtractError> {
    u64::try_from(chunk_size)
        .ok()
        .and_then(|chunk_size| seek.checked_mul(chunk_size))
        .ok_or(ExtractError::SeekOutOfRange { seek, chunk_size })
}

// Reads until the buffer is full or the entry is exhausted.
fn fill_chunk<R>(reader: &mut R, buffer: &mut [u8]) -> Result<usize, ArchiveError>
where
    R: ArchiveReader + ?Sized,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read_data(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
