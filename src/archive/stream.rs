//! Streaming archive reader.
//!
//! The compression filter and the container format are both detected from the leading bytes:
//!
//! * gzip, bzip2, xz, lzma and zstd streams are decoded on the fly, anything else is read as-is;
//! * an empty stream is the `empty` format and has no entries;
//! * a stream starting with a valid ustar/gnu header block is a `tar` container;
//! * everything else is the `raw` format: a single entry named `data`.
//!
//! Tar containers are walked with [tar::Archive] on a background thread that hands headers and
//! data blocks over a bounded channel, so entries are still read strictly in order.
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;
use std::thread::JoinHandle;

use bzip2::read::MultiBzDecoder;
use crossbeam::channel::{bounded, Receiver, Sender};
use flate2::read::MultiGzDecoder;
use liblzma::read::XzDecoder;
use liblzma::stream::Stream;
use tar::Header;
use tracing::{debug, warn};

use super::{ArchiveEntry, ArchiveError, ArchiveOpener, ArchiveReader, NextHeader};
use crate::utils::threads::spawn_named_thread;

const TAR_BLOCK: usize = 512;
const RAW_ENTRY_NAME: &str = "data";
const TAR_READER_THREAD: &str = "tar-reader";
// an lzma header is 13 bytes, every other filter magic is shorter
const FILTER_MAGIC_LEN: usize = 13;
const LZMA_MIN_DICT_SIZE: u32 = 1 << 12;
const LZMA_MAX_KNOWN_SIZE: u64 = 1 << 40;
const TRUNCATED: &str = "Truncated tar archive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    None,
    Gzip,
    Bzip2,
    Xz,
    Lzma,
    Zstd,
}

impl Filter {
    fn detect(magic: &[u8]) -> Self {
        match magic {
            [0x1f, 0x8b, ..] => Self::Gzip,
            [b'B', b'Z', b'h', level, ..] if (b'1'..=b'9').contains(level) => Self::Bzip2,
            [0xfd, b'7', b'z', b'X', b'Z', 0x00, ..] => Self::Xz,
            [0x28, 0xb5, 0x2f, 0xfd, ..] => Self::Zstd,
            _ if is_lzma_header(magic) => Self::Lzma,
            _ => Self::None,
        }
    }

    fn decoder<R>(self, input: R) -> Result<Box<dyn Read + Send>, ArchiveError>
    where
        R: Read + Send + 'static,
    {
        let decoder: Box<dyn Read + Send> = match self {
            Self::None => Box::new(input),
            Self::Gzip => Box::new(MultiGzDecoder::new(input)),
            Self::Bzip2 => Box::new(MultiBzDecoder::new(input)),
            Self::Xz => Box::new(XzDecoder::new_multi_decoder(input)),
            Self::Lzma => {
                let stream = Stream::new_lzma_decoder(u64::MAX).map_err(|err| {
                    ArchiveError::Native(format!("Failed to set up lzma decoder: {err}"))
                })?;
                Box::new(XzDecoder::new_stream(input, stream))
            }
            Self::Zstd => Box::new(zstd::stream::read::Decoder::new(input).map_err(native)?),
        };
        Ok(decoder)
    }
}

// .lzma files have no magic: the usual properties byte, a plausible dictionary size and an
// uncompressed size that is either unknown or sane.
fn is_lzma_header(header: &[u8]) -> bool {
    if header.len() < FILTER_MAGIC_LEN || header[0] != 0x5d {
        return false;
    }
    let dict_size = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    let mut size = [0u8; 8];
    size.copy_from_slice(&header[5..13]);
    let size = u64::from_le_bytes(size);

    let dict_ok = dict_size >= LZMA_MIN_DICT_SIZE
        && (dict_size.is_power_of_two()
            || (dict_size % 3 == 0 && (dict_size / 3).is_power_of_two()));
    dict_ok && (size == u64::MAX || size < LZMA_MAX_KNOWN_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Empty,
    Raw,
    Tar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Start,
    InEntry,
    Exhausted,
}

enum Body {
    Empty,
    Raw(Box<dyn Read + Send>),
    Tar(TarEntries),
}

/// Opens payload files as [StreamArchive] readers.
#[derive(Debug, Default, Clone)]
pub struct StreamArchiveOpener;

impl StreamArchiveOpener {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveOpener for StreamArchiveOpener {
    type Reader = StreamArchive;

    fn open_for_reading(
        &self,
        path: &Path,
        block_size: usize,
    ) -> Result<StreamArchive, ArchiveError> {
        StreamArchive::open(path, block_size)
    }
}

pub struct StreamArchive {
    filter: Filter,
    body: Body,
    position: Position,
}

impl StreamArchive {
    pub fn open(path: &Path, block_size: usize) -> Result<Self, ArchiveError> {
        let block_size = block_size.max(TAR_BLOCK);
        let file = File::open(path).map_err(|err| {
            ArchiveError::Native(format!("Failed to open '{}': {err}", path.display()))
        })?;
        let file = BufReader::with_capacity(block_size, file);

        let (magic, file) = peek_head(file, FILTER_MAGIC_LEN)?;
        let filter = Filter::detect(&magic);
        let stream = filter.decoder(file)?;

        let (first_block, stream) = peek_head(stream, TAR_BLOCK)?;
        let body = if first_block.is_empty() {
            Body::Empty
        } else if first_block.len() == TAR_BLOCK && is_tar_header(&first_block) {
            Body::Tar(TarEntries::spawn(Box::new(stream), block_size))
        } else {
            Body::Raw(Box::new(stream))
        };

        let archive = Self {
            filter,
            body,
            position: Position::Start,
        };
        debug!(
            path = %path.display(),
            filter = ?archive.filter,
            format = ?archive.format(),
            "archive opened for reading"
        );
        Ok(archive)
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn format(&self) -> Format {
        match self.body {
            Body::Empty => Format::Empty,
            Body::Raw(_) => Format::Raw,
            Body::Tar(_) => Format::Tar,
        }
    }
}

impl ArchiveReader for StreamArchive {
    fn next_header(&mut self) -> Result<NextHeader, ArchiveError> {
        if self.position == Position::Exhausted {
            return Err(ArchiveError::Native(
                "archive already at end of entries".to_string(),
            ));
        }

        let next = match &mut self.body {
            Body::Raw(_) if self.position == Position::Start => {
                NextHeader::Entry(ArchiveEntry::new(RAW_ENTRY_NAME, None))
            }
            Body::Empty | Body::Raw(_) => NextHeader::EndOfEntries,
            Body::Tar(entries) => entries.next_header()?,
        };
        self.position = match next {
            NextHeader::Entry(_) => Position::InEntry,
            NextHeader::EndOfEntries => Position::Exhausted,
        };
        Ok(next)
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        match (self.position, &mut self.body) {
            (Position::Start, _) => Err(ArchiveError::Native(
                "no entry positioned for reading".to_string(),
            )),
            (Position::Exhausted, _) | (_, Body::Empty) => Ok(0),
            (Position::InEntry, Body::Raw(stream)) => read_retrying(stream, buf),
            (Position::InEntry, Body::Tar(entries)) => entries.read_data(buf),
        }
    }

    fn close(self) {
        let format = self.format();
        if let Body::Tar(entries) = self.body {
            entries.close();
        }
        debug!(?format, "archive closed");
    }
}

enum TarEvent {
    Entry(ArchiveEntry),
    Data(Vec<u8>),
    End,
    Failed(String),
}

/// Consumer side of the tar walker thread.
struct TarEntries {
    events: Receiver<TarEvent>,
    // header or end marker met while reading the data of the current entry
    pending: Option<TarEvent>,
    chunk: Cursor<Vec<u8>>,
    worker: JoinHandle<()>,
}

impl TarEntries {
    fn spawn(stream: Box<dyn Read + Send>, block_size: usize) -> Self {
        let (sender, events) = bounded(1);
        let worker = spawn_named_thread(TAR_READER_THREAD, move || {
            walk_entries(stream, block_size, sender)
        });
        Self {
            events,
            pending: None,
            chunk: Cursor::new(Vec::new()),
            worker,
        }
    }

    fn recv(&mut self) -> Result<TarEvent, ArchiveError> {
        if let Some(event) = self.pending.take() {
            return Ok(event);
        }
        self.events
            .recv()
            .map_err(|_| ArchiveError::Native("tar reader stopped unexpectedly".to_string()))
    }

    fn next_header(&mut self) -> Result<NextHeader, ArchiveError> {
        self.chunk = Cursor::new(Vec::new());
        loop {
            match self.recv()? {
                // unread data of the previous entry
                TarEvent::Data(_) => continue,
                TarEvent::Entry(entry) => return Ok(NextHeader::Entry(entry)),
                TarEvent::End => return Ok(NextHeader::EndOfEntries),
                TarEvent::Failed(reason) => return Err(ArchiveError::Native(reason)),
            }
        }
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, ArchiveError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.chunk.read(buf).map_err(native)?;
            if n > 0 {
                return Ok(n);
            }
            match self.recv()? {
                TarEvent::Data(chunk) => self.chunk = Cursor::new(chunk),
                TarEvent::Failed(reason) => return Err(ArchiveError::Native(reason)),
                event => {
                    self.pending = Some(event);
                    return Ok(0);
                }
            }
        }
    }

    fn close(self) {
        let Self { events, worker, .. } = self;
        // a walker blocked on a full channel returns once the receiver is gone
        drop(events);
        if worker.join().is_err() {
            warn!("tar reader thread panicked");
        }
    }
}

enum WalkError {
    Closed,
    Failed(String),
}

fn walk_entries(stream: Box<dyn Read + Send>, block_size: usize, events: Sender<TarEvent>) {
    match send_entries(stream, block_size, &events) {
        Ok(()) | Err(WalkError::Closed) => {}
        Err(WalkError::Failed(reason)) => {
            if events.send(TarEvent::Failed(reason)).is_err() {
                debug!("tar archive closed before the error was read");
            }
        }
    }
}

fn send_entries(
    stream: Box<dyn Read + Send>,
    block_size: usize,
    events: &Sender<TarEvent>,
) -> Result<(), WalkError> {
    let send = |event| events.send(event).map_err(|_| WalkError::Closed);
    let damaged = |err: io::Error| WalkError::Failed(format!("Damaged tar archive: {err}"));

    let mut archive = tar::Archive::new(stream);
    for entry in archive.entries().map_err(damaged)? {
        let mut entry = entry.map_err(damaged)?;
        if entry.header().entry_type().is_pax_global_extensions() {
            continue;
        }

        let pathname = entry.path().map_err(damaged)?.to_string_lossy().into_owned();
        let size = entry.size();
        send(TarEvent::Entry(ArchiveEntry::new(pathname, Some(size))))?;

        let mut remaining = size;
        loop {
            let mut chunk = vec![0u8; block_size];
            let n = read_retrying(&mut entry, &mut chunk)
                .map_err(|ArchiveError::Native(reason)| WalkError::Failed(reason))?;
            if n == 0 {
                break;
            }
            chunk.truncate(n);
            remaining = remaining.saturating_sub(n as u64);
            send(TarEvent::Data(chunk))?;
        }
        if remaining > 0 {
            return Err(WalkError::Failed(TRUNCATED.to_string()));
        }
    }
    send(TarEvent::End)
}

fn native(err: io::Error) -> ArchiveError {
    ArchiveError::Native(err.to_string())
}

fn read_retrying<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> Result<usize, ArchiveError> {
    loop {
        match stream.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            result => return result.map_err(native),
        }
    }
}

/// Reads up to `len` leading bytes and hands back a reader that still yields them.
fn peek_head<R: Read>(
    mut reader: R,
    len: usize,
) -> Result<(Vec<u8>, io::Chain<Cursor<Vec<u8>>, R>), ArchiveError> {
    let mut head = Vec::with_capacity(len);
    (&mut reader)
        .take(len as u64)
        .read_to_end(&mut head)
        .map_err(native)?;
    Ok((head.clone(), Cursor::new(head).chain(reader)))
}

fn is_tar_header(block: &[u8]) -> bool {
    let header = Header::from_byte_slice(block);
    if header.as_ustar().is_none() && header.as_gnu().is_none() {
        return false;
    }
    let mut expected = header.clone();
    expected.set_cksum();
    matches!(
        (header.cksum(), expected.cksum()),
        (Ok(stored), Ok(computed)) if stored == computed
    )
}
