use std::io::{self, Read};
use std::sync::Arc;

use log::{debug, trace};

use crate::process::Pull;
use crate::structs::page::{CAPTURE_PATTERN, FIXED_HEADER_LEN, Page, PageHeader};
use crate::utils::bitstream_io::LeSliceReader;
use crate::utils::crc::Crc32;
use crate::utils::errors::SyncError;

/// Growable working buffer for raw input bytes.
///
/// Bytes before `returned` have been consumed by the synchronizer; bytes
/// between `returned` and `fill` are committed but not yet scanned into a
/// page. Storage only grows while a clip is in flight.
#[derive(Debug, Default)]
pub struct SyncBuffer {
    data: Vec<u8>,
    fill: usize,
    returned: usize,
}

impl SyncBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            fill: 0,
            returned: 0,
        }
    }

    /// Returns a writable region of at least `n` bytes starting at
    /// [`write_offset`](Self::write_offset).
    ///
    /// Consumed bytes are compacted away first, so the offset is relative to
    /// the start of the unscanned data.
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        if self.returned > 0 {
            self.data.copy_within(self.returned..self.fill, 0);
            self.fill -= self.returned;
            self.returned = 0;
        }

        if self.data.len() - self.fill < n {
            let grown = (self.fill + n).max(self.data.len() * 2);
            self.data.resize(grown, 0);
        }

        &mut self.data[self.fill..]
    }

    /// Offset at which freshly read input must be written.
    pub fn write_offset(&self) -> usize {
        self.fill - self.returned
    }

    /// Records that `n` bytes were written into the reserved region.
    pub fn commit(&mut self, n: usize) {
        self.fill = (self.fill + n).min(self.data.len());
    }

    /// Committed bytes not yet consumed.
    pub fn unscanned(&self) -> &[u8] {
        &self.data[self.returned..self.fill]
    }

    pub fn consume(&mut self, n: usize) {
        self.returned = (self.returned + n).min(self.fill);
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Drops all pending bytes. Capacity is kept.
    pub fn reset(&mut self) {
        self.fill = 0;
        self.returned = 0;
    }
}

/// Locates pages in a byte stream that arrives in arbitrarily small pieces.
///
/// Scanning is restartable: when a page is incomplete the synchronizer
/// reports [`Pull::NeedMoreData`] and picks up at the same position once more
/// bytes have been committed.
///
/// # Example
///
/// ```rust
/// use clipq::process::Pull;
/// use clipq::process::sync::PageSynchronizer;
///
/// let mut sync = PageSynchronizer::default();
/// sync.push_bytes(&[0u8; 64]);
///
/// loop {
///     match sync.next_page() {
///         Pull::Found(page) => println!("page {}", page.sequence()),
///         Pull::Corrupt(hole) => println!("{hole}"),
///         Pull::NeedMoreData => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct PageSynchronizer {
    buffer: SyncBuffer,
    crc: Crc32,
    unsynced: bool,
    bytes_committed: u64,
    pages_found: u64,
    holes: u64,
}

impl Default for PageSynchronizer {
    fn default() -> Self {
        Self::with_capacity(8 * 1024)
    }
}

impl PageSynchronizer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: SyncBuffer::with_capacity(capacity),
            crc: Crc32::default(),
            unsynced: false,
            bytes_committed: 0,
            pages_found: 0,
            holes: 0,
        }
    }

    /// See [`SyncBuffer::reserve`].
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        self.buffer.reserve(n)
    }

    /// See [`SyncBuffer::commit`].
    pub fn commit(&mut self, n: usize) {
        self.buffer.commit(n);
        self.bytes_committed += n as u64;
    }

    /// Copies `data` into the buffer and commits it.
    pub fn push_bytes(&mut self, data: &[u8]) {
        let region = self.reserve(data.len());
        region[..data.len()].copy_from_slice(data);
        self.commit(data.len());
    }

    /// Reads at most `chunk` bytes from `source` straight into the buffer.
    ///
    /// Returns the number of bytes committed; `0` means end of input.
    pub fn read_from<R: Read + ?Sized>(&mut self, source: &mut R, chunk: usize) -> io::Result<usize> {
        let region = self.reserve(chunk);
        let count = loop {
            match source.read(&mut region[..chunk]) {
                Ok(count) => break count,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        self.commit(count);
        trace!("Read {count} bytes from the byte source");
        Ok(count)
    }

    /// Scans committed bytes for the next complete, checksum-valid page.
    pub fn next_page(&mut self) -> Pull<Page> {
        loop {
            match self.seek_page() {
                Seek::Page(page) => {
                    self.unsynced = false;
                    self.pages_found += 1;
                    return Pull::Found(page);
                }
                Seek::NeedMoreData => return Pull::NeedMoreData,
                Seek::Skipped(err) => {
                    if !self.unsynced {
                        self.unsynced = true;
                        self.holes += 1;
                        return Pull::Corrupt(err.into());
                    }
                    trace!("Still searching for a page boundary: {err}");
                }
            }
        }
    }

    fn seek_page(&mut self) -> Seek {
        let data = self.buffer.unscanned();
        let check = data.len().min(CAPTURE_PATTERN.len());

        if data[..check] != CAPTURE_PATTERN[..check] {
            return self.skip_to_capture();
        }

        if data.len() < FIXED_HEADER_LEN {
            return Seek::NeedMoreData;
        }

        let segment_count = data[FIXED_HEADER_LEN - 1] as usize;
        let header_len = FIXED_HEADER_LEN + segment_count;
        if data.len() < header_len {
            return Seek::NeedMoreData;
        }

        let lacing = &data[FIXED_HEADER_LEN..header_len];
        let body_len = lacing.iter().map(|&v| v as usize).sum::<usize>();
        if data.len() < header_len + body_len {
            return Seek::NeedMoreData;
        }

        let header = match PageHeader::read(&mut LeSliceReader::from_slice(&data[..FIXED_HEADER_LEN])) {
            Ok(header) => header,
            Err(e) => {
                debug!("Unreadable page header: {e}");
                return self.skip_to_capture();
            }
        };

        let body = &data[header_len..header_len + body_len];
        let calculated = self.crc.page_checksum(&data[..header_len], body);
        if calculated != header.checksum {
            let err = SyncError::ChecksumMismatch {
                calculated,
                read: header.checksum,
            };
            let _ = self.skip_to_capture();
            return Seek::Skipped(err);
        }

        let page = Page {
            header,
            lacing: lacing.to_vec(),
            body: Arc::from(body),
        };
        self.buffer.consume(header_len + body_len);

        Seek::Page(page)
    }

    /// Discards bytes up to the next possible capture pattern, always at
    /// least one.
    fn skip_to_capture(&mut self) -> Seek {
        let data = self.buffer.unscanned();
        if data.is_empty() {
            return Seek::NeedMoreData;
        }

        let skip = data[1..]
            .iter()
            .position(|&b| b == CAPTURE_PATTERN[0])
            .map_or(data.len(), |i| i + 1);
        self.buffer.consume(skip);

        Seek::Skipped(SyncError::LostCapture(skip))
    }

    /// Drops buffered bytes and sync state for a new clip.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.unsynced = false;
        self.bytes_committed = 0;
        self.pages_found = 0;
        self.holes = 0;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.unscanned().len()
    }

    pub fn bytes_committed(&self) -> u64 {
        self.bytes_committed
    }

    pub fn pages_found(&self) -> u64 {
        self.pages_found
    }

    pub fn holes(&self) -> u64 {
        self.holes
    }
}

enum Seek {
    Page(Page),
    NeedMoreData,
    Skipped(SyncError),
}
