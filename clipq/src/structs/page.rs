//! Container pages.
//!
//! ## Layout
//!
//! A page is a 27-byte fixed header, a segment (lacing) table of up to 255
//! entries and a body whose length is the sum of the lacing values.
//!
//! | offset | field |
//! |-------:|-------|
//! | 0  | capture pattern `OggS` |
//! | 4  | stream structure version |
//! | 5  | header type flags |
//! | 6  | granule position |
//! | 14 | serial number |
//! | 18 | page sequence number |
//! | 22 | checksum |
//! | 26 | segment count |

use std::io;
use std::sync::Arc;

use crate::utils::bitstream_io::LeSliceReader;

/// Capture pattern at the start of every page.
pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Size of the fixed part of a page header.
pub const FIXED_HEADER_LEN: usize = 27;

/// Lacing value that continues a packet into the next segment.
pub const CONTINUE_LACING: u8 = 255;

/// Header type flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageFlags(pub u8);

impl PageFlags {
    pub const CONTINUED: u8 = 0x01;
    pub const BEGIN_OF_STREAM: u8 = 0x02;
    pub const END_OF_STREAM: u8 = 0x04;

    pub fn continued(self) -> bool {
        self.0 & Self::CONTINUED != 0
    }

    pub fn bos(self) -> bool {
        self.0 & Self::BEGIN_OF_STREAM != 0
    }

    pub fn eos(self) -> bool {
        self.0 & Self::END_OF_STREAM != 0
    }
}

/// Fixed header fields of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageHeader {
    pub version: u8,
    pub flags: PageFlags,
    pub granule_position: i64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    pub segment_count: usize,
}

impl PageHeader {
    /// Reads the fixed header. The caller has already checked the capture pattern.
    pub fn read(reader: &mut LeSliceReader) -> io::Result<Self> {
        let _capture = reader.bytes(4)?;

        Ok(Self {
            version: reader.u8()?,
            flags: PageFlags(reader.u8()?),
            granule_position: reader.i64()?,
            serial: reader.u32()?,
            sequence: reader.u32()?,
            checksum: reader.u32()?,
            segment_count: reader.u8()? as usize,
        })
    }
}

/// A validated page located by the synchronizer.
///
/// Immutable once produced. The body is shared so that handing a page to the
/// demultiplexer never copies payload bytes twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header: PageHeader,
    pub lacing: Vec<u8>,
    pub body: Arc<[u8]>,
}

impl Page {
    pub fn serial(&self) -> u32 {
        self.header.serial
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    pub fn granule_position(&self) -> i64 {
        self.header.granule_position
    }

    pub fn is_continued(&self) -> bool {
        self.header.flags.continued()
    }

    pub fn is_eos(&self) -> bool {
        self.header.flags.eos()
    }
}

#[test]
fn flag_bits() {
    let flags = PageFlags(PageFlags::CONTINUED | PageFlags::END_OF_STREAM);
    assert!(flags.continued());
    assert!(!flags.bos());
    assert!(flags.eos());
}
