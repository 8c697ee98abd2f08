//! Little-endian field reading for page headers and codec headers.
//!
//! Every multi-byte field in a page header (and in the Vorbis header
//! packets) is little-endian and byte aligned, so a thin wrapper around a
//! `bitstream_io` little-endian reader is enough.

use std::io;

use bitstream_io::{BitRead, BitReader, LittleEndian, SignedInteger, UnsignedInteger};

#[derive(Debug)]
pub struct LeFieldReader<R: io::Read + io::Seek> {
    bs: BitReader<R, LittleEndian>,
    len: u64,
}

pub type LeSliceReader<'a> = LeFieldReader<io::Cursor<&'a [u8]>>;

impl<R> LeFieldReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(self.out_of_bounds("get_n", n)),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn get_s<S: SignedInteger>(&mut self, n: u32) -> io::Result<S> {
        match self.bs.read_signed_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(self.out_of_bounds("get_s", n)),
            Err(e) => Err(e),
        }
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        self.get_n(8)
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        self.get_n(32)
    }

    pub fn i64(&mut self) -> io::Result<i64> {
        self.get_s(64)
    }

    /// Reads `count` raw bytes.
    pub fn bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        if count as u64 * 8 > self.available()? {
            return Err(self.out_of_bounds("bytes", (count as u32).saturating_mul(8)));
        }
        let mut buf = vec![0u8; count];
        self.bs.read_bytes(&mut buf)?;
        Ok(buf)
    }

    /// Reads a 32-bit length followed by that many bytes of UTF-8 text.
    pub fn string(&mut self) -> io::Result<String> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    pub fn available(&mut self) -> io::Result<u64> {
        Ok(self.len.saturating_sub(self.position()?))
    }

    fn out_of_bounds(&mut self, op: &str, n: u32) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{op}({n}): out of bounds bits at {}",
                self.bs.position_in_bits().unwrap_or(0)
            ),
        )
    }
}

impl<'a> LeSliceReader<'a> {
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(io::Cursor::new(data), data.len() as u64)
    }
}

#[test]
fn reads_little_endian_fields() -> io::Result<()> {
    let data = [
        0x4F, 0x67, 0x67, 0x53, 0x00, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x78,
        0x56, 0x34, 0x12,
    ];
    let mut reader = LeSliceReader::from_slice(&data);

    assert_eq!(reader.bytes(4)?, b"OggS");
    assert_eq!(reader.u8()?, 0);
    assert!(!reader.get()?);
    assert!(reader.get()?);
    let _ = reader.get_n::<u8>(6)?;
    assert_eq!(reader.i64()?, -1);
    assert_eq!(reader.u32()?, 0x1234_5678);
    assert!(reader.u8().is_err());
    Ok(())
}
