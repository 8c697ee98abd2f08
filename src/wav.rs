use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use clipq::sink::PcmFormat;
use clipqd_macros::ToBytes;

use crate::byteorder::WriteBytesLe;

pub const RIFF_ID: [u8; 4] = *b"RIFF";
pub const WAVE_ID: [u8; 4] = *b"WAVE";
pub const FMT_ID: [u8; 4] = *b"fmt ";
pub const DATA_ID: [u8; 4] = *b"data";

const WAVE_FORMAT_PCM: u16 = 1;
const HEADER_LEN: u64 = 44;

#[derive(Debug, ToBytes)]
struct FmtChunk {
    id: [u8; 4],
    size: u32,
    format_tag: u16,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn pcm(format: &PcmFormat) -> Self {
        Self {
            id: FMT_ID,
            size: 16,
            format_tag: WAVE_FORMAT_PCM,
            channels: format.channels,
            sample_rate: format.sample_rate,
            byte_rate: format.byte_rate() as u32,
            block_align: format.block_align() as u16,
            bits_per_sample: format.bits_per_sample,
        }
    }
}

/// RIFF/WAVE writer for 16-bit PCM.
///
/// Chunk sizes are placeholders until [`finish`](Self::finish) patches them,
/// which may be called repeatedly as data keeps arriving.
pub struct WavWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    format: PcmFormat,
    data_written: u64,
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(writer: W, format: PcmFormat) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format,
            data_written: 0,
        }
    }

    pub fn format(&self) -> &PcmFormat {
        &self.format
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        let mut header = crate::join_bytes_le!(RIFF_ID, 0u32, WAVE_ID);
        FmtChunk::pcm(&self.format).write_le(&mut header);
        DATA_ID.write_le(&mut header);
        0u32.write_le(&mut header);

        debug_assert_eq!(header.len() as u64, HEADER_LEN);
        self.writer.write_all(&header)
    }

    /// Appends interleaved little-endian samples.
    pub fn write_pcm(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes and updates the RIFF and data chunk sizes.
    pub fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()?;

        let data_size = u32::try_from(self.data_written).unwrap_or(u32::MAX);
        let riff_size = u32::try_from(self.data_written + HEADER_LEN - 8).unwrap_or(u32::MAX);
        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(HEADER_LEN - 4))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout() -> io::Result<()> {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), PcmFormat::s16le(44100, 2));
        writer.write_header()?;
        let buffer = writer.into_inner()?.into_inner();

        assert_eq!(buffer.len(), 44);
        assert_eq!(&buffer[0..4], b"RIFF");
        assert_eq!(&buffer[8..12], b"WAVE");
        assert_eq!(&buffer[12..16], b"fmt ");
        assert_eq!(u16::from_le_bytes([buffer[22], buffer[23]]), 2);
        assert_eq!(u32::from_le_bytes([buffer[24], buffer[25], buffer[26], buffer[27]]), 44100);
        assert_eq!(u32::from_le_bytes([buffer[28], buffer[29], buffer[30], buffer[31]]), 176400);
        assert_eq!(u16::from_le_bytes([buffer[32], buffer[33]]), 4);
        assert_eq!(u16::from_le_bytes([buffer[34], buffer[35]]), 16);
        assert_eq!(&buffer[36..40], b"data");
        Ok(())
    }

    #[test]
    fn finish_patches_sizes() -> io::Result<()> {
        let mut writer = WavWriter::new(Cursor::new(Vec::new()), PcmFormat::s16le(8000, 1));
        writer.write_header()?;
        writer.write_pcm(&[1, 0, 2, 0])?;
        writer.finish()?;
        writer.write_pcm(&[3, 0])?;
        writer.finish()?;

        assert_eq!(writer.data_written(), 6);
        let buffer = writer.into_inner()?.into_inner();
        assert_eq!(buffer.len(), 50);
        assert_eq!(u32::from_le_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]), 42);
        assert_eq!(u32::from_le_bytes([buffer[40], buffer[41], buffer[42], buffer[43]]), 6);
        assert_eq!(&buffer[44..], &[1, 0, 2, 0, 3, 0]);
        Ok(())
    }
}
