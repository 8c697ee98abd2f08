//! The audio output capability.

use crate::utils::errors::SinkError;

/// PCM layout written to a sink: signed little-endian, interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl PcmFormat {
    pub fn s16le(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 16,
            channels,
        }
    }

    /// Bytes per interleaved sample frame.
    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.block_align() as u64
    }
}

impl std::fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {}-bit, {} channel(s)",
            self.sample_rate, self.bits_per_sample, self.channels
        )
    }
}

/// An output line. `write` may block until the device accepts the bytes;
/// the worker treats that as flow control.
pub trait AudioSink: Send {
    fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError>;

    fn start(&mut self) -> Result<(), SinkError>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    fn stop(&mut self) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError>;
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError> {
        (**self).open(format)
    }

    fn start(&mut self) -> Result<(), SinkError> {
        (**self).start()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        (**self).write(bytes)
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        (**self).stop()
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}
