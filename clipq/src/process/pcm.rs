use crate::structs::stream::PcmFrame;

/// Scale from nominal float samples to 16-bit integers.
pub const PCM_SCALE: f32 = 32767.0;

/// Scales, truncates toward zero and clamps one sample.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    let value = (sample * PCM_SCALE) as i32;
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Interleaves planar float frames into signed 16-bit little-endian PCM.
///
/// The output buffer is owned by the converter and reused between calls.
#[derive(Debug, Default)]
pub struct PcmConverter {
    buffer: Vec<u8>,
}

impl PcmConverter {
    /// Pre-sizes the buffer for blocks of `frames` sample frames.
    pub fn with_block(channels: usize, frames: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(2 * channels * frames),
        }
    }

    /// Converts `frame` to `channels` interleaved channels.
    ///
    /// Channels missing from `frame` are written as silence and surplus
    /// planes are dropped.
    pub fn convert(&mut self, frame: &PcmFrame, channels: usize) -> &[u8] {
        let frames = frame.frames();
        self.buffer.clear();
        self.buffer.resize(2 * channels * frames, 0);

        for (ch, plane) in frame.planes.iter().take(channels).enumerate() {
            for (i, &sample) in plane.iter().take(frames).enumerate() {
                let offset = (i * channels + ch) * 2;
                self.buffer[offset..offset + 2].copy_from_slice(&sample_to_i16(sample).to_le_bytes());
            }
        }

        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_truncates_and_clamps() {
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(1.5), 32767);
        assert_eq!(sample_to_i16(-1.0), -32767);
        assert_eq!(sample_to_i16(-1.5), -32768);
        assert_eq!(sample_to_i16(0.5), 16383);
        assert_eq!(sample_to_i16(-0.5), -16383);
    }

    #[test]
    fn interleaves_little_endian() {
        let frame = PcmFrame::new(vec![vec![1.5, 0.0], vec![-1.5, 0.5]]);
        let mut converter = PcmConverter::default();

        let out = converter.convert(&frame, 2);
        let samples = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect::<Vec<_>>();

        assert_eq!(samples, [32767, -32768, 0, 16383]);
    }

    #[test]
    fn missing_planes_are_silent() {
        let frame = PcmFrame::new(vec![vec![1.0; 3]]);
        let mut converter = PcmConverter::with_block(2, 3);

        let out = converter.convert(&frame, 2);
        assert_eq!(out.len(), 12);
        assert_eq!(&out[..4], &[0xFF, 0x7F, 0, 0]);
    }
}
