use crate::codec::Codec;

/// Format information of a logical stream, known once the identification
/// header has been read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: usize,
    pub sample_rate: u32,
    pub vendor: Option<String>,
    pub comments: Vec<String>,
}

/// Per-clip decode state: format info plus the codec instance that read the
/// three header packets.
///
/// Built fresh by the header initializer for every clip and dropped when the
/// clip finishes, so no codec state survives from one clip to the next.
pub struct StreamContext {
    pub serial: u32,
    pub info: StreamInfo,
    pub codec: Box<dyn Codec>,
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("serial", &self.serial)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// One block of decoded audio, planar float samples in nominal `[-1.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmFrame {
    pub planes: Vec<Vec<f32>>,
}

impl PcmFrame {
    pub fn new(planes: Vec<Vec<f32>>) -> Self {
        Self { planes }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Sample frames in the block. Planes shorter than the first are padded
    /// with silence by the converter.
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

/// What the codec made of a packet handed to `decode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Audio data; frames may now be pulled.
    Audio,
    /// Not audio data for this codec; nothing to pull.
    Skipped,
}
