use std::fmt::Debug;

use crate::utils::errors::Hole;

/// Byte stream synchronization.
///
/// Provides the [`SyncBuffer`](sync::SyncBuffer) that collects raw input and
/// the [`PageSynchronizer`](sync::PageSynchronizer) that locates checksum-valid
/// pages inside it.
pub mod sync;

/// Packet reassembly for one logical stream.
///
/// Provides the [`StreamDemuxer`](demux::StreamDemuxer).
pub mod demux;

/// Header acquisition.
///
/// Provides [`initialize_header`](header::initialize_header), which feeds the
/// three header packets to a fresh codec and yields the per-clip
/// [`StreamContext`](crate::structs::stream::StreamContext).
pub mod header;

/// The per-clip decode loop and its driver [`play_clip`](decode::play_clip).
pub mod decode;

/// Float to 16-bit PCM conversion.
pub mod pcm;

/// Whole-stream scanning for diagnostics.
pub mod scan;

/// Result of pulling from the synchronizer or the demultiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull<T> {
    /// A complete item was produced.
    Found(T),
    /// More input must be committed before retrying.
    NeedMoreData,
    /// A hole was detected. Scanning continues on the next call.
    Corrupt(Hole),
}

/// Decision taken at a checkpoint of the decode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Abort,
}

/// Cooperative control of a running clip.
///
/// The header initializer and the decode loop call [`checkpoint`](Self::checkpoint)
/// before every state transition. An implementation may block there while
/// playback is paused.
pub trait PlaybackGate: Sync {
    fn checkpoint(&self) -> Flow;
}

/// A gate that never pauses or aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ungated;

impl PlaybackGate for Ungated {
    fn checkpoint(&self) -> Flow {
        Flow::Continue
    }
}

/// Tunables for decoding one clip.
#[derive(Debug, Clone)]
pub struct ClipConfig {
    /// Bytes requested from the byte source per read.
    pub(crate) read_chunk: usize,

    /// Upper bound on sample frames converted and written per sink write.
    pub(crate) pcm_chunk_frames: usize,

    /// Input bytes allowed before all three header packets must be complete.
    pub(crate) max_header_bytes: usize,

    /// Recoverable holes and packet decode errors logged at a level at or
    /// above this one end the clip instead.
    pub(crate) fail_level: log::Level,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            read_chunk: 4096,
            pcm_chunk_frames: 1024,
            max_header_bytes: 8 * 1024 * 1024,
            fail_level: log::Level::Error,
        }
    }
}

impl ClipConfig {
    pub fn read_chunk(&self) -> usize {
        self.read_chunk
    }

    pub fn pcm_chunk_frames(&self) -> usize {
        self.pcm_chunk_frames
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub fn fail_level(&self) -> log::Level {
        self.fail_level
    }

    pub fn set_read_chunk(&mut self, bytes: usize) {
        self.read_chunk = bytes.max(1);
    }

    pub fn set_pcm_chunk_frames(&mut self, frames: usize) {
        self.pcm_chunk_frames = frames.max(1);
    }

    pub fn set_max_header_bytes(&mut self, bytes: usize) {
        self.max_header_bytes = bytes;
    }

    /// Sets the failure level for recoverable errors.
    ///
    /// - `log::Level::Error`: holes are logged and skipped (default)
    /// - `log::Level::Warn`: holes end the clip (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_sizes_are_clamped() {
        let mut config = ClipConfig::default();
        config.set_read_chunk(0);
        config.set_pcm_chunk_frames(0);

        assert_eq!(config.read_chunk(), 1);
        assert_eq!(config.pcm_chunk_frames(), 1);
        assert_eq!(config.max_header_bytes(), 8 * 1024 * 1024);
        assert_eq!(config.fail_level(), log::Level::Error);
    }
}
