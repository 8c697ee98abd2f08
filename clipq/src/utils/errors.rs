use std::io;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level() {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Capture pattern not found, skipped {0} bytes")]
    LostCapture(usize),

    #[error("Page checksum mismatch. Calculated {calculated:#010X}, Read {read:#010X}")]
    ChecksumMismatch { calculated: u32, read: u32 },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error("Page sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u32, found: u32 },

    #[error("Unsupported stream structure version {0}")]
    UnsupportedVersion(u8),

    #[error("Packet left unterminated before page {0}")]
    UnterminatedPacket(u32),
}

/// A break in synchronization continuity.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Hole {
    #[error("hole in page data: {0}")]
    Sync(#[from] SyncError),

    #[error("hole in packet data: {0}")]
    Demux(#[from] DemuxError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Header packet {index} is not {codec} data")]
    NotCodecData { index: usize, codec: &'static str },

    #[error("Malformed header packet {index}: {reason}")]
    MalformedHeader { index: usize, reason: String },

    #[error("Unsupported stream parameters: {0}")]
    Unsupported(String),

    #[error("Unexpected header packet {0}, only three are expected")]
    TooManyHeaders(usize),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Corrupt audio packet {packetno}: {reason}")]
    CorruptPacket { packetno: u64, reason: String },

    #[error("Audio packet received before header initialization")]
    NotInitialized,
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Audio output format is not supported: {0}")]
    UnsupportedFormat(String),

    #[error("Audio output line is unavailable: {0}")]
    Unavailable(String),

    #[error("Audio output line is not open")]
    NotOpen,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors that end the clip in flight. None of them stop the player.
#[derive(thiserror::Error, Debug)]
pub enum ClipError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Hole in the data while waiting for header packet {index}: {hole}")]
    HeaderHole { index: usize, hole: Hole },

    #[error("Not enough data was supplied: input ended {0}")]
    InsufficientData(&'static str),

    #[error("Header data exceeds {0} bytes")]
    HeaderTooLarge(usize),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Could not read from the byte source: {0}")]
    SourceIo(#[from] io::Error),

    #[error(transparent)]
    Hole(#[from] Hole),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Codec panicked while decoding")]
    CodecPanicked,
}

#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Player worker is already running")]
    AlreadyStarted,

    #[error("Player has been shut down")]
    ShutDown,

    #[error("Player worker panicked")]
    WorkerPanicked,

    #[error("Could not spawn the player worker: {0}")]
    Spawn(#[source] io::Error),
}
