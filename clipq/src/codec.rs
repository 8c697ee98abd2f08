//! The codec capability consumed by the pipeline.
//!
//! The pipeline never looks inside packet payloads. It hands the first three
//! packets of a stream to [`Codec::header_in`] and every later packet to
//! [`Codec::decode`], then drains decoded blocks with [`Codec::pull_frame`].

use std::sync::Arc;

use crate::structs::packet::Packet;
use crate::structs::stream::{PacketKind, PcmFrame, StreamInfo};
use crate::utils::errors::{DecodeError, FormatError};

/// Number of header packets every stream starts with.
pub const HEADER_PACKETS: usize = 3;

pub trait Codec: Send {
    /// Ingests the next header packet, in stream order.
    fn header_in(&mut self, packet: &Packet) -> Result<(), FormatError>;

    /// Stream format, available once the identification header was accepted.
    fn info(&self) -> Option<&StreamInfo>;

    /// Decodes one data packet.
    fn decode(&mut self, packet: &Packet) -> Result<PacketKind, DecodeError>;

    /// Returns up to `max_frames` sample frames of pending output, or `None`
    /// once everything decoded so far has been pulled.
    fn pull_frame(&mut self, max_frames: usize) -> Option<PcmFrame>;
}

/// Builds one codec instance per clip.
pub trait CodecFactory: Send + Sync {
    fn create(&self) -> Box<dyn Codec>;
}

impl<F> CodecFactory for F
where
    F: Fn() -> Box<dyn Codec> + Send + Sync,
{
    fn create(&self) -> Box<dyn Codec> {
        self()
    }
}

pub type SharedCodecFactory = Arc<dyn CodecFactory>;
