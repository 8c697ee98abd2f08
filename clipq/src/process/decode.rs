use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};

use log::{Level, debug, error, trace};

use crate::codec::Codec;
use crate::log_or_err;
use crate::process::demux::{Accept, StreamDemuxer};
use crate::process::header::initialize_header;
use crate::process::pcm::PcmConverter;
use crate::process::sync::PageSynchronizer;
use crate::process::{ClipConfig, Flow, PlaybackGate, Pull};
use crate::sink::{AudioSink, PcmFormat};
use crate::structs::packet::Packet;
use crate::structs::stream::{PacketKind, StreamContext};
use crate::utils::errors::ClipError;

/// Why a clip stopped producing audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// The end-of-stream page was reached and drained.
    EndOfStream,
    /// A page reported granule position zero, so no audio follows.
    GranuleZero,
    /// The clip was aborted at a checkpoint.
    Aborted,
}

#[derive(Debug)]
enum DecodeState {
    AwaitingPage,
    AwaitingPacket,
    Decoding(Packet),
    Finished(Finish),
}

/// Counters collected while playing one clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSummary {
    pub finish: Finish,
    pub frames: u64,
    pub bytes_written: u64,
    pub pages: u64,
    pub packets: u64,
    pub holes: u64,
    pub channels: usize,
    pub sample_rate: u32,
}

impl ClipSummary {
    /// Summary of a clip aborted before its headers were read.
    pub fn aborted() -> Self {
        Self {
            finish: Finish::Aborted,
            frames: 0,
            bytes_written: 0,
            pages: 0,
            packets: 0,
            holes: 0,
            channels: 0,
            sample_rate: 0,
        }
    }
}

/// Drives pages through the demultiplexer and packets through the codec
/// until the stream ends, writing converted PCM to the sink.
pub struct DecodeLoop<'a, R: Read + ?Sized> {
    source: &'a mut R,
    sync: &'a mut PageSynchronizer,
    demux: &'a mut StreamDemuxer,
    context: &'a mut StreamContext,
    sink: &'a mut dyn AudioSink,
    gate: &'a dyn PlaybackGate,
    config: &'a ClipConfig,
    converter: PcmConverter,
    frames: u64,
    bytes_written: u64,
    holes: u64,
}

impl<'a, R: Read + ?Sized> DecodeLoop<'a, R> {
    pub fn new(
        source: &'a mut R,
        sync: &'a mut PageSynchronizer,
        demux: &'a mut StreamDemuxer,
        context: &'a mut StreamContext,
        sink: &'a mut dyn AudioSink,
        gate: &'a dyn PlaybackGate,
        config: &'a ClipConfig,
    ) -> Self {
        let converter = PcmConverter::with_block(context.info.channels, config.pcm_chunk_frames);
        Self {
            source,
            sync,
            demux,
            context,
            sink,
            gate,
            config,
            converter,
            frames: 0,
            bytes_written: 0,
            holes: 0,
        }
    }

    /// Runs until the clip finishes or fails.
    ///
    /// Packets left over from header acquisition are drained first.
    pub fn run(mut self) -> Result<ClipSummary, ClipError> {
        let mut state = DecodeState::AwaitingPacket;

        let finish = loop {
            state = match state {
                DecodeState::Finished(finish) => break finish,
                state => match self.gate.checkpoint() {
                    Flow::Abort => DecodeState::Finished(Finish::Aborted),
                    Flow::Continue => self.step(state)?,
                },
            };
        };

        debug!(
            "Clip finished ({finish:?}): {} frames, {} bytes",
            self.frames, self.bytes_written
        );

        Ok(ClipSummary {
            finish,
            frames: self.frames,
            bytes_written: self.bytes_written,
            pages: self.demux.pages_accepted(),
            packets: self.demux.packets_out(),
            holes: self.holes,
            channels: self.context.info.channels,
            sample_rate: self.context.info.sample_rate,
        })
    }

    fn step(&mut self, state: DecodeState) -> Result<DecodeState, ClipError> {
        match state {
            DecodeState::AwaitingPage => self.awaiting_page(),
            DecodeState::AwaitingPacket => self.awaiting_packet(),
            DecodeState::Decoding(packet) => self.decoding(packet),
            DecodeState::Finished(finish) => Ok(DecodeState::Finished(finish)),
        }
    }

    fn awaiting_page(&mut self) -> Result<DecodeState, ClipError> {
        match self.sync.next_page() {
            Pull::Found(page) => match self.demux.accept_page(&page) {
                Accept::Ignored => Ok(DecodeState::AwaitingPage),
                Accept::Rejected => Ok(DecodeState::AwaitingPacket),
                Accept::Accepted if page.granule_position() == 0 => {
                    debug!("Page {} has granule position zero", page.sequence());
                    Ok(DecodeState::Finished(Finish::GranuleZero))
                }
                Accept::Accepted => Ok(DecodeState::AwaitingPacket),
            },
            Pull::Corrupt(hole) => {
                self.holes += 1;
                log_or_err!(self.config, Level::Warn, ClipError::from(hole));
                Ok(DecodeState::AwaitingPage)
            }
            Pull::NeedMoreData => {
                if self.sync.read_from(self.source, self.config.read_chunk)? == 0 {
                    return Err(ClipError::InsufficientData("before the end-of-stream page"));
                }
                Ok(DecodeState::AwaitingPage)
            }
        }
    }

    fn awaiting_packet(&mut self) -> Result<DecodeState, ClipError> {
        loop {
            match self.demux.next_packet() {
                Pull::Found(packet) => return Ok(DecodeState::Decoding(packet)),
                Pull::Corrupt(hole) => {
                    self.holes += 1;
                    log_or_err!(self.config, Level::Warn, ClipError::from(hole));
                }
                Pull::NeedMoreData if self.demux.eos_seen() => {
                    return Ok(DecodeState::Finished(Finish::EndOfStream));
                }
                Pull::NeedMoreData => return Ok(DecodeState::AwaitingPage),
            }
        }
    }

    fn decoding(&mut self, packet: Packet) -> Result<DecodeState, ClipError> {
        match self.context.codec.decode(&packet) {
            Ok(PacketKind::Audio) => self.drain_codec()?,
            Ok(PacketKind::Skipped) => trace!("Packet {} carries no audio", packet.packetno),
            Err(err) => log_or_err!(self.config, Level::Warn, ClipError::from(err)),
        }

        Ok(DecodeState::AwaitingPacket)
    }

    fn drain_codec(&mut self) -> Result<(), ClipError> {
        let channels = self.context.info.channels;

        while let Some(frame) = self.context.codec.pull_frame(self.config.pcm_chunk_frames) {
            if frame.is_empty() {
                break;
            }

            let bytes = self.converter.convert(&frame, channels);
            self.sink.write(bytes)?;
            self.frames += frame.frames() as u64;
            self.bytes_written += bytes.len() as u64;
        }

        Ok(())
    }
}

/// Plays one clip from `source` into `sink`.
///
/// Reads the headers with a fresh `codec`, opens and starts the sink in the
/// stream's format, then runs the [`DecodeLoop`]. The sink is stopped and
/// closed once it was opened, whether the clip completed, was aborted or
/// failed. A panic inside the decode loop becomes
/// [`ClipError::CodecPanicked`]. The first error wins.
pub fn play_clip<R: Read + ?Sized>(
    source: &mut R,
    codec: Box<dyn Codec>,
    sink: &mut dyn AudioSink,
    gate: &dyn PlaybackGate,
    config: &ClipConfig,
) -> Result<ClipSummary, ClipError> {
    let mut sync = PageSynchronizer::with_capacity(config.read_chunk.saturating_mul(2));
    let mut demux = StreamDemuxer::default();

    let Some(mut context) = initialize_header(source, &mut sync, &mut demux, codec, gate, config)? else {
        return Ok(ClipSummary::aborted());
    };

    let format = PcmFormat::s16le(context.info.sample_rate, context.info.channels as u16);
    debug!("Opening audio output as {format}");
    sink.open(&format)?;

    let result = match sink.start() {
        Ok(()) => catch_unwind(AssertUnwindSafe(|| {
            DecodeLoop::new(source, &mut sync, &mut demux, &mut context, sink, gate, config).run()
        }))
        .unwrap_or_else(|_| {
            error!("Decode loop panicked, closing the audio output");
            Err(ClipError::CodecPanicked)
        }),
        Err(err) => Err(err.into()),
    };

    let closed = sink.stop().and_then(|()| sink.close());

    match (result, closed) {
        (Err(err), _) => Err(err),
        (Ok(_), Err(err)) => Err(err.into()),
        (Ok(summary), Ok(())) => Ok(summary),
    }
}
