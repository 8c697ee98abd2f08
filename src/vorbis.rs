//! Vorbis codec for the clip player, backed by `symphonia`.
//!
//! The three header packets are parsed here to learn the stream format and
//! the comments; the identification and setup headers are then handed to
//! the `symphonia` Vorbis decoder, which decodes the audio packets.

use std::io;

use clipq::codec::Codec;
use clipq::structs::packet::Packet;
use clipq::structs::stream::{PacketKind, PcmFrame, StreamInfo};
use clipq::utils::bitstream_io::LeSliceReader;
use clipq::utils::errors::{DecodeError, FormatError};
use log::{debug, trace};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_VORBIS, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::Packet as EncodedPacket;

const CODEC_NAME: &str = "Vorbis";
const SIGNATURE: &[u8; 6] = b"vorbis";

const IDENTIFICATION_HEADER: u8 = 1;
const COMMENT_HEADER: u8 = 3;
const SETUP_HEADER: u8 = 5;

/// Fields of the identification header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    pub blocksize_0: u8,
    pub blocksize_1: u8,
}

impl Identification {
    pub fn read(data: &[u8]) -> Result<Self, FormatError> {
        let mut reader = common_header(data, IDENTIFICATION_HEADER, 1)?;
        let malformed = |e: io::Error| malformed(1, e);

        let version = reader.u32().map_err(malformed)?;
        if version != 0 {
            return Err(FormatError::Unsupported(format!("Vorbis version {version}")));
        }

        let channels = reader.u8().map_err(malformed)?;
        let sample_rate = reader.u32().map_err(malformed)?;
        let bitrate_maximum = reader.get_s::<i32>(32).map_err(malformed)?;
        let bitrate_nominal = reader.get_s::<i32>(32).map_err(malformed)?;
        let bitrate_minimum = reader.get_s::<i32>(32).map_err(malformed)?;
        let blocksize_0 = reader.get_n::<u8>(4).map_err(malformed)?;
        let blocksize_1 = reader.get_n::<u8>(4).map_err(malformed)?;
        let framing = reader.get().map_err(malformed)?;

        if channels == 0 || sample_rate == 0 {
            return Err(FormatError::MalformedHeader {
                index: 1,
                reason: format!("{channels} channels at {sample_rate} Hz"),
            });
        }
        if blocksize_0 > blocksize_1 || !(6..=13).contains(&blocksize_0) || blocksize_1 > 13 {
            return Err(FormatError::MalformedHeader {
                index: 1,
                reason: format!("block sizes 2^{blocksize_0} and 2^{blocksize_1}"),
            });
        }
        if !framing {
            return Err(FormatError::MalformedHeader {
                index: 1,
                reason: "framing bit not set".to_string(),
            });
        }

        Ok(Self {
            channels,
            sample_rate,
            bitrate_maximum,
            bitrate_nominal,
            bitrate_minimum,
            blocksize_0,
            blocksize_1,
        })
    }
}

/// Vendor string and user comments of the comment header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comments {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl Comments {
    pub fn read(data: &[u8]) -> Result<Self, FormatError> {
        let mut reader = common_header(data, COMMENT_HEADER, 2)?;
        let malformed = |e: io::Error| malformed(2, e);

        let vendor = reader.string().map_err(malformed)?;
        let count = reader.u32().map_err(malformed)?;
        let comments = (0..count)
            .map(|_| reader.string())
            .collect::<io::Result<Vec<_>>>()
            .map_err(malformed)?;

        Ok(Self { vendor, comments })
    }
}

fn common_header(data: &[u8], packet_type: u8, index: usize) -> Result<LeSliceReader<'_>, FormatError> {
    if data.len() < 7 || data[0] != packet_type || &data[1..7] != SIGNATURE {
        return Err(FormatError::NotCodecData {
            index,
            codec: CODEC_NAME,
        });
    }
    Ok(LeSliceReader::from_slice(&data[7..]))
}

fn malformed(index: usize, e: io::Error) -> FormatError {
    FormatError::MalformedHeader {
        index,
        reason: e.to_string(),
    }
}

/// One decoder per clip. See [`Codec`].
#[derive(Default)]
pub struct VorbisCodec {
    headers: usize,
    identification: Vec<u8>,
    info: Option<StreamInfo>,
    decoder: Option<Box<dyn Decoder>>,
    pending: Vec<Vec<f32>>,
    pending_offset: usize,
}

impl VorbisCodec {
    pub fn boxed() -> Box<dyn Codec> {
        Box::new(Self::default())
    }

    fn make_decoder(&self, setup: &[u8]) -> Result<Box<dyn Decoder>, FormatError> {
        let info = self.info.as_ref().ok_or(FormatError::NotCodecData {
            index: 1,
            codec: CODEC_NAME,
        })?;

        let mut extra_data = self.identification.clone();
        extra_data.extend_from_slice(setup);

        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_VORBIS)
            .with_sample_rate(info.sample_rate)
            .with_extra_data(extra_data.into_boxed_slice());

        symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| FormatError::MalformedHeader {
                index: 3,
                reason: e.to_string(),
            })
    }

    fn pending_frames(&self) -> usize {
        self.pending
            .first()
            .map_or(0, |plane| plane.len().saturating_sub(self.pending_offset))
    }
}

impl Codec for VorbisCodec {
    fn header_in(&mut self, packet: &Packet) -> Result<(), FormatError> {
        let index = self.headers + 1;
        match index {
            1 => {
                let ident = Identification::read(&packet.data)?;
                debug!(
                    "Vorbis: {} channels, {} Hz, nominal bitrate {}",
                    ident.channels, ident.sample_rate, ident.bitrate_nominal
                );
                self.identification = packet.data.clone();
                self.info = Some(StreamInfo {
                    channels: ident.channels as usize,
                    sample_rate: ident.sample_rate,
                    vendor: None,
                    comments: Vec::new(),
                });
            }
            2 => {
                let comments = Comments::read(&packet.data)?;
                if let Some(info) = &mut self.info {
                    info.vendor = Some(comments.vendor);
                    info.comments = comments.comments;
                }
            }
            3 => {
                common_header(&packet.data, SETUP_HEADER, 3)?;
                self.decoder = Some(self.make_decoder(&packet.data)?);
            }
            _ => return Err(FormatError::TooManyHeaders(index)),
        }

        self.headers = index;
        Ok(())
    }

    fn info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    fn decode(&mut self, packet: &Packet) -> Result<PacketKind, DecodeError> {
        let decoder = self.decoder.as_mut().ok_or(DecodeError::NotInitialized)?;

        if packet.data.first().is_some_and(|b| b & 1 == 1) {
            trace!("Packet {} is not an audio packet", packet.packetno);
            return Ok(PacketKind::Skipped);
        }

        let encoded = EncodedPacket::new_from_slice(0, packet.packetno, 0, &packet.data);
        let decoded = decoder.decode(&encoded).map_err(|e| DecodeError::CorruptPacket {
            packetno: packet.packetno,
            reason: e.to_string(),
        })?;

        let AudioBufferRef::F32(buffer) = decoded else {
            return Err(DecodeError::CorruptPacket {
                packetno: packet.packetno,
                reason: "unexpected sample format".to_string(),
            });
        };

        let channels = buffer.spec().channels.count();
        self.pending = (0..channels).map(|ch| buffer.chan(ch).to_vec()).collect();
        self.pending_offset = 0;

        Ok(PacketKind::Audio)
    }

    fn pull_frame(&mut self, max_frames: usize) -> Option<PcmFrame> {
        let frames = self.pending_frames().min(max_frames);
        if frames == 0 {
            return None;
        }

        let start = self.pending_offset;
        let planes = self
            .pending
            .iter()
            .map(|plane| plane[start..start + frames].to_vec())
            .collect();
        self.pending_offset += frames;

        Some(PcmFrame::new(planes))
    }
}
