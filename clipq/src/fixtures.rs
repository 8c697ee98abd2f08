//! Builders and doubles shared by the unit tests.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::Codec;
use crate::process::Pull;
use crate::process::sync::PageSynchronizer;
use crate::sink::{AudioSink, PcmFormat};
use crate::structs::packet::Packet;
use crate::structs::page::{CAPTURE_PATTERN, Page, PageFlags};
use crate::structs::stream::{PacketKind, PcmFrame, StreamInfo};
use crate::utils::crc::Crc32;
use crate::utils::errors::{DecodeError, FormatError, SinkError};

/// Description of one page to serialize.
#[derive(Debug, Clone)]
pub struct PageSpec {
    serial: u32,
    sequence: u32,
    flags: u8,
    granule: i64,
    lacing: Vec<u8>,
    body: Vec<u8>,
}

impl PageSpec {
    pub fn new(serial: u32, sequence: u32) -> Self {
        Self {
            serial,
            sequence,
            flags: 0,
            granule: -1,
            lacing: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn bos(mut self) -> Self {
        self.flags |= PageFlags::BEGIN_OF_STREAM;
        self
    }

    pub fn eos(mut self) -> Self {
        self.flags |= PageFlags::END_OF_STREAM;
        self
    }

    pub fn continued(mut self) -> Self {
        self.flags |= PageFlags::CONTINUED;
        self
    }

    pub fn granule(mut self, granule: i64) -> Self {
        self.granule = granule;
        self
    }

    /// Appends a complete packet, terminated by a lacing value below 255.
    pub fn packet(mut self, data: &[u8]) -> Self {
        self.lacing.extend(std::iter::repeat_n(255, data.len() / 255));
        self.lacing.push((data.len() % 255) as u8);
        self.body.extend_from_slice(data);
        self
    }

    /// Appends segments with explicit lacing values.
    pub fn raw(mut self, body: &[u8], lacing: &[u8]) -> Self {
        self.lacing.extend_from_slice(lacing);
        self.body.extend_from_slice(body);
        self
    }
}

/// Serializes a page with a valid checksum.
pub fn page_bytes(spec: &PageSpec) -> Vec<u8> {
    let mut header = Vec::with_capacity(27 + spec.lacing.len());
    header.extend_from_slice(CAPTURE_PATTERN);
    header.push(0);
    header.push(spec.flags);
    header.extend_from_slice(&spec.granule.to_le_bytes());
    header.extend_from_slice(&spec.serial.to_le_bytes());
    header.extend_from_slice(&spec.sequence.to_le_bytes());
    header.extend_from_slice(&[0; 4]);
    header.push(spec.lacing.len() as u8);
    header.extend_from_slice(&spec.lacing);

    let checksum = Crc32::default().page_checksum(&header, &spec.body);
    header[22..26].copy_from_slice(&checksum.to_le_bytes());
    header.extend_from_slice(&spec.body);
    header
}

/// Parses a serialized page back through the synchronizer.
pub fn page(spec: &PageSpec) -> Page {
    let mut sync = PageSynchronizer::default();
    sync.push_bytes(&page_bytes(spec));
    match sync.next_page() {
        Pull::Found(page) => page,
        other => panic!("fixture page did not parse: {other:?}"),
    }
}

/// Header packet `index` (1 to 3) understood by [`MockCodec`].
pub fn mock_header(index: u8, channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut data = vec![index * 2 - 1];
    data.extend_from_slice(b"mock");
    if index == 1 {
        data.push(channels);
        data.extend_from_slice(&sample_rate.to_le_bytes());
    }
    data
}

/// A complete single-stream clip for [`MockCodec`].
///
/// Pages 0 and 1 carry the headers, then every audio packet gets a page of
/// its own. Audio packets are `[0, frames]`.
#[derive(Debug, Clone)]
pub struct ClipSpec {
    channels: u8,
    sample_rate: u32,
    audio: Vec<u8>,
    granules: Option<Vec<i64>>,
    eos: bool,
    corrupt: Option<u32>,
}

impl ClipSpec {
    pub const SERIAL: u32 = 0x1234_5678;

    pub fn new(channels: u8, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            audio: Vec::new(),
            granules: None,
            eos: true,
            corrupt: None,
        }
    }

    /// Frames per audio packet.
    pub fn audio(mut self, frames: &[u8]) -> Self {
        self.audio = frames.to_vec();
        self
    }

    /// Overrides the granule positions of the audio pages.
    pub fn granules(mut self, granules: &[i64]) -> Self {
        self.granules = Some(granules.to_vec());
        self
    }

    pub fn without_eos(mut self) -> Self {
        self.eos = false;
        self
    }

    /// Damages the body of the page with this sequence number.
    pub fn corrupt_page(mut self, sequence: u32) -> Self {
        self.corrupt = Some(sequence);
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut pages = vec![
            PageSpec::new(Self::SERIAL, 0)
                .bos()
                .granule(0)
                .packet(&mock_header(1, self.channels, self.sample_rate)),
            PageSpec::new(Self::SERIAL, 1)
                .granule(0)
                .packet(&mock_header(2, 0, 0))
                .packet(&mock_header(3, 0, 0)),
        ];

        let mut granule = 0i64;
        for (i, &frames) in self.audio.iter().enumerate() {
            granule += frames as i64;
            let granule = match &self.granules {
                Some(granules) => granules[i],
                None => granule,
            };
            let mut spec = PageSpec::new(Self::SERIAL, i as u32 + 2)
                .granule(granule)
                .packet(&[0, frames]);
            if self.eos && i + 1 == self.audio.len() {
                spec = spec.eos();
            }
            pages.push(spec);
        }

        let mut out = Vec::new();
        for (sequence, spec) in pages.iter().enumerate() {
            let mut bytes = page_bytes(spec);
            if self.corrupt == Some(sequence as u32) {
                if let Some(last) = bytes.last_mut() {
                    *last ^= 0x5A;
                }
            }
            out.extend(bytes);
        }
        out
    }

    pub fn source(&self) -> Box<dyn Read + Send> {
        Box::new(Cursor::new(self.bytes()))
    }
}

/// Codec double: three `mock` headers, audio packets `[0, frames]` producing
/// constant samples of 0.5.
#[derive(Debug, Default)]
pub struct MockCodec {
    headers: usize,
    info: Option<StreamInfo>,
    pending: usize,
}

impl MockCodec {
    /// Frame count that makes an audio packet undecodable.
    pub const BROKEN: u8 = 0xEE;
    /// Frame count that makes `decode` panic.
    pub const PANIC: u8 = 0xDD;

    pub fn boxed() -> Box<dyn Codec> {
        Box::new(Self::default())
    }
}

impl Codec for MockCodec {
    fn header_in(&mut self, packet: &Packet) -> Result<(), FormatError> {
        let index = self.headers + 1;
        if index > 3 {
            return Err(FormatError::TooManyHeaders(index));
        }

        let data = &packet.data;
        if data.len() < 5 || data[0] as usize != index * 2 - 1 || &data[1..5] != b"mock" {
            return Err(FormatError::NotCodecData { index, codec: "mock" });
        }

        if index == 1 {
            if data.len() < 10 {
                return Err(FormatError::MalformedHeader {
                    index,
                    reason: "short identification header".to_string(),
                });
            }
            self.info = Some(StreamInfo {
                channels: data[5] as usize,
                sample_rate: u32::from_le_bytes([data[6], data[7], data[8], data[9]]),
                vendor: Some("mock".to_string()),
                comments: Vec::new(),
            });
        }

        self.headers = index;
        Ok(())
    }

    fn info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    fn decode(&mut self, packet: &Packet) -> Result<PacketKind, DecodeError> {
        if self.headers < 3 {
            return Err(DecodeError::NotInitialized);
        }
        match packet.data.as_slice() {
            [0, frames] if *frames == Self::BROKEN => Err(DecodeError::CorruptPacket {
                packetno: packet.packetno,
                reason: "broken".to_string(),
            }),
            [0, frames] if *frames == Self::PANIC => panic!("mock codec blew up"),
            [0, frames] => {
                self.pending += *frames as usize;
                Ok(PacketKind::Audio)
            }
            _ => Ok(PacketKind::Skipped),
        }
    }

    fn pull_frame(&mut self, max_frames: usize) -> Option<PcmFrame> {
        if self.pending == 0 {
            return None;
        }
        let frames = self.pending.min(max_frames);
        self.pending -= frames;
        let channels = self.info.as_ref().map_or(1, |info| info.channels);
        Some(PcmFrame::new(vec![vec![0.5; frames]; channels]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Open(PcmFormat),
    Start,
    Write(usize),
    Stop,
    Close,
}

/// A one-shot failure armed on a [`RecordingSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFault {
    Open,
    /// Fails the write after this many successful ones.
    Write(usize),
}

#[derive(Debug, Default)]
struct SinkLog {
    calls: Vec<SinkCall>,
    data: Vec<u8>,
    fault: Option<SinkFault>,
}

/// Sink double that records every call. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    write_delay: Duration,
}

impl RecordingSink {
    pub fn with_write_delay(delay: Duration) -> Self {
        Self {
            write_delay: delay,
            ..Self::default()
        }
    }

    /// Arms `fault`; it fires once, later clips see a working sink.
    pub fn fail_once(&self, fault: SinkFault) {
        self.log.lock().unwrap().fault = Some(fault);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn bytes(&self) -> usize {
        self.log.lock().unwrap().data.len()
    }

    pub fn writes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::Write(_)))
            .count()
    }

    /// Number of `Open` calls, i.e. clips that reached the decode loop.
    pub fn opens(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::Open(_)))
            .count()
    }

    fn record(&self, call: SinkCall) {
        self.log.lock().unwrap().calls.push(call);
    }
}

impl AudioSink for RecordingSink {
    fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(SinkCall::Open(*format));
        if log.fault == Some(SinkFault::Open) {
            log.fault = None;
            return Err(SinkError::Unavailable("line is busy".to_string()));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Start);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        let mut log = self.log.lock().unwrap();
        log.calls.push(SinkCall::Write(bytes.len()));
        match log.fault {
            Some(SinkFault::Write(0)) => {
                log.fault = None;
                return Err(SinkError::Io(io::Error::other("device unplugged")));
            }
            Some(SinkFault::Write(n)) => log.fault = Some(SinkFault::Write(n - 1)),
            _ => {}
        }
        log.data.extend_from_slice(bytes);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Stop);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Close);
        Ok(())
    }
}

/// Byte source that counts `read` calls and hands out at most `chunk`
/// bytes per call.
#[derive(Debug)]
pub struct CountingSource {
    inner: Cursor<Vec<u8>>,
    chunk: usize,
    reads: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(bytes: Vec<u8>, chunk: usize) -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = Self {
            inner: Cursor::new(bytes),
            chunk,
            reads: reads.clone(),
        };
        (source, reads)
    }
}

impl Read for CountingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let len = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..len])
    }
}

/// Byte source that serves `limit` bytes and then fails every read.
#[derive(Debug)]
pub struct FailingSource {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl FailingSource {
    pub fn new(bytes: Vec<u8>, limit: usize) -> Self {
        Self {
            inner: Cursor::new(bytes),
            limit: limit as u64,
        }
    }
}

impl Read for FailingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.limit.saturating_sub(self.inner.position());
        if left == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "stream dropped"));
        }
        let len = buf.len().min(left as usize);
        self.inner.read(&mut buf[..len])
    }
}

/// Collects events from a receiver until `count` of them arrived.
pub fn collect<T>(rx: &std::sync::mpsc::Receiver<T>, count: usize) -> VecDeque<T> {
    let mut out = VecDeque::new();
    while out.len() < count {
        match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(event) => out.push_back(event),
            Err(e) => panic!("expected {count} events, got {}: {e}", out.len()),
        }
    }
    out
}
