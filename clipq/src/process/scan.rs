use std::io::Read;

use log::{Level, trace};

use crate::codec::Codec;
use crate::log_or_err;
use crate::process::demux::{Accept, StreamDemuxer};
use crate::process::header::initialize_header;
use crate::process::sync::PageSynchronizer;
use crate::process::{ClipConfig, Pull, Ungated};
use crate::structs::stream::StreamInfo;
use crate::utils::errors::ClipError;

/// Layout of a clip, gathered without decoding any audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamScan {
    pub serial: u32,
    pub info: StreamInfo,
    pub bytes: u64,
    pub pages: u64,
    pub foreign_pages: u64,
    pub packets: u64,
    pub holes: u64,
    pub last_granule: Option<i64>,
    pub eos: bool,
}

impl StreamScan {
    /// Playing time derived from the last granule position, in seconds.
    pub fn duration_secs(&self) -> Option<f64> {
        match self.last_granule {
            Some(granule) if granule > 0 && self.info.sample_rate > 0 => {
                Some(granule as f64 / self.info.sample_rate as f64)
            }
            _ => None,
        }
    }
}

/// Reads the headers of a clip with `codec` and walks the rest of its pages.
///
/// Header failures are reported as in playback. After the headers, holes are
/// counted and handled per `config.fail_level`, and the end of input simply
/// ends the scan.
pub fn scan_stream<R: Read + ?Sized>(
    source: &mut R,
    codec: Box<dyn Codec>,
    config: &ClipConfig,
) -> Result<StreamScan, ClipError> {
    let mut sync = PageSynchronizer::with_capacity(config.read_chunk.saturating_mul(2));
    let mut demux = StreamDemuxer::default();

    let context = initialize_header(source, &mut sync, &mut demux, codec, &Ungated, config)?
        .ok_or(ClipError::InsufficientData("before the headers were read"))?;

    let mut holes = 0;
    let mut last_granule = None;

    loop {
        loop {
            match demux.next_packet() {
                Pull::Found(packet) => trace!("Packet {}: {} bytes", packet.packetno, packet.data.len()),
                Pull::Corrupt(hole) => {
                    holes += 1;
                    log_or_err!(config, Level::Warn, ClipError::from(hole));
                }
                Pull::NeedMoreData => break,
            }
        }

        match sync.next_page() {
            Pull::Found(page) => {
                if demux.accept_page(&page) == Accept::Accepted && page.granule_position() >= 0 {
                    last_granule = Some(page.granule_position());
                }
            }
            Pull::Corrupt(hole) => {
                holes += 1;
                log_or_err!(config, Level::Warn, ClipError::from(hole));
            }
            Pull::NeedMoreData => {
                if sync.read_from(source, config.read_chunk)? == 0 {
                    break;
                }
            }
        }
    }

    Ok(StreamScan {
        serial: context.serial,
        info: context.info,
        bytes: sync.bytes_committed(),
        pages: demux.pages_accepted(),
        foreign_pages: demux.pages_ignored(),
        packets: demux.packets_out(),
        holes,
        last_granule,
        eos: demux.eos_seen(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::fixtures::{ClipSpec, MockCodec};

    #[test]
    fn counts_pages_and_duration() -> anyhow::Result<()> {
        let bytes = ClipSpec::new(2, 8000).audio(&[200, 200]).bytes();
        let total = bytes.len() as u64;

        let scan = scan_stream(
            &mut Cursor::new(bytes),
            Box::new(MockCodec::default()),
            &ClipConfig::default(),
        )?;

        assert_eq!(scan.info.channels, 2);
        assert_eq!(scan.pages, 4);
        assert_eq!(scan.packets, 5);
        assert_eq!(scan.bytes, total);
        assert_eq!(scan.last_granule, Some(400));
        assert_eq!(scan.duration_secs(), Some(0.05));
        assert!(scan.eos);
        assert_eq!(scan.holes, 0);
        Ok(())
    }
}
