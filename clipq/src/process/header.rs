use std::io::Read;

use log::{debug, trace};

use crate::codec::{Codec, HEADER_PACKETS};
use crate::process::demux::{Accept, StreamDemuxer};
use crate::process::sync::PageSynchronizer;
use crate::process::{ClipConfig, Flow, PlaybackGate, Pull};
use crate::structs::stream::StreamContext;
use crate::utils::errors::{ClipError, FormatError};

/// Reads the three header packets of a clip into `codec`.
///
/// Pages are pulled from `source` in `config.read_chunk` sized reads until
/// the codec has accepted all header packets. Any hole before that point is
/// fatal for the clip, as is running out of input or exceeding
/// `config.max_header_bytes`. Pages and packets that follow the headers stay
/// buffered in `sync` and `demux` for the decode loop.
///
/// Returns `Ok(None)` when `gate` aborts the clip.
pub fn initialize_header<R: Read + ?Sized>(
    source: &mut R,
    sync: &mut PageSynchronizer,
    demux: &mut StreamDemuxer,
    mut codec: Box<dyn Codec>,
    gate: &dyn PlaybackGate,
    config: &ClipConfig,
) -> Result<Option<StreamContext>, ClipError> {
    let mut received = 0;

    while received < HEADER_PACKETS {
        if gate.checkpoint() == Flow::Abort {
            debug!("Clip aborted after {received} header packets");
            return Ok(None);
        }

        match demux.next_packet() {
            Pull::Found(packet) => {
                trace!("Header packet {}: {} bytes", received + 1, packet.data.len());
                codec.header_in(&packet)?;
                received += 1;
                continue;
            }
            Pull::Corrupt(hole) => {
                return Err(ClipError::HeaderHole {
                    index: received + 1,
                    hole,
                });
            }
            Pull::NeedMoreData => {}
        }

        match sync.next_page() {
            Pull::Found(page) => {
                if demux.accept_page(&page) == Accept::Ignored {
                    trace!("Skipped page of another stream while reading headers");
                }
            }
            Pull::Corrupt(hole) => {
                return Err(ClipError::HeaderHole {
                    index: received + 1,
                    hole,
                });
            }
            Pull::NeedMoreData => {
                if sync.bytes_committed() >= config.max_header_bytes as u64 {
                    return Err(ClipError::HeaderTooLarge(config.max_header_bytes));
                }
                if sync.read_from(source, config.read_chunk)? == 0 {
                    return Err(ClipError::InsufficientData("before all header packets were read"));
                }
            }
        }
    }

    let info = codec.info().cloned().ok_or_else(|| FormatError::MalformedHeader {
        index: 1,
        reason: "codec reported no stream format".to_string(),
    })?;

    if info.channels == 0 || info.channels > u16::MAX as usize || info.sample_rate == 0 {
        return Err(FormatError::Unsupported(format!(
            "{} channels at {} Hz",
            info.channels, info.sample_rate
        ))
        .into());
    }

    debug!(
        "Stream {:#010X}: {} channels, {} Hz, vendor {:?}",
        demux.serial().unwrap_or_default(),
        info.channels,
        info.sample_rate,
        info.vendor
    );

    Ok(Some(StreamContext {
        serial: demux.serial().unwrap_or_default(),
        info,
        codec,
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::fixtures::{ClipSpec, MockCodec, PageSpec, mock_header, page_bytes};
    use crate::process::Ungated;
    use crate::utils::errors::{Hole, SyncError};

    fn init(bytes: Vec<u8>, config: &ClipConfig) -> Result<Option<StreamContext>, ClipError> {
        let mut source = Cursor::new(bytes);
        let mut sync = PageSynchronizer::default();
        let mut demux = StreamDemuxer::default();
        initialize_header(
            &mut source,
            &mut sync,
            &mut demux,
            Box::new(MockCodec::default()),
            &Ungated,
            config,
        )
    }

    #[test]
    fn reads_stream_format() -> anyhow::Result<()> {
        let bytes = ClipSpec::new(2, 44100).audio(&[16]).bytes();
        let context = init(bytes, &ClipConfig::default())?.expect("not aborted");

        assert_eq!(context.info.channels, 2);
        assert_eq!(context.info.sample_rate, 44100);
        assert_eq!(context.serial, ClipSpec::SERIAL);
        Ok(())
    }

    #[test]
    fn audio_packet_first_is_a_format_error() {
        let mut bytes = page_bytes(&PageSpec::new(5, 0).bos().packet(&[0, 4]));
        bytes.extend(page_bytes(&PageSpec::new(5, 1).packet(&mock_header(2, 1, 8000))));

        let err = init(bytes, &ClipConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ClipError::Format(FormatError::NotCodecData { index: 1, .. })
        ));
    }

    #[test]
    fn truncated_headers_are_insufficient_data() {
        let bytes = page_bytes(&PageSpec::new(5, 0).bos().packet(&mock_header(1, 1, 8000)));

        let err = init(bytes, &ClipConfig::default()).unwrap_err();
        assert!(matches!(err, ClipError::InsufficientData(_)));
    }

    #[test]
    fn garbage_before_headers_is_fatal() {
        let mut bytes = b"junk".to_vec();
        bytes.extend(ClipSpec::new(1, 8000).bytes());

        let err = init(bytes, &ClipConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ClipError::HeaderHole {
                index: 1,
                hole: Hole::Sync(SyncError::LostCapture(4))
            }
        ));
    }

    #[test]
    fn header_size_is_bounded() {
        let mut config = ClipConfig::default();
        config.set_read_chunk(64);
        config.set_max_header_bytes(64);
        let bytes = page_bytes(&PageSpec::new(5, 0).bos().raw(&[0u8; 2550], &[255; 10]));

        let err = init(bytes, &config).unwrap_err();
        assert!(matches!(err, ClipError::HeaderTooLarge(64)));
    }
}
