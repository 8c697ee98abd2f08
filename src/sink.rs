use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clipq::sink::{AudioSink, PcmFormat};
use clipq::utils::errors::SinkError;
use log::{debug, info};

use crate::wav::WavWriter;

/// Appends every clip to one WAV file.
///
/// The file is created when the first clip opens the sink; later clips must
/// use the same format. Chunk sizes are patched whenever a clip closes, so
/// the file is valid between clips.
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<File>>,
    open: bool,
}

impl WavSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            open: false,
        }
    }
}

impl AudioSink for WavSink {
    fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError> {
        if let Some(writer) = &self.writer {
            if writer.format() != format {
                return Err(SinkError::UnsupportedFormat(format!(
                    "{} already holds {}, clip is {format}",
                    self.path.display(),
                    writer.format()
                )));
            }
        } else {
            let file = File::create(&self.path)
                .map_err(|e| SinkError::Unavailable(format!("{}: {e}", self.path.display())))?;
            let mut writer = WavWriter::new(file, *format);
            writer.write_header()?;
            info!("Writing {format} to {}", self.path.display());
            self.writer = Some(writer);
        }
        self.open = true;
        Ok(())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        match &mut self.writer {
            Some(writer) if self.open => Ok(writer.write_pcm(bytes)?),
            _ => Err(SinkError::NotOpen),
        }
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.open = false;
        if let Some(writer) = &mut self.writer {
            writer.finish()?;
            debug!("{} holds {} bytes of audio", self.path.display(), writer.data_written());
        }
        Ok(())
    }
}

/// Writes bare interleaved PCM to any byte stream.
pub struct RawSink<W: Write + Send> {
    writer: W,
    format: Option<PcmFormat>,
}

impl<W: Write + Send> RawSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, format: None }
    }
}

impl RawSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> AudioSink for RawSink<W> {
    fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError> {
        if self.format.is_some_and(|previous| previous != *format) {
            info!("Raw output switches to {format}");
        }
        self.format = Some(*format);
        Ok(())
    }

    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.format.is_none() {
            return Err(SinkError::NotOpen);
        }
        Ok(self.writer.write_all(bytes)?)
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        Ok(self.writer.flush()?)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.format = None;
        Ok(self.writer.flush()?)
    }
}

/// Blocks writes so audio leaves at the rate a device would consume it.
pub struct Paced<S: AudioSink> {
    inner: S,
    byte_rate: u64,
    started: Option<Instant>,
    written: u64,
}

impl<S: AudioSink> Paced<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            byte_rate: 0,
            started: None,
            written: 0,
        }
    }
}

impl<S: AudioSink> AudioSink for Paced<S> {
    fn open(&mut self, format: &PcmFormat) -> Result<(), SinkError> {
        self.byte_rate = format.byte_rate();
        self.inner.open(format)
    }

    fn start(&mut self) -> Result<(), SinkError> {
        self.started = Some(Instant::now());
        self.written = 0;
        self.inner.start()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        self.inner.write(bytes)?;
        self.written += bytes.len() as u64;

        if let (Some(started), true) = (self.started, self.byte_rate > 0) {
            let due = started + Duration::from_secs_f64(self.written as f64 / self.byte_rate as f64);
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.started = None;
        self.inner.stop()
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_sink_appends_clips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.wav");
        let mut sink = WavSink::new(&path);
        let format = PcmFormat::s16le(8000, 1);

        for _ in 0..2 {
            sink.open(&format)?;
            sink.start()?;
            sink.write(&[1, 0, 2, 0])?;
            sink.stop()?;
            sink.close()?;
        }

        let data = std::fs::read(&path)?;
        assert_eq!(data.len(), 44 + 8);
        assert_eq!(u32::from_le_bytes([data[40], data[41], data[42], data[43]]), 8);

        let other = PcmFormat::s16le(44100, 2);
        assert!(matches!(sink.open(&other), Err(SinkError::UnsupportedFormat(_))));
        Ok(())
    }

    #[test]
    fn raw_sink_requires_open() -> anyhow::Result<()> {
        let mut sink = RawSink::new(Vec::new());
        assert!(matches!(sink.write(&[0, 0]), Err(SinkError::NotOpen)));

        sink.open(&PcmFormat::s16le(8000, 2))?;
        sink.write(&[1, 2, 3, 4])?;
        sink.close()?;
        assert_eq!(sink.writer, [1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn paced_sink_waits_for_real_time() -> anyhow::Result<()> {
        let mut sink = Paced::new(RawSink::new(Vec::new()));
        sink.open(&PcmFormat::s16le(1000, 1))?;
        sink.start()?;

        let started = Instant::now();
        sink.write(&[0; 100])?;
        assert!(started.elapsed() >= Duration::from_millis(45));
        Ok(())
    }
}
