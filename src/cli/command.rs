use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (clipq ",
    env!("CLIPQ_VERSION"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Plays queued Ogg Vorbis clips and packs clip databases",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat recoverable stream damage as fatal for the clip.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play clips one after another into an audio output.
    Play(PlayArgs),

    /// Print stream information
    Info(InfoArgs),

    /// Pack a directory of clips into a clip database.
    Pack(PackArgs),
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Clip files (use "-" for stdin), or clip names with --db.
    #[arg(value_name = "CLIPS", required = true)]
    pub clips: Vec<String>,

    /// Clip database index (<base>.yaml) to resolve clip names against.
    #[arg(long, value_name = "INDEX")]
    pub db: Option<PathBuf>,

    /// Pause before each clip, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub delay_ms: u64,

    /// Audio output path (use "-" for stdout).
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// Audio format for output.
    #[arg(long, value_enum, default_value_t = OutputFormat::Wav)]
    pub format: OutputFormat,

    /// Write audio no faster than it would play.
    #[arg(long)]
    pub realtime: bool,

    /// Read pause, resume, skip, clear and quit commands from stdin.
    #[arg(long)]
    pub interactive: bool,

    /// Bytes requested from a clip per read.
    #[arg(long, value_name = "BYTES", default_value_t = 4096)]
    pub chunk_size: usize,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input Ogg Vorbis clip (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Directory holding the .ogg clips.
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Output base name; writes <BASE>.bin and <BASE>.yaml.
    #[arg(long, value_name = "BASE")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    /// RIFF/WAVE, 16-bit PCM.
    Wav,
    /// Raw PCM (16-bit little-endian, interleaved).
    Pcm,
}

impl Cli {
    /// Failure level for recoverable stream damage.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_arguments() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "clipqd", "--strict", "play", "a.ogg", "b.ogg", "--output", "-", "--format", "pcm",
            "--delay-ms", "250",
        ])?;

        assert_eq!(cli.fail_level(), log::Level::Warn);
        let Commands::Play(args) = cli.command else {
            panic!("expected play");
        };
        assert_eq!(args.clips, ["a.ogg", "b.ogg"]);
        assert_eq!(args.format, OutputFormat::Pcm);
        assert_eq!(args.delay_ms, 250);
        assert_eq!(args.chunk_size, 4096);
        Ok(())
    }

    #[test]
    fn play_needs_clips() {
        assert!(Cli::try_parse_from(["clipqd", "play", "--output", "x.wav"]).is_err());
    }
}
