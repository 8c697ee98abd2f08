use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clipq::codec::SharedCodecFactory;
use clipq::player::{ByteSource, ClipOutcome, Player, PlayerConfig, PlayerEvent};
use clipq::process::ClipConfig;
use clipq::sink::AudioSink;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};

use super::command::{Cli, OutputFormat, PlayArgs};
use crate::clipdb::ClipDb;
use crate::input::InputReader;
use crate::sink::{Paced, RawSink, WavSink};
use crate::timestamp::{duration_str, frames_str};
use crate::vorbis::VorbisCodec;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn cmd_play(args: &PlayArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let sources = open_sources(args)?;

    let mut clip = ClipConfig::default();
    clip.set_read_chunk(args.chunk_size);
    clip.set_fail_level(cli.fail_level());
    let config = PlayerConfig {
        clip,
        ..PlayerConfig::default()
    };

    let factory: SharedCodecFactory = Arc::new(VorbisCodec::boxed);
    let mut player = Player::new(factory, build_sink(args)?, config);

    let (tx, rx) = mpsc::channel();
    player.set_event_sender(tx);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new(sources.len() as u64));
            pb.set_style(ProgressStyle::with_template(
                "{bar:40.cyan/blue} {pos}/{len} clips\n{msg} | elapsed: {elapsed_precise}",
            )?);
            Some(pb)
        }
        None => None,
    };
    let reporter = spawn_reporter(rx, pb);

    let delay = Duration::from_millis(args.delay_ms);
    for (name, source) in sources {
        player.enqueue(name, source, delay)?;
    }
    let started = Instant::now();
    player.start()?;

    if args.interactive {
        run_interactive(&player);
    } else {
        player.wait_idle();
    }

    player.shutdown()?;
    drop(player);

    let tally = match reporter.join() {
        Ok(tally) => tally,
        Err(_) => bail!("Event reporter panicked"),
    };

    info!(
        "Played {} clips ({} aborted, {} failed), {} frames in {}",
        tally.completed,
        tally.aborted,
        tally.failed,
        tally.frames,
        duration_str(started.elapsed())
    );

    if cli.strict && tally.failed > 0 {
        bail!("{} clips failed", tally.failed);
    }
    Ok(())
}

fn open_sources(args: &PlayArgs) -> Result<Vec<(String, ByteSource)>> {
    match &args.db {
        Some(index) => {
            let db = ClipDb::open(index)?;
            if db.is_empty() {
                bail!("Clip database {} is empty", index.display());
            }
            log::debug!("{} clips: {}", db.len(), db.names().collect::<Vec<_>>().join(", "));
            args.clips
                .iter()
                .map(|name| -> Result<(String, ByteSource)> { Ok((name.clone(), db.source(name)?)) })
                .collect()
        }
        None => {
            let stdin_clips = args.clips.iter().filter(|clip| *clip == "-").count();
            if stdin_clips > 1 {
                bail!("Standard input can be used for one clip only");
            }
            if stdin_clips > 0 && args.interactive {
                bail!("Standard input cannot carry both a clip and interactive commands");
            }
            args.clips
                .iter()
                .map(|path| -> Result<(String, ByteSource)> {
                    Ok((path.clone(), InputReader::new(path)?.into_source()))
                })
                .collect()
        }
    }
}

fn build_sink(args: &PlayArgs) -> Result<Box<dyn AudioSink>> {
    let to_stdout = args.output.as_os_str() == "-";

    let sink: Box<dyn AudioSink> = match (args.format, to_stdout) {
        (OutputFormat::Wav, true) => {
            bail!("WAV output needs a seekable file; use --format pcm to write to stdout")
        }
        (OutputFormat::Wav, false) => Box::new(WavSink::new(&args.output)),
        (OutputFormat::Pcm, true) => Box::new(RawSink::stdout()),
        (OutputFormat::Pcm, false) => Box::new(RawSink::new(io::BufWriter::new(
            std::fs::File::create(&args.output)?,
        ))),
    };

    Ok(if args.realtime {
        Box::new(Paced::new(sink))
    } else {
        sink
    })
}

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    aborted: usize,
    failed: usize,
    frames: u64,
}

fn spawn_reporter(rx: Receiver<PlayerEvent>, pb: Option<ProgressBar>) -> JoinHandle<Tally> {
    thread::spawn(move || {
        let mut tally = Tally::default();

        for event in rx {
            match event {
                PlayerEvent::ClipStarted { id, name } => {
                    info!("Clip {id}: {name}");
                    if let Some(pb) = &pb {
                        pb.set_message(name);
                    }
                }
                PlayerEvent::ClipFinished { id, name, outcome } => {
                    match outcome {
                        ClipOutcome::Completed(summary) => {
                            info!(
                                "Clip {id} done: {} ({} ch, {} Hz, {} holes)",
                                frames_str(summary.frames, summary.sample_rate),
                                summary.channels,
                                summary.sample_rate,
                                summary.holes
                            );
                            tally.completed += 1;
                            tally.frames += summary.frames;
                        }
                        ClipOutcome::Aborted(summary) => {
                            warn!("Clip {id} ({name}) skipped after {} frames", summary.frames);
                            tally.aborted += 1;
                            tally.frames += summary.frames;
                        }
                        ClipOutcome::Failed(reason) => {
                            error!("Clip {id} ({name}) failed: {reason}");
                            tally.failed += 1;
                        }
                    }
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                }
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        tally
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
    Skip,
    Clear,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "pause" | "p" => Some(Self::Pause),
            "resume" | "r" => Some(Self::Resume),
            "skip" | "s" => Some(Self::Skip),
            "clear" | "c" => Some(Self::Clear),
            "quit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Forwards stdin commands to the player until it is idle or told to quit.
fn run_interactive(player: &Player) {
    let (tx, rx) = mpsc::channel();
    // The reader stays blocked on stdin after playback ends; it is not joined.
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command {:?}", line.trim()),
            }
        }
    });

    info!("Commands: pause, resume, skip, clear, quit");
    loop {
        if player.wait_idle_timeout(POLL_INTERVAL) {
            return;
        }

        loop {
            let command = match rx.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    player.wait_idle();
                    return;
                }
            };

            match command {
                Command::Pause => player.pause(),
                Command::Resume => player.resume(),
                Command::Skip => {
                    if !player.skip() {
                        info!("Nothing to skip");
                    }
                }
                Command::Clear => info!("Dropped {} queued clips", player.clear_queue()),
                Command::Quit => {
                    player.clear_queue();
                    player.skip();
                    player.resume();
                    return;
                }
            }
        }
    }
}
