//! The playback queue controller.
//!
//! A [`Player`] owns a FIFO of clip requests and one background worker that
//! plays them one at a time through a single [`AudioSink`]. Callers on any
//! thread may enqueue, clear, pause, resume and skip while the worker runs.

use std::collections::VecDeque;
use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::codec::SharedCodecFactory;
use crate::process::decode::{ClipSummary, Finish, play_clip};
use crate::process::{ClipConfig, Flow, PlaybackGate};
use crate::sink::AudioSink;
use crate::utils::errors::PlayerError;

/// Compressed clip bytes. `Ok(0)` from `read` ends the input.
pub type ByteSource = Box<dyn Read + Send>;

/// Identifies an enqueued clip. Ids increase monotonically per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClipId(pub u64);

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A queued clip: its byte source and the wait applied after dequeuing it.
pub struct ClipRequest {
    pub id: ClipId,
    pub name: String,
    pub source: ByteSource,
    pub delay: Duration,
}

impl std::fmt::Debug for ClipRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipRequest")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No clip is in flight.
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipOutcome {
    Completed(ClipSummary),
    Aborted(ClipSummary),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The worker dequeued the clip.
    ClipStarted { id: ClipId, name: String },
    /// The clip is done and its resources are released.
    ClipFinished {
        id: ClipId,
        name: String,
        outcome: ClipOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Decoding tunables applied to every clip.
    pub clip: ClipConfig,
    pub thread_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            clip: ClipConfig::default(),
            thread_name: "clipq-player".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    clips: VecDeque<ClipRequest>,
    next_id: u64,
    in_flight: bool,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Control {
    paused: bool,
    abort: bool,
    shutdown: bool,
}

/// State shared between the caller side and the worker.
///
/// Lock order is `queue` before `control`; neither is held across a clip.
#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<Queue>,
    queue_changed: Condvar,
    control: Mutex<Control>,
    control_changed: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlaybackGate for Shared {
    fn checkpoint(&self) -> Flow {
        let mut control = lock(&self.control);
        loop {
            if control.abort || control.shutdown {
                return Flow::Abort;
            }
            if !control.paused {
                return Flow::Continue;
            }
            control = self
                .control_changed
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Sequential clip player with one background worker.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use clipq::codec::SharedCodecFactory;
/// # use clipq::player::{Player, PlayerConfig};
/// # use clipq::sink::AudioSink;
/// # fn demo(factory: SharedCodecFactory, sink: Box<dyn AudioSink>) -> anyhow::Result<()> {
/// let mut player = Player::new(factory, sink, PlayerConfig::default());
/// player.enqueue("intro", Box::new(std::fs::File::open("intro.ogg")?), Duration::ZERO)?;
/// player.start()?;
/// player.wait_idle();
/// player.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Player {
    shared: Arc<Shared>,
    factory: SharedCodecFactory,
    sink: Option<Box<dyn AudioSink>>,
    config: PlayerConfig,
    events: Option<Sender<PlayerEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(factory: SharedCodecFactory, sink: Box<dyn AudioSink>, config: PlayerConfig) -> Self {
        Self {
            shared: Arc::default(),
            factory,
            sink: Some(sink),
            config,
            events: None,
            worker: None,
        }
    }

    /// Routes lifecycle events to `events`. Takes effect at [`start`](Self::start).
    pub fn set_event_sender(&mut self, events: Sender<PlayerEvent>) {
        self.events = Some(events);
    }

    /// Appends a clip to the queue.
    pub fn enqueue(
        &self,
        name: impl Into<String>,
        source: ByteSource,
        delay: Duration,
    ) -> Result<ClipId, PlayerError> {
        let mut queue = lock(&self.shared.queue);
        if queue.shutdown {
            return Err(PlayerError::ShutDown);
        }

        queue.next_id += 1;
        let id = ClipId(queue.next_id);
        let request = ClipRequest {
            id,
            name: name.into(),
            source,
            delay,
        };
        debug!("Enqueued clip {id} ({})", request.name);
        queue.clips.push_back(request);
        drop(queue);

        self.shared.queue_changed.notify_all();
        Ok(id)
    }

    /// Drops every pending clip. The clip in flight keeps playing.
    ///
    /// Returns the number of clips dropped.
    pub fn clear_queue(&self) -> usize {
        let dropped = {
            let mut queue = lock(&self.shared.queue);
            let dropped = queue.clips.len();
            queue.clips.clear();
            dropped
        };
        debug!("Cleared {dropped} pending clips");
        self.shared.queue_changed.notify_all();
        dropped
    }

    /// Suspends playback at the worker's next checkpoint.
    pub fn pause(&self) {
        lock(&self.shared.control).paused = true;
        self.shared.control_changed.notify_all();
    }

    pub fn resume(&self) {
        lock(&self.shared.control).paused = false;
        self.shared.control_changed.notify_all();
    }

    /// Aborts the clip in flight, including its pending delay.
    ///
    /// Returns `false` when no clip was in flight.
    pub fn skip(&self) -> bool {
        let queue = lock(&self.shared.queue);
        if !queue.in_flight {
            return false;
        }
        lock(&self.shared.control).abort = true;
        drop(queue);

        self.shared.control_changed.notify_all();
        true
    }

    pub fn state(&self) -> PlaybackState {
        let in_flight = lock(&self.shared.queue).in_flight;
        let paused = lock(&self.shared.control).paused;
        match (in_flight, paused) {
            (false, _) => PlaybackState::Idle,
            (true, true) => PlaybackState::Paused,
            (true, false) => PlaybackState::Playing,
        }
    }

    /// Clips waiting in the queue, not counting the one in flight.
    pub fn pending(&self) -> usize {
        lock(&self.shared.queue).clips.len()
    }

    /// Launches the worker.
    pub fn start(&mut self) -> Result<(), PlayerError> {
        if lock(&self.shared.queue).shutdown {
            return Err(PlayerError::ShutDown);
        }
        let Some(sink) = self.sink.take() else {
            return Err(PlayerError::AlreadyStarted);
        };

        let worker = Worker {
            shared: self.shared.clone(),
            factory: self.factory.clone(),
            sink,
            config: self.config.clip.clone(),
            events: self.events.take(),
        };

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(PlayerError::Spawn)?;

        info!("Player worker started");
        self.worker = Some(handle);
        Ok(())
    }

    /// Blocks until the queue is empty and no clip is in flight.
    ///
    /// Returns at once when the worker is not running. A paused player is
    /// never idle while a clip is in flight.
    pub fn wait_idle(&self) {
        while !self.wait_idle_timeout(Duration::from_secs(3600)) {}
    }

    /// Like [`wait_idle`](Self::wait_idle), giving up after `timeout`.
    ///
    /// Returns `true` when the player became idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        if self.worker.is_none() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut queue = lock(&self.shared.queue);
        while !queue.shutdown && (queue.in_flight || !queue.clips.is_empty()) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            queue = self
                .shared
                .queue_changed
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Stops the worker at its next checkpoint and joins it.
    ///
    /// The clip in flight is aborted and pending clips are dropped. Later
    /// calls to [`enqueue`](Self::enqueue) fail.
    pub fn shutdown(&mut self) -> Result<(), PlayerError> {
        {
            let mut queue = lock(&self.shared.queue);
            queue.shutdown = true;
            queue.clips.clear();
            lock(&self.shared.control).shutdown = true;
        }
        self.shared.queue_changed.notify_all();
        self.shared.control_changed.notify_all();

        if let Some(handle) = self.worker.take() {
            handle.join().map_err(|_| PlayerError::WorkerPanicked)?;
            info!("Player worker stopped");
        }
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("{e}");
        }
    }
}

struct Worker {
    shared: Arc<Shared>,
    factory: SharedCodecFactory,
    sink: Box<dyn AudioSink>,
    config: ClipConfig,
    events: Option<Sender<PlayerEvent>>,
}

impl Worker {
    fn run(mut self) {
        while let Some(request) = self.dequeue() {
            let ClipRequest {
                id,
                name,
                mut source,
                delay,
            } = request;

            self.emit(PlayerEvent::ClipStarted {
                id,
                name: name.clone(),
            });

            let outcome = if self.wait_delay(delay) {
                ClipOutcome::Aborted(ClipSummary::aborted())
            } else {
                self.play(id, &mut source)
            };
            drop(source);

            lock(&self.shared.queue).in_flight = false;
            self.shared.queue_changed.notify_all();

            self.emit(PlayerEvent::ClipFinished { id, name, outcome });
        }
        debug!("Player worker exiting");
    }

    /// Blocks until a clip is available and marks it in flight. Returns
    /// `None` on shutdown.
    fn dequeue(&self) -> Option<ClipRequest> {
        let mut queue = lock(&self.shared.queue);
        loop {
            if queue.shutdown {
                return None;
            }
            if let Some(request) = queue.clips.pop_front() {
                queue.in_flight = true;
                lock(&self.shared.control).abort = false;
                return Some(request);
            }
            queue = self
                .shared
                .queue_changed
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Returns `true` when the wait was cut short by skip or shutdown.
    fn wait_delay(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut control = lock(&self.shared.control);
        loop {
            if control.abort || control.shutdown {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            control = self
                .shared
                .control_changed
                .wait_timeout(control, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn play(&mut self, id: ClipId, source: &mut ByteSource) -> ClipOutcome {
        let codec = self.factory.create();
        let result = catch_unwind(AssertUnwindSafe(|| {
            play_clip(
                source.as_mut(),
                codec,
                self.sink.as_mut(),
                self.shared.as_ref(),
                &self.config,
            )
        }));

        match result {
            Ok(Ok(summary)) if summary.finish == Finish::Aborted => {
                info!("Clip {id} aborted after {} frames", summary.frames);
                ClipOutcome::Aborted(summary)
            }
            Ok(Ok(summary)) => {
                debug!("Clip {id} completed: {summary:?}");
                ClipOutcome::Completed(summary)
            }
            Ok(Err(e)) => {
                error!("Clip {id} failed: {e}");
                ClipOutcome::Failed(e.to_string())
            }
            Err(_) => {
                error!("Clip {id} failed: decoder panicked");
                ClipOutcome::Failed("decoder panicked".to_string())
            }
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                warn!("Player event receiver is gone");
            }
        }
    }
}
