//! Soundtrack playback mirrored from the playback clock.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, warn};

const WATCHDOG_PERIOD: Duration = Duration::from_millis(100);

/// Commands the clock sends to the soundtrack. Fire-and-forget: none of these
/// report failure back to the caller.
pub trait AudioTransport {
    /// Start from the current position. No-op while already playing.
    fn play(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    /// Halt and rewind to the start of the track.
    fn stop(&mut self);
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;
    /// Release the device and the file. Safe to call more than once.
    fn close(&mut self);
}

/// Opens the transport on first use.
pub type AudioOpener = Box<dyn FnOnce() -> Result<Box<dyn AudioTransport>>>;

pub fn rodio_opener(path: PathBuf) -> AudioOpener {
    Box::new(move || -> Result<Box<dyn AudioTransport>> {
        let transport = RodioTransport::open(&path)?;
        Ok(Box::new(transport) as Box<dyn AudioTransport>)
    })
}

#[derive(Default)]
struct AudioState {
    sink: Option<Sink>,
    playing: bool,
    paused: bool,
    /// Bumped on every stop so a stale watchdog knows to exit.
    generation: u64,
    closed: bool,
}

impl AudioState {
    fn lock(state: &Mutex<AudioState>) -> MutexGuard<'_, AudioState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct RodioTransport {
    path: PathBuf,
    // Held only to keep the output device open.
    stream: Option<OutputStream>,
    handle: OutputStreamHandle,
    state: Arc<Mutex<AudioState>>,
}

impl RodioTransport {
    pub fn open(path: &Path) -> Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("failed to open audio output device")?;
        let sink = build_sink(&handle, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            stream: Some(stream),
            handle,
            state: Arc::new(Mutex::new(AudioState {
                sink: Some(sink),
                ..AudioState::default()
            })),
        })
    }

    fn spawn_watchdog(&self, generation: u64) {
        let state = Arc::clone(&self.state);
        let spawned = thread::Builder::new()
            .name("ascii-reel-audio-watchdog".to_owned())
            .spawn(move || watch_until_finished(&state, generation));
        if let Err(error) = spawned {
            warn!("audio watchdog unavailable: {error}");
        }
    }
}

fn build_sink(handle: &OutputStreamHandle, path: &Path) -> Result<Sink> {
    let file = File::open(path)
        .with_context(|| format!("error opening audio file {}", path.display()))?;
    let source = Decoder::new(BufReader::new(file))
        .with_context(|| format!("error decoding audio file {}", path.display()))?;
    let sink = Sink::try_new(handle).context("failed to create audio sink")?;
    sink.pause();
    sink.append(source);
    Ok(sink)
}

fn watch_until_finished(state: &Mutex<AudioState>, generation: u64) {
    loop {
        thread::sleep(WATCHDOG_PERIOD);
        let mut guard = AudioState::lock(state);
        if guard.closed || guard.generation != generation || !guard.playing {
            return;
        }
        if guard.paused {
            continue;
        }
        if guard.sink.as_ref().map_or(true, Sink::empty) {
            debug!("soundtrack finished");
            guard.playing = false;
            return;
        }
    }
}

impl AudioTransport for RodioTransport {
    fn play(&mut self) {
        let generation = {
            let mut guard = AudioState::lock(&self.state);
            if guard.closed || guard.playing {
                return;
            }
            guard.playing = true;
            guard.paused = false;
            if let Some(sink) = &guard.sink {
                sink.play();
            }
            guard.generation
        };
        self.spawn_watchdog(generation);
    }

    fn pause(&mut self) {
        let mut guard = AudioState::lock(&self.state);
        if !guard.playing || guard.paused {
            return;
        }
        guard.paused = true;
        if let Some(sink) = &guard.sink {
            sink.pause();
        }
    }

    fn resume(&mut self) {
        let mut guard = AudioState::lock(&self.state);
        if !guard.playing || !guard.paused {
            return;
        }
        guard.paused = false;
        if let Some(sink) = &guard.sink {
            sink.play();
        }
    }

    fn stop(&mut self) {
        let mut guard = AudioState::lock(&self.state);
        if guard.closed {
            return;
        }
        guard.playing = false;
        guard.paused = false;
        guard.generation += 1;
        if let Some(sink) = guard.sink.take() {
            sink.stop();
        }
        match build_sink(&self.handle, &self.path) {
            Ok(sink) => guard.sink = Some(sink),
            Err(error) => warn!("could not rewind soundtrack: {error:#}"),
        }
    }

    fn is_playing(&self) -> bool {
        let guard = AudioState::lock(&self.state);
        guard.playing && !guard.paused
    }

    fn is_paused(&self) -> bool {
        let guard = AudioState::lock(&self.state);
        guard.playing && guard.paused
    }

    fn close(&mut self) {
        {
            let mut guard = AudioState::lock(&self.state);
            guard.closed = true;
            guard.playing = false;
            guard.paused = false;
            if let Some(sink) = guard.sink.take() {
                sink.stop();
            }
        }
        self.stream = None;
    }
}

impl Drop for RodioTransport {
    fn drop(&mut self) {
        self.close();
    }
}
