//! The playback clock: one state record driven by one message at a time.

use std::sync::Arc;
use std::time::Duration;

use crossterm::style::Stylize;
use tracing::{debug, warn};

use crate::ascii_frame::AsciiFrame;
use crate::audio::{AudioOpener, AudioTransport};
use crate::config::PlaybackConfig;
use crate::frame_store::FrameSource;
use crate::pipeline::{FrameLoader, LoaderSettings, QueuePoll};
use crate::rasterizer::GridSize;
use crate::subtitles::{SubtitleIndex, SubtitleMode};

/// Nominal video rate used to turn a cursor into elapsed time.
pub const NOMINAL_FPS: u64 = 60;

pub const LOADING_TEXT: &str = "Loading frames...\nPress 'q' to quit, 'space' to play/pause, 'r' to reset, 's' for subtitles";
pub const CONTROLS_LEGEND: &str = "[space] play/pause | [r] reset | [s] subtitles | [q] quit";
pub const NO_FRAME_TEXT: &str = "No frame to display";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePlay,
    CycleSubtitles,
    Reset,
    Resize { width: u16, height: u16 },
    Quit,
}

#[derive(Debug)]
pub enum Message {
    Command(Command),
    Tick,
    BurstLoaded(Vec<AsciiFrame>),
}

/// What the host should do after a message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Idle,
    ScheduleTick,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Paused,
    Playing,
}

/// Elapsed video time at `cursor`, at the fixed nominal rate.
pub fn frame_offset(cursor: usize) -> Duration {
    Duration::from_millis(cursor as u64 * (1000 / NOMINAL_FPS))
}

pub struct Player {
    source: Arc<dyn FrameSource>,
    settings: PlaybackConfig,
    subtitles: SubtitleIndex,
    frames: Vec<AsciiFrame>,
    cursor: usize,
    playing: bool,
    loader: Option<FrameLoader>,
    burst_received: bool,
    mode: SubtitleMode,
    caption: Option<String>,
    show_controls: bool,
    width: u16,
    height: u16,
    audio_opener: Option<AudioOpener>,
    audio: Option<Box<dyn AudioTransport>>,
}

impl Player {
    /// `audio` is opened on the first burst; `None` plays silently.
    pub fn new(
        source: Arc<dyn FrameSource>,
        subtitles: SubtitleIndex,
        settings: PlaybackConfig,
        audio: Option<AudioOpener>,
    ) -> Self {
        Self {
            source,
            settings,
            subtitles,
            frames: Vec::new(),
            cursor: 0,
            playing: false,
            loader: None,
            burst_received: false,
            mode: SubtitleMode::Off,
            caption: None,
            show_controls: false,
            width: 0,
            height: 0,
            audio_opener: audio,
            audio: None,
        }
    }

    pub fn update(&mut self, message: Message) -> Directive {
        match message {
            Message::Command(command) => self.handle_command(command),
            Message::Tick => self.tick(),
            Message::BurstLoaded(frames) => self.accept_burst(frames),
        }
    }

    /// Non-blocking check for the initial burst.
    pub fn poll_loader(&mut self) -> Option<Message> {
        if self.burst_received {
            return None;
        }
        self.loader
            .as_mut()?
            .try_take_burst()
            .map(Message::BurstLoaded)
    }

    fn handle_command(&mut self, command: Command) -> Directive {
        match command {
            Command::TogglePlay => {
                self.playing = !self.playing;
                if let Some(audio) = self.audio.as_mut() {
                    if self.playing {
                        if audio.is_paused() {
                            audio.resume();
                        } else {
                            audio.play();
                        }
                    } else {
                        audio.pause();
                    }
                }
                self.tick_directive()
            }
            Command::CycleSubtitles => {
                self.mode = self.mode.next();
                self.caption = None;
                Directive::Idle
            }
            Command::Reset => {
                self.cursor = 0;
                self.refresh_overlay();
                if let Some(audio) = self.audio.as_mut() {
                    audio.stop();
                    if self.playing {
                        audio.play();
                    }
                }
                Directive::Idle
            }
            Command::Resize { width, height } => {
                self.width = width;
                self.height = height;
                if self.state() == PlaybackState::Idle {
                    self.start_loading();
                }
                Directive::Idle
            }
            Command::Quit => {
                if let Some(audio) = self.audio.as_mut() {
                    audio.close();
                }
                Directive::Quit
            }
        }
    }

    fn start_loading(&mut self) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let rows = self
            .height
            .saturating_sub(self.settings.caption_rows)
            .max(1);
        let settings = LoaderSettings {
            burst_frames: self.settings.burst_frames,
            queue_capacity: self.settings.queue_capacity,
            grid: GridSize::new(usize::from(self.width), usize::from(rows)),
        };
        match FrameLoader::spawn(Arc::clone(&self.source), settings) {
            Ok(loader) => {
                debug!(columns = self.width, rows, "frame loading started");
                self.loader = Some(loader);
            }
            Err(error) => warn!("could not start frame loading: {error:#}"),
        }
    }

    fn accept_burst(&mut self, frames: Vec<AsciiFrame>) -> Directive {
        debug!(frames = frames.len(), "burst accepted");
        self.frames = frames;
        self.burst_received = true;
        self.playing = true;
        self.refresh_overlay();

        if let Some(open) = self.audio_opener.take() {
            match open() {
                Ok(mut audio) => {
                    audio.play();
                    self.audio = Some(audio);
                }
                Err(error) => warn!("could not initialize audio: {error:#}"),
            }
        }
        self.tick_directive()
    }

    fn tick(&mut self) -> Directive {
        if !self.playing || self.frames.is_empty() {
            return Directive::Idle;
        }
        self.cursor = (self.cursor + 1) % self.frames.len();
        self.refresh_overlay();
        self.poll_stream();
        Directive::ScheduleTick
    }

    fn poll_stream(&mut self) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };
        match loader.queue_mut().try_pop() {
            QueuePoll::Ready(frame) => self.frames.push(frame),
            QueuePoll::Pending | QueuePoll::Closed => {}
        }
    }

    fn refresh_overlay(&mut self) {
        let elapsed = frame_offset(self.cursor);
        self.show_controls = elapsed < self.settings.intro_window();
        self.caption = self
            .subtitles
            .active_caption(self.mode, elapsed)
            .map(str::to_owned);
    }

    fn tick_directive(&self) -> Directive {
        if self.playing && !self.frames.is_empty() {
            Directive::ScheduleTick
        } else {
            Directive::Idle
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.burst_received {
            if self.playing {
                PlaybackState::Playing
            } else {
                PlaybackState::Paused
            }
        } else if self.loader.is_some() {
            PlaybackState::Loading
        } else {
            PlaybackState::Idle
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn subtitle_mode(&self) -> SubtitleMode {
        self.mode
    }

    pub fn current_caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    pub fn controls_visible(&self) -> bool {
        self.show_controls
    }

    /// True once the background stream has finished, for whatever reason.
    pub fn stream_closed(&self) -> bool {
        self.loader
            .as_ref()
            .is_some_and(|loader| loader.queue().is_closed())
    }

    /// Current screen contents. Pure projection of the state.
    pub fn view(&self) -> String {
        if self.frames.is_empty() {
            return LOADING_TEXT.to_owned();
        }

        let mut view = match self.frames.get(self.cursor) {
            Some(frame) => frame.to_text(),
            None => NO_FRAME_TEXT.to_owned(),
        };

        let width = usize::from(self.width);
        match self.caption.as_deref().filter(|text| !text.is_empty()) {
            Some(caption) if self.mode != SubtitleMode::Off => {
                view.push_str("\n\n");
                for line in caption.lines().map(str::trim).filter(|line| !line.is_empty()) {
                    view.push_str(&centered(line, width));
                    view.push('\n');
                }
            }
            _ if self.show_controls => {
                view.push_str("\n\n");
                let padding = padding_for(CONTROLS_LEGEND, width);
                view.push_str(&" ".repeat(padding));
                view.push_str(&CONTROLS_LEGEND.dim().to_string());
                view.push('\n');
            }
            _ => {}
        }
        view
    }
}

fn padding_for(line: &str, width: usize) -> usize {
    width.saturating_sub(line.chars().count()) / 2
}

fn centered(line: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(padding_for(line, width)), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::{CaptionTrack, SubtitleEntry};
    use anyhow::{bail, Result};
    use image::GrayImage;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct NoFrames;

    impl FrameSource for NoFrames {
        fn frame_count(&self) -> Result<usize> {
            Ok(0)
        }

        fn load_frame(&self, number: usize) -> Result<GrayImage> {
            bail!("frame {number} unavailable")
        }
    }

    type Calls = Rc<RefCell<Vec<&'static str>>>;

    struct RecordingAudio {
        calls: Calls,
        playing: bool,
        paused: bool,
    }

    impl AudioTransport for RecordingAudio {
        fn play(&mut self) {
            self.calls.borrow_mut().push("play");
            self.playing = true;
            self.paused = false;
        }

        fn pause(&mut self) {
            self.calls.borrow_mut().push("pause");
            self.paused = self.playing;
        }

        fn resume(&mut self) {
            self.calls.borrow_mut().push("resume");
            self.paused = false;
        }

        fn stop(&mut self) {
            self.calls.borrow_mut().push("stop");
            self.playing = false;
            self.paused = false;
        }

        fn is_playing(&self) -> bool {
            self.playing && !self.paused
        }

        fn is_paused(&self) -> bool {
            self.playing && self.paused
        }

        fn close(&mut self) {
            self.calls.borrow_mut().push("close");
        }
    }

    fn recording_audio() -> (AudioOpener, Calls) {
        let calls = Calls::default();
        let handle = Rc::clone(&calls);
        let opener: AudioOpener = Box::new(move || -> Result<Box<dyn AudioTransport>> {
            Ok(Box::new(RecordingAudio {
                calls: handle,
                playing: false,
                paused: false,
            }) as Box<dyn AudioTransport>)
        });
        (opener, calls)
    }

    fn frames(count: usize) -> Vec<AsciiFrame> {
        (1..=count)
            .map(|number| AsciiFrame::from_text(number, &format!("f{number}"), 4, 1))
            .collect()
    }

    fn player_with(subtitles: SubtitleIndex, audio: Option<AudioOpener>) -> Player {
        let mut player = Player::new(
            Arc::new(NoFrames),
            subtitles,
            PlaybackConfig::default(),
            audio,
        );
        player.width = 80;
        player.height = 24;
        player
    }

    fn loaded_player(count: usize) -> Player {
        let mut player = player_with(SubtitleIndex::default(), None);
        player.update(Message::BurstLoaded(frames(count)));
        player
    }

    fn command(player: &mut Player, command: Command) -> Directive {
        player.update(Message::Command(command))
    }

    #[test]
    fn starts_idle_with_loading_placeholder() {
        let player = player_with(SubtitleIndex::default(), None);
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.view(), LOADING_TEXT);
    }

    #[test]
    fn burst_starts_playback_and_asks_for_a_tick() {
        let mut player = player_with(SubtitleIndex::default(), None);
        let directive = player.update(Message::BurstLoaded(frames(3)));
        assert_eq!(directive, Directive::ScheduleTick);
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(player.frame_count(), 3);
    }

    #[test]
    fn legend_is_shown_as_soon_as_the_burst_lands() {
        let player = loaded_player(5);
        assert_eq!(player.cursor(), 0);
        assert!(player.controls_visible());
        assert!(player.view().contains(CONTROLS_LEGEND));
    }

    #[test]
    fn paused_reset_refreshes_the_overlay() {
        let mut player = loaded_player(1000);
        for _ in 0..913 {
            player.update(Message::Tick);
        }
        assert!(!player.controls_visible());
        command(&mut player, Command::TogglePlay);
        command(&mut player, Command::Reset);
        assert!(!player.is_playing());
        assert!(player.controls_visible());
        assert!(player.view().contains(CONTROLS_LEGEND));
    }

    #[test]
    fn advancing_frame_count_times_returns_to_start() {
        for count in [1, 2, 7, 30] {
            let mut player = loaded_player(count);
            for _ in 0..3 {
                player.update(Message::Tick);
            }
            let start = player.cursor();
            for _ in 0..count {
                assert_eq!(player.update(Message::Tick), Directive::ScheduleTick);
                assert!(player.cursor() < count);
            }
            assert_eq!(player.cursor(), start, "count {count}");
        }
    }

    #[test]
    fn ticks_do_nothing_while_paused() {
        let mut player = loaded_player(5);
        player.update(Message::Tick);
        assert_eq!(command(&mut player, Command::TogglePlay), Directive::Idle);
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.update(Message::Tick), Directive::Idle);
        assert_eq!(player.cursor(), 1);
        assert_eq!(command(&mut player, Command::TogglePlay), Directive::ScheduleTick);
    }

    #[test]
    fn reset_keeps_play_state() {
        let mut player = loaded_player(40);
        for _ in 0..17 {
            player.update(Message::Tick);
        }
        assert_eq!(player.cursor(), 17);
        command(&mut player, Command::Reset);
        assert_eq!(player.cursor(), 0);
        assert_eq!(player.state(), PlaybackState::Playing);

        for _ in 0..5 {
            player.update(Message::Tick);
        }
        command(&mut player, Command::TogglePlay);
        command(&mut player, Command::Reset);
        assert_eq!(player.cursor(), 0);
        assert_eq!(player.state(), PlaybackState::Paused);
    }

    #[test]
    fn audio_mirrors_transitions() {
        let (opener, calls) = recording_audio();
        let mut player = player_with(SubtitleIndex::default(), Some(opener));
        player.update(Message::BurstLoaded(frames(10)));

        command(&mut player, Command::TogglePlay);
        command(&mut player, Command::TogglePlay);
        command(&mut player, Command::Reset);
        command(&mut player, Command::TogglePlay);
        command(&mut player, Command::Reset);
        command(&mut player, Command::Quit);

        assert_eq!(
            *calls.borrow(),
            vec!["play", "pause", "resume", "stop", "play", "pause", "stop", "close"]
        );
    }

    #[test]
    fn audio_opens_only_once() {
        let (opener, calls) = recording_audio();
        let mut player = player_with(SubtitleIndex::default(), Some(opener));
        player.update(Message::BurstLoaded(frames(2)));
        player.update(Message::BurstLoaded(frames(2)));
        assert_eq!(*calls.borrow(), vec!["play"]);
    }

    #[test]
    fn failed_audio_open_keeps_video_playing() {
        let opener: AudioOpener = Box::new(|| -> Result<Box<dyn AudioTransport>> { bail!("no device") });
        let mut player = player_with(SubtitleIndex::default(), Some(opener));
        assert_eq!(
            player.update(Message::BurstLoaded(frames(2))),
            Directive::ScheduleTick
        );
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn quit_ends_the_session() {
        let mut player = loaded_player(2);
        assert_eq!(command(&mut player, Command::Quit), Directive::Quit);
    }

    #[test]
    fn elapsed_time_uses_integer_frame_period() {
        assert_eq!(frame_offset(0), Duration::ZERO);
        assert_eq!(frame_offset(1), Duration::from_millis(16));
        assert_eq!(frame_offset(1_818), Duration::from_millis(29_088));
    }

    fn captioned_index() -> SubtitleIndex {
        let entry = |text: &str| SubtitleEntry {
            id: 1,
            start: Duration::ZERO,
            end: Duration::from_millis(100),
            text: text.to_owned(),
        };
        SubtitleIndex::new(
            CaptionTrack::new(vec![entry("  こんにちは \n\n")]),
            CaptionTrack::new(vec![entry("hello\nworld")]),
        )
    }

    #[test]
    fn subtitle_cycle_clears_caption_until_next_tick() {
        let mut player = player_with(captioned_index(), None);
        player.update(Message::BurstLoaded(frames(10)));

        command(&mut player, Command::CycleSubtitles);
        assert_eq!(player.subtitle_mode(), SubtitleMode::Primary);
        player.update(Message::Tick);
        assert_eq!(player.current_caption(), Some("  こんにちは \n\n"));

        command(&mut player, Command::CycleSubtitles);
        assert_eq!(player.subtitle_mode(), SubtitleMode::Secondary);
        assert_eq!(player.current_caption(), None);
        player.update(Message::Tick);
        assert_eq!(player.current_caption(), Some("hello\nworld"));

        command(&mut player, Command::CycleSubtitles);
        player.update(Message::Tick);
        assert_eq!(player.subtitle_mode(), SubtitleMode::Off);
        assert_eq!(player.current_caption(), None);
    }

    #[test]
    fn subtitle_cycling_is_allowed_while_paused() {
        let mut player = loaded_player(3);
        command(&mut player, Command::TogglePlay);
        command(&mut player, Command::CycleSubtitles);
        assert_eq!(player.subtitle_mode(), SubtitleMode::Primary);
        assert!(!player.is_playing());
    }

    #[test]
    fn view_centers_caption_lines() {
        let mut player = player_with(captioned_index(), None);
        player.width = 20;
        player.update(Message::BurstLoaded(frames(10)));
        command(&mut player, Command::CycleSubtitles);
        command(&mut player, Command::CycleSubtitles);
        player.update(Message::Tick);

        assert_eq!(
            player.view(),
            "f2  \n\n       hello\n       world\n"
        );
    }

    #[test]
    fn view_trims_caption_and_skips_blank_lines() {
        let mut player = player_with(captioned_index(), None);
        player.width = 11;
        player.update(Message::BurstLoaded(frames(10)));
        command(&mut player, Command::CycleSubtitles);
        player.update(Message::Tick);

        assert_eq!(player.view(), "f2  \n\n   こんにちは\n");
    }

    #[test]
    fn view_shows_legend_during_intro_only() {
        let mut player = loaded_player(1_000);
        player.update(Message::Tick);
        assert!(player.controls_visible());
        assert!(player.view().contains(CONTROLS_LEGEND));

        // 14600 ms / 16 ms per frame
        while player.cursor() < 913 {
            player.update(Message::Tick);
        }
        assert!(!player.controls_visible());
        assert_eq!(player.view(), "f914");
    }

    #[test]
    fn resize_without_size_does_not_start_loading() {
        let mut player = player_with(SubtitleIndex::default(), None);
        command(&mut player, Command::Resize { width: 0, height: 0 });
        assert_eq!(player.state(), PlaybackState::Idle);

        command(&mut player, Command::Resize { width: 80, height: 24 });
        assert_eq!(player.state(), PlaybackState::Loading);
    }
}
