//! SRT caption tracks and time lookup.

use std::io::BufRead;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{error, info};

use crate::assets::AssetProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleEntry {
    pub id: u32,
    pub start: Duration,
    pub end: Duration,
    /// May span several lines, joined with `\n`.
    pub text: String,
}

impl SubtitleEntry {
    /// Inclusive on both ends.
    pub fn contains(&self, at: Duration) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Id,
    Timing,
    Text,
}

/// Parse SRT text. Lines that don't fit where they appear are skipped; only
/// read errors are reported.
pub fn parse_srt<R: BufRead>(reader: R) -> Result<Vec<SubtitleEntry>> {
    let mut entries = Vec::new();
    let mut state = ScanState::Id;
    let mut current = SubtitleEntry {
        id: 0,
        start: Duration::ZERO,
        end: Duration::ZERO,
        text: String::new(),
    };

    for (index, raw) in reader.split(b'\n').enumerate() {
        let raw = raw.context("error reading srt source")?;
        // Bad bytes become U+FFFD so one broken line never sinks the track.
        let line = String::from_utf8_lossy(&raw);
        let line = if index == 0 {
            line.trim_start_matches('\u{feff}')
        } else {
            &line
        };
        let line = line.trim_end_matches('\r');

        match state {
            ScanState::Id => {
                if let Ok(id) = line.trim().parse::<u32>() {
                    current.id = id;
                    state = ScanState::Timing;
                }
            }
            ScanState::Timing => {
                if let Some((start, end)) = parse_timing_line(line) {
                    current.start = start;
                    current.end = end;
                    state = ScanState::Text;
                }
            }
            ScanState::Text => {
                if line.trim().is_empty() {
                    entries.push(std::mem::replace(
                        &mut current,
                        SubtitleEntry {
                            id: 0,
                            start: Duration::ZERO,
                            end: Duration::ZERO,
                            text: String::new(),
                        },
                    ));
                    state = ScanState::Id;
                } else {
                    if !current.text.is_empty() {
                        current.text.push('\n');
                    }
                    current.text.push_str(line);
                }
            }
        }
    }

    // The blank terminator is optional on the final entry.
    if state == ScanState::Text && current.id != 0 {
        entries.push(current);
    }

    Ok(entries)
}

/// `00:00:29,082 --> 00:00:31,000`
pub fn parse_timing_line(line: &str) -> Option<(Duration, Duration)> {
    let (start, end) = line.split_once("-->")?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end.trim())?))
}

/// `HH:MM:SS,mmm` (a `.` before the milliseconds is tolerated).
pub fn parse_timestamp(raw: &str) -> Option<Duration> {
    static TIMESTAMP_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIMESTAMP_RE.get_or_init(|| {
        Regex::new(r"^(\d{1,3}):(\d{1,2}):(\d{1,2})[,.](\d{1,3})$")
            .expect("timestamp regex should compile")
    });
    let capture = re.captures(raw)?;
    let hours = capture.get(1)?.as_str().parse::<u64>().ok()?;
    let minutes = capture.get(2)?.as_str().parse::<u64>().ok()?;
    let seconds = capture.get(3)?.as_str().parse::<u64>().ok()?;
    let millis = capture.get(4)?.as_str().parse::<u64>().ok()?;
    Some(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

/// One language's captions, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptionTrack {
    entries: Vec<SubtitleEntry>,
}

impl CaptionTrack {
    pub fn new(entries: Vec<SubtitleEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry in list order whose interval contains `at`.
    pub fn active_at(&self, at: Duration) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.contains(at))
            .map(|entry| entry.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtitleMode {
    #[default]
    Off,
    Primary,
    Secondary,
}

impl SubtitleMode {
    /// off → primary → secondary → off
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Primary,
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Off,
        }
    }
}

/// Both caption tracks.
#[derive(Debug, Clone, Default)]
pub struct SubtitleIndex {
    primary: CaptionTrack,
    secondary: CaptionTrack,
}

impl SubtitleIndex {
    pub fn new(primary: CaptionTrack, secondary: CaptionTrack) -> Self {
        Self { primary, secondary }
    }

    /// Load both tracks. A track that can't be opened or read is logged and
    /// left empty; playback carries on without it.
    pub fn load(provider: &dyn AssetProvider, primary: &str, secondary: &str) -> Self {
        Self {
            primary: load_track(provider, primary),
            secondary: load_track(provider, secondary),
        }
    }

    pub fn track(&self, mode: SubtitleMode) -> Option<&CaptionTrack> {
        match mode {
            SubtitleMode::Off => None,
            SubtitleMode::Primary => Some(&self.primary),
            SubtitleMode::Secondary => Some(&self.secondary),
        }
    }

    pub fn active_caption(&self, mode: SubtitleMode, at: Duration) -> Option<&str> {
        self.track(mode)?.active_at(at)
    }
}

fn load_track(provider: &dyn AssetProvider, name: &str) -> CaptionTrack {
    let parsed = provider.open(name).and_then(parse_srt);
    match parsed {
        Ok(entries) => {
            info!(track = name, entries = entries.len(), "caption track loaded");
            CaptionTrack::new(entries)
        }
        Err(err) => {
            error!(track = name, "could not load caption track: {err:#}");
            CaptionTrack::default()
        }
    }
}
