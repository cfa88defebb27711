use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, Level};

use ascii_reel::assets::DirectoryAssets;
use ascii_reel::audio::rodio_opener;
use ascii_reel::config::{
    load_config, resolve_bool_override, LogConfig, PlayerConfig, SubtitleConfig, AUDIO_ENV_VAR,
};
use ascii_reel::error_codes::{find_startup_error, ErrorCode, StartupError};
use ascii_reel::frame_store::{FrameSource, FrameStore};
use ascii_reel::playback::Player;
use ascii_reel::subtitles::{CaptionTrack, SubtitleIndex, SubtitleMode};
use ascii_reel::terminal;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("ASCII_REEL_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "ascii-reel")]
#[command(about = "Play a numbered still sequence as block art in the terminal")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// YAML config file; built-in defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Disable audio.
    #[arg(short = 'q', long, global = true)]
    quiet: bool,
    /// Directory holding the frame stills.
    #[arg(long, global = true)]
    frames: Option<PathBuf>,
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Play in the terminal (default).
    Play,
    /// Report what would be played, without touching the terminal.
    Probe {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = matches!(cli.command, Some(Commands::Probe { json: true }));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error, json);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let command = cli.command.clone().unwrap_or(Commands::Play);
    let config = resolve_config(&cli)?;
    init_logging(&config.log)?;

    let store = FrameStore::from_config(&config.frames);
    let frame_count = check_frames(&store)?;

    match command {
        Commands::Play => run_play(config, store, frame_count),
        Commands::Probe { json } => run_probe(&config, &store, frame_count, json),
    }
}

/// File, then environment, then flags.
fn resolve_config(cli: &Cli) -> Result<PlayerConfig> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(enabled) =
        resolve_bool_override(cli.quiet.then_some(false), env::var(AUDIO_ENV_VAR).ok())
    {
        config.audio.enabled = enabled;
    }
    if let Some(dir) = &cli.frames {
        config.frames.dir = dir.clone();
    }
    if let Some(path) = &cli.log_file {
        config.log.file = Some(path.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    config
        .validate()
        .map_err(|error| StartupError::new(ErrorCode::ConfigInvalid, format!("{error:#}")))?;
    Ok(config)
}

fn init_logging(config: &LogConfig) -> Result<()> {
    let level = config
        .level
        .parse::<Level>()
        .with_context(|| format!("invalid log level '{}'", config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    match &config.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn check_frames(store: &FrameStore) -> Result<usize> {
    let hint = format!(
        "convert the video to stills first, e.g. `ffmpeg -i <video> {}`",
        store.sequence_pattern().display()
    );
    let count = store.frame_count().map_err(|error| {
        StartupError::new(
            ErrorCode::FramesMissing,
            format!("cannot read frames directory {}: {error:#}", store.dir().display()),
        )
        .with_hint(hint.clone())
    })?;
    if count == 0 {
        return Err(StartupError::new(
            ErrorCode::FramesMissing,
            format!("no frames found in {}", store.dir().display()),
        )
        .with_hint(hint)
        .into());
    }
    Ok(count)
}

fn load_subtitles(config: &SubtitleConfig) -> SubtitleIndex {
    match DirectoryAssets::new(&config.dir) {
        Ok(assets) => SubtitleIndex::load(&assets, &config.primary, &config.secondary),
        Err(error) => {
            error!("caption directory unavailable: {error:#}");
            SubtitleIndex::default()
        }
    }
}

fn run_play(config: PlayerConfig, store: FrameStore, frame_count: usize) -> Result<()> {
    let subtitles = load_subtitles(&config.subtitles);
    let audio = config
        .audio
        .enabled
        .then(|| rodio_opener(config.audio.path.clone()));
    info!(
        frames = frame_count,
        audio = config.audio.enabled,
        "starting playback"
    );

    let tick = config.playback.tick_period();
    let mut player = Player::new(Arc::new(store), subtitles, config.playback, audio);
    terminal::run(&mut player, tick)
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    ok: bool,
    frames: FramesReport,
    audio: AudioReport,
    subtitles: SubtitlesReport,
}

#[derive(Debug, Serialize)]
struct FramesReport {
    dir: String,
    count: usize,
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct AudioReport {
    path: String,
    enabled: bool,
    present: bool,
}

#[derive(Debug, Serialize)]
struct SubtitlesReport {
    primary: TrackReport,
    secondary: TrackReport,
}

#[derive(Debug, Serialize)]
struct TrackReport {
    name: String,
    entries: usize,
}

fn run_probe(
    config: &PlayerConfig,
    store: &FrameStore,
    frame_count: usize,
    json: bool,
) -> Result<()> {
    let first = store
        .load_frame(1)
        .context("failed to read the first frame")?;
    let subtitles = load_subtitles(&config.subtitles);
    let entries = |mode| subtitles.track(mode).map_or(0, CaptionTrack::len);

    let report = ProbeReport {
        ok: true,
        frames: FramesReport {
            dir: store.dir().display().to_string(),
            count: frame_count,
            width: first.width(),
            height: first.height(),
        },
        audio: AudioReport {
            path: config.audio.path.display().to_string(),
            enabled: config.audio.enabled,
            present: config.audio.path.is_file(),
        },
        subtitles: SubtitlesReport {
            primary: TrackReport {
                name: config.subtitles.primary.clone(),
                entries: entries(SubtitleMode::Primary),
            },
            secondary: TrackReport {
                name: config.subtitles.secondary.clone(),
                entries: entries(SubtitleMode::Secondary),
            },
        },
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to encode probe report")?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "frames: {} in {} ({}x{})",
        report.frames.count, report.frames.dir, report.frames.width, report.frames.height
    );
    println!(
        "audio: {} ({}, {})",
        report.audio.path,
        if report.audio.enabled { "enabled" } else { "disabled" },
        if report.audio.present { "present" } else { "missing" }
    );
    println!(
        "captions: {} ({} entries), {} ({} entries)",
        report.subtitles.primary.name,
        report.subtitles.primary.entries,
        report.subtitles.secondary.name,
        report.subtitles.secondary.entries
    );
    Ok(())
}

fn report_error(error: &anyhow::Error, json: bool) {
    let Some(startup) = find_startup_error(error) else {
        eprintln!("error: {error:#}");
        return;
    };

    if json {
        match serde_json::to_string_pretty(&startup.envelope()) {
            Ok(rendered) => println!("{rendered}"),
            Err(encode_error) => eprintln!("error: failed to encode error: {encode_error}"),
        }
    }
    eprintln!("{}", startup.render());
}
