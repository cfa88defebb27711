//! Crossterm host: owns the screen and the keyboard and feeds the player.

use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{execute, queue};
use tracing::{debug, warn};

use crate::playback::{Command, Directive, Message, Player};

/// Upper bound on how long the loop sleeps without a pending tick.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Raw mode plus alternate screen, undone on drop.
struct TerminalGuard;

impl TerminalGuard {
    fn enter(out: &mut Stdout) -> Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        if let Err(error) = execute!(out, EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(error).context("failed to enter alternate screen");
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut out = io::stdout();
        if let Err(error) = execute!(out, Show, LeaveAlternateScreen) {
            warn!("failed to leave alternate screen: {error}");
        }
        if let Err(error) = disable_raw_mode() {
            warn!("failed to disable raw mode: {error}");
        }
    }
}

pub fn command_for_key(key: KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Command::Quit)
        }
        KeyCode::Char('q') => Some(Command::Quit),
        KeyCode::Char(' ') => Some(Command::TogglePlay),
        KeyCode::Char('s') => Some(Command::CycleSubtitles),
        KeyCode::Char('r') => Some(Command::Reset),
        _ => None,
    }
}

/// Run the player until it asks to quit.
///
/// Exactly one tick is ever pending: a `ScheduleTick` while one is already
/// armed is absorbed.
pub fn run(player: &mut Player, tick: Duration) -> Result<()> {
    let mut out = io::stdout();
    let _guard = TerminalGuard::enter(&mut out)?;

    let (width, height) = terminal::size().context("failed to query terminal size")?;
    let mut rows = height;
    let mut next_tick: Option<Instant> = None;
    let mut dirty = true;

    if dispatch(
        player,
        Message::Command(Command::Resize { width, height }),
        &mut next_tick,
        tick,
    ) {
        return Ok(());
    }

    loop {
        if let Some(message) = player.poll_loader() {
            dirty = true;
            if dispatch(player, message, &mut next_tick, tick) {
                return Ok(());
            }
        }

        if next_tick.is_some_and(|deadline| Instant::now() >= deadline) {
            next_tick = None;
            dirty = true;
            if dispatch(player, Message::Tick, &mut next_tick, tick) {
                return Ok(());
            }
        }

        if dirty {
            draw(&mut out, &player.view(), rows)?;
            dirty = false;
        }

        let timeout = next_tick
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL)
            .min(IDLE_POLL);
        if !event::poll(timeout).context("failed to poll terminal events")? {
            continue;
        }

        let command = match event::read().context("failed to read terminal event")? {
            Event::Key(key) => command_for_key(key),
            Event::Resize(width, height) => {
                rows = height;
                Some(Command::Resize { width, height })
            }
            _ => None,
        };
        if let Some(command) = command {
            debug!(?command, "command");
            dirty = true;
            if dispatch(player, Message::Command(command), &mut next_tick, tick) {
                return Ok(());
            }
        }
    }
}

/// Returns true when the player asked to quit.
fn dispatch(
    player: &mut Player,
    message: Message,
    next_tick: &mut Option<Instant>,
    tick: Duration,
) -> bool {
    match player.update(message) {
        Directive::Quit => true,
        Directive::ScheduleTick => {
            next_tick.get_or_insert_with(|| Instant::now() + tick);
            false
        }
        Directive::Idle => false,
    }
}

fn draw(out: &mut impl Write, view: &str, rows: u16) -> Result<()> {
    for (row, line) in view.split('\n').take(usize::from(rows)).enumerate() {
        let row = u16::try_from(row).unwrap_or(u16::MAX);
        queue!(out, MoveTo(0, row), Print(line), Clear(ClearType::UntilNewLine))?;
    }
    queue!(out, Clear(ClearType::FromCursorDown))?;
    out.flush().context("failed to flush terminal")?;
    Ok(())
}
