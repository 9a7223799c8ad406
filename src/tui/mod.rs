//! Terminal dashboard for the board
//!
//! Three views over one project:
//! - Board: milestones in status columns with task progress
//! - Dialogue: filterable timeline of the project's dialogue
//! - Dependencies: milestone graph on a pannable canvas
//!
//! Data comes through a [`SyncLayer`](crate::sync::SyncLayer), so the loop
//! never blocks on the store and picks up writes from other processes.

pub mod app;
pub mod events;
pub mod ui;
pub mod views;

use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

use crossterm::{
    event::{poll, read, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use crate::{Config, Database};
use app::App;
use events::handle_event;

/// Terminal modes switched on so far. `restore` switches off exactly those.
#[derive(Debug, Default)]
struct TerminalModes {
    raw: bool,
    alternate_screen: bool,
}

impl TerminalModes {
    fn restore<W: Write>(&mut self, out: &mut W) {
        if std::mem::take(&mut self.alternate_screen) {
            let _ = execute!(out, LeaveAlternateScreen, DisableMouseCapture);
        }
        if std::mem::take(&mut self.raw) {
            let _ = disable_raw_mode();
        }
    }
}

/// Raw mode plus alternate screen, restored on drop (including unwinding)
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    modes: TerminalModes,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        let mut modes = TerminalModes::default();
        match Self::switch_modes(&mut modes) {
            Ok(terminal) => Ok(Self { terminal, modes }),
            Err(e) => {
                modes.restore(&mut io::stdout());
                Err(e)
            }
        }
    }

    fn switch_modes(modes: &mut TerminalModes) -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
        enable_raw_mode()?;
        modes.raw = true;
        let mut stdout = io::stdout();
        // Set before entering so a half-applied execute! is still undone
        modes.alternate_screen = true;
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        Terminal::new(CrosstermBackend::new(stdout))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.terminal.show_cursor();
        self.modes.restore(self.terminal.backend_mut());
    }
}

/// Run the TUI until the user quits
pub fn run(db: Database, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    // Build app state before touching the terminal so startup errors print normally
    let mut app = App::new(db, config)?;
    app.settle(Duration::from_secs(2));

    let mut guard = TerminalGuard::enter()?;
    run_event_loop(&mut guard.terminal, &mut app)
}

fn run_event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if poll(timeout)? {
            match read()? {
                Event::Key(key) => {
                    if handle_event(app, key) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }

        // Fetch results, change-feed signals and poll refreshes
        app.pump();

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_without_modes_writes_nothing() {
        let mut out = Vec::new();
        TerminalModes::default().restore(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_restore_leaves_alternate_screen_once() {
        let mut modes = TerminalModes {
            raw: false,
            alternate_screen: true,
        };
        let mut out = Vec::new();
        modes.restore(&mut out);
        assert!(String::from_utf8_lossy(&out).contains("\x1b[?1049l"));

        let written = out.len();
        modes.restore(&mut out);
        assert_eq!(out.len(), written);
    }
}
