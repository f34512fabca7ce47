//! Terminal front end for the installer wizard.

pub mod app;
pub mod dump;
pub mod input;
mod ui;
pub mod worker;

use anyhow::Result;
use app::{App, InputResult};
use cpi_core::preferences::{Preferences, SHOW_CONSOLE};
use cpi_workflow::{FlowEngine, FlowKind, PresentationHandle};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use worker::EngineWorker;

/// Run the wizard until it is closed or the user quits.
pub fn run(
    engine: FlowEngine,
    flow: Option<FlowKind>,
    preferences: &mut Preferences,
) -> Result<()> {
    use std::io::IsTerminal;

    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "No TTY detected. The installer wizard requires an interactive terminal.\n\
             Use a subcommand or --dump-dialogs when output is piped."
        );
    }

    let presentation = engine.presentation();
    let worker = EngineWorker::spawn(engine, flow);
    let mut app = App::new(preferences.load_setting(SHOW_CONSOLE, false));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &presentation, &worker, preferences);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    worker.shutdown();

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    presentation: &PresentationHandle,
    worker: &EngineWorker,
    preferences: &mut Preferences,
) -> Result<()> {
    loop {
        let snapshot = presentation.snapshot();
        if snapshot.closed {
            log::info!("Wizard closed");
            return Ok(());
        }
        app.sync(snapshot.surface.as_ref());
        terminal.draw(|f| ui::draw(f, app, &snapshot))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match app.handle_input(key, &snapshot) {
            InputResult::Continue => {}
            InputResult::Quit => return Ok(()),
            InputResult::ToggleConsole => {
                if let Err(err) = preferences.save_setting(SHOW_CONSOLE, app.show_console) {
                    log::warn!("Failed to save console preference: {:#}", err);
                }
            }
            InputResult::Command(command) => {
                if !worker.send(command) {
                    anyhow::bail!("The installer engine stopped unexpectedly.");
                }
            }
        }
    }
}
