//! The engine runs on its own thread so device work never blocks drawing.

use cpi_core::secrets::CredentialField;
use cpi_workflow::{ButtonAction, FlowEngine, FlowKind, WizardError};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// What the front end asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    Press(ButtonAction),
    Dismiss,
    SelectBoard(usize),
    UpdateCredential(CredentialField, String),
    Quit,
}

/// Apply one command to the engine.
pub fn dispatch(engine: &mut FlowEngine, command: UiCommand) -> Result<(), WizardError> {
    match command {
        UiCommand::Press(action) => engine.press_button(action),
        UiCommand::Dismiss => engine.dismiss(),
        UiCommand::SelectBoard(index) => engine.select_board(index),
        UiCommand::UpdateCredential(field, value) => engine.update_credential(field, &value),
        UiCommand::Quit => engine.close_dialog(),
    }
}

/// Owns the engine thread. Dropping it stops the engine and releases the port.
pub struct EngineWorker {
    commands: Sender<UiCommand>,
    handle: Option<JoinHandle<()>>,
}

impl EngineWorker {
    /// Start the engine with `flow`, or the flow menu when `None`.
    pub fn spawn(mut engine: FlowEngine, flow: Option<FlowKind>) -> Self {
        let (commands, rx) = mpsc::channel::<UiCommand>();
        let handle = thread::spawn(move || {
            let started = match flow {
                Some(flow) => engine.run_flow(flow),
                None => engine.show_menu(),
            };
            if let Err(err) = started {
                log::error!("Failed to start the wizard: {}", err);
            }

            while let Ok(command) = rx.recv() {
                let quit = command == UiCommand::Quit;
                log::debug!("ui command: {:?}", command);
                if let Err(err) = dispatch(&mut engine, command) {
                    log::warn!("Ignored input: {}", err);
                }
                if quit {
                    break;
                }
            }

            if !engine.presentation().snapshot().closed {
                if let Err(err) = engine.close_dialog() {
                    log::warn!("Failed to close the wizard: {}", err);
                }
            }
        });
        Self {
            commands,
            handle: Some(handle),
        }
    }

    /// Queue a command. Returns false once the engine thread is gone.
    pub fn send(&self, command: UiCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.commands.send(UiCommand::Quit);
        if handle.join().is_err() {
            log::warn!("Engine thread panicked");
        }
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
