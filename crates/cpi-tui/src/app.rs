//! Key handling for the wizard screen.
//!
//! The app only keeps what the engine does not: which button is selected,
//! the credential inputs being edited and whether the console is shown.

use crate::input::InputField;
use crate::worker::UiCommand;
use cpi_core::secrets::CredentialField;
use cpi_workflow::{ButtonAction, DialogId, Presentation, Surface};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq)]
pub enum InputResult {
    Continue,
    Command(UiCommand),
    ToggleConsole,
    Quit,
}

pub struct App {
    pub show_console: bool,
    /// Index into the current surface's buttons.
    selected: usize,
    shown: Option<DialogId>,
    fields: Vec<(CredentialField, InputField)>,
    /// Focused credential input; `fields.len()` means the button row.
    focus: usize,
}

fn is_secret(field: CredentialField) -> bool {
    matches!(
        field,
        CredentialField::NetworkPassword | CredentialField::WebWorkflowPassword
    )
}

fn is_forward(action: ButtonAction) -> bool {
    matches!(
        action,
        ButtonAction::Next
            | ButtonAction::Continue
            | ButtonAction::Connect
            | ButtonAction::Retry
            | ButtonAction::StartFlow(_)
    )
}

/// The button Enter should press on a freshly shown dialog.
fn default_button(surface: &Surface) -> usize {
    let enabled = || surface.buttons.iter().enumerate().filter(|(_, b)| b.enabled);
    enabled()
        .find(|(_, b)| is_forward(b.action))
        .or_else(|| enabled().next())
        .map_or(0, |(i, _)| i)
}

impl App {
    pub fn new(show_console: bool) -> Self {
        Self {
            show_console,
            selected: 0,
            shown: None,
            fields: Vec::new(),
            focus: 0,
        }
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn fields(&self) -> &[(CredentialField, InputField)] {
        &self.fields
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    /// True when keys go to the button row rather than a text input.
    pub fn buttons_focused(&self) -> bool {
        self.shown != Some(DialogId::Credentials) || self.focus >= self.fields.len()
    }

    /// Catch up with the dialog the engine is showing.
    pub fn sync(&mut self, surface: Option<&Surface>) {
        let Some(surface) = surface else {
            self.shown = None;
            return;
        };
        if self.shown != Some(surface.id) {
            self.shown = Some(surface.id);
            self.selected = default_button(surface);
            self.focus = 0;
            self.fields.clear();
            if surface.id == DialogId::Credentials {
                self.fields = surface
                    .fields
                    .iter()
                    .map(|view| {
                        let input = InputField::new(view.value.clone(), view.label);
                        let input = if is_secret(view.field) { input.secret() } else { input };
                        (view.field, input)
                    })
                    .collect();
            }
            return;
        }
        let still_usable = surface
            .buttons
            .get(self.selected)
            .is_some_and(|button| button.enabled);
        if !still_usable {
            self.selected = default_button(surface);
        }
    }

    pub fn handle_input(&mut self, key: KeyEvent, presentation: &Presentation) -> InputResult {
        self.sync(presentation.surface.as_ref());

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return if presentation.busy {
                InputResult::Continue
            } else {
                InputResult::Quit
            };
        }
        let Some(surface) = presentation.surface.as_ref() else {
            return match key.code {
                KeyCode::Char('q') | KeyCode::Esc => InputResult::Quit,
                _ => InputResult::Continue,
            };
        };
        if presentation.busy {
            return match key.code {
                KeyCode::Char('c') => self.toggle_console(),
                _ => InputResult::Continue,
            };
        }
        if !self.buttons_focused() {
            return self.edit_field(key);
        }

        match key.code {
            KeyCode::Esc => InputResult::Command(UiCommand::Dismiss),
            KeyCode::Left => {
                self.move_selection(surface, false);
                InputResult::Continue
            }
            KeyCode::Right | KeyCode::Tab => {
                self.move_selection(surface, true);
                InputResult::Continue
            }
            KeyCode::Up | KeyCode::BackTab if !self.fields.is_empty() => {
                self.focus = self.fields.len() - 1;
                InputResult::Continue
            }
            KeyCode::Enter | KeyCode::Char(' ') => match surface.buttons.get(self.selected) {
                Some(button) if button.enabled => {
                    InputResult::Command(UiCommand::Press(button.action))
                }
                _ => InputResult::Continue,
            },
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                self.pick(surface, index)
            }
            KeyCode::Char('c') => self.toggle_console(),
            KeyCode::Char('q') => InputResult::Quit,
            _ => InputResult::Continue,
        }
    }

    fn toggle_console(&mut self) -> InputResult {
        self.show_console = !self.show_console;
        InputResult::ToggleConsole
    }

    /// Number keys choose a flow on the menu and a board after a mismatch.
    fn pick(&mut self, surface: &Surface, index: usize) -> InputResult {
        match surface.id {
            DialogId::Menu => surface
                .buttons
                .iter()
                .filter(|b| matches!(b.action, ButtonAction::StartFlow(_)))
                .nth(index)
                .filter(|b| b.enabled)
                .map_or(InputResult::Continue, |b| {
                    InputResult::Command(UiCommand::Press(b.action))
                }),
            DialogId::BoardMismatch => InputResult::Command(UiCommand::SelectBoard(index)),
            _ => InputResult::Continue,
        }
    }

    fn move_selection(&mut self, surface: &Surface, forward: bool) {
        let count = surface.buttons.len();
        if count == 0 {
            return;
        }
        let mut index = self.selected;
        for _ in 0..count {
            index = if forward {
                (index + 1) % count
            } else {
                (index + count - 1) % count
            };
            if surface.buttons[index].enabled {
                self.selected = index;
                return;
            }
        }
    }

    fn edit_field(&mut self, key: KeyEvent) -> InputResult {
        match key.code {
            KeyCode::Esc => return InputResult::Command(UiCommand::Dismiss),
            KeyCode::Tab | KeyCode::Down | KeyCode::Enter => {
                self.focus += 1;
                return InputResult::Continue;
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = self.focus.saturating_sub(1);
                return InputResult::Continue;
            }
            _ => {}
        }
        let Some((field, input)) = self.fields.get_mut(self.focus) else {
            return InputResult::Continue;
        };
        let before = input.value().to_string();
        if !input.handle_key(key) || input.value() == before {
            return InputResult::Continue;
        }
        InputResult::Command(UiCommand::UpdateCredential(
            *field,
            input.value().to_string(),
        ))
    }
}
