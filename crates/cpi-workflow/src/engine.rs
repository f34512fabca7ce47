//! Flow engine: runs a flow's steps, owns the device session for the flow,
//! and routes every failure to the error dialog.

use crate::console::ConsoleLog;
use crate::dialog::{ButtonAction, DialogData, DialogId, FieldView, NavContext};
use crate::flow::{FlowKind, StepKind};
use crate::presentation::{PresentationHandle, Surface};
use crate::renderer::DialogRenderer;
use crate::state::{WizardError, WizardEvent, WizardMachine, WizardState};
use cpi_core::bundle::FirmwareBundle;
use cpi_core::catalog::{BoardFirmwareEntry, Catalog};
use cpi_core::config::InstallerConfig;
use cpi_core::firmware_source::FirmwareSource;
use cpi_core::secrets::{CredentialField, CredentialForm};
use cpi_core::InstallerError;
use cpi_hal::{DeviceSession, SerialTransport, ROM_BAUD};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The settings a flow runs with, resolved from the installer config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub board_name: String,
    pub board_id: Option<String>,
    pub baud: u32,
    pub uf2_drive: Option<PathBuf>,
    /// Where a copy of the generated secrets file is kept, if anywhere.
    pub state_dir: Option<PathBuf>,
}

impl EngineConfig {
    pub fn new(board_name: &str, board_id: Option<&str>) -> Self {
        Self {
            board_name: board_name.to_string(),
            board_id: board_id.map(str::to_string),
            baud: ROM_BAUD,
            uf2_drive: None,
            state_dir: None,
        }
    }

    pub fn from_installer(config: &InstallerConfig, saved_baud: Option<u32>) -> Self {
        Self {
            board_name: config.board_name.clone(),
            board_id: config.board_id.clone(),
            baud: config.effective_baud(saved_baud),
            uf2_drive: config.uf2_drive.clone(),
            state_dir: Some(config.state_dir.clone()),
        }
    }
}

/// A catalog board offered after a chip mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardChoice {
    pub id: String,
    pub name: String,
}

impl From<&BoardFirmwareEntry> for BoardChoice {
    fn from(entry: &BoardFirmwareEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
        }
    }
}

pub(crate) enum StepOutcome {
    /// Wait for the user.
    Stay,
    /// Move on to the next step without user input.
    Advance,
}

pub struct FlowEngine {
    pub(crate) config: EngineConfig,
    pub(crate) transport: Box<dyn SerialTransport>,
    pub(crate) source: Box<dyn FirmwareSource>,
    pub(crate) machine: WizardMachine,
    pub(crate) renderer: DialogRenderer,
    pub(crate) console: ConsoleLog,
    pub(crate) presentation: PresentationHandle,
    pub(crate) session: Option<DeviceSession>,
    pub(crate) catalog: Option<Catalog>,
    /// Bundle downloaded for the board id it is keyed by.
    pub(crate) bundle: Option<(String, FirmwareBundle)>,
    pub(crate) credentials: CredentialForm,
    /// Operation steps done in this attempt, with the dialog data they ended on.
    pub(crate) completed: BTreeMap<StepKind, DialogData>,
    pub(crate) mismatch: Option<Vec<BoardChoice>>,
    pub(crate) retry_allowed: bool,
}

impl FlowEngine {
    pub fn new(
        config: EngineConfig,
        transport: Box<dyn SerialTransport>,
        source: Box<dyn FirmwareSource>,
    ) -> Self {
        let presentation = PresentationHandle::new();
        Self {
            config,
            transport,
            source,
            machine: WizardMachine::new(),
            renderer: DialogRenderer::new(presentation.clone()),
            console: ConsoleLog::new(presentation.clone()),
            presentation,
            session: None,
            catalog: None,
            bundle: None,
            credentials: CredentialForm::default(),
            completed: BTreeMap::new(),
            mismatch: None,
            retry_allowed: false,
        }
    }

    pub fn presentation(&self) -> PresentationHandle {
        self.presentation.clone()
    }

    pub fn state(&self) -> WizardState {
        self.machine.state()
    }

    pub fn current_step(&self) -> Option<StepKind> {
        self.machine.state().current_step()
    }

    pub fn renderer(&self) -> &DialogRenderer {
        &self.renderer
    }

    pub fn current_surface(&self) -> Option<&Surface> {
        self.renderer.current()
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }

    pub fn credentials(&self) -> &CredentialForm {
        &self.credentials
    }

    pub fn board_id(&self) -> Option<&str> {
        self.config.board_id.as_deref()
    }

    pub fn board_name(&self) -> &str {
        &self.config.board_name
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Show the flow menu. Only valid while no flow is running.
    pub fn show_menu(&mut self) -> Result<(), WizardError> {
        match self.machine.state() {
            WizardState::Idle | WizardState::Failed { .. } => {}
            WizardState::Busy { .. } => return Err(WizardError::Busy),
            WizardState::Active { flow, .. } => {
                return Err(WizardError::FlowAlreadyRunning(flow));
            }
        }
        let data = self.base_data();
        self.render(DialogId::Menu, data);
        Ok(())
    }

    /// Start `flow` at its first step.
    pub fn run_flow(&mut self, flow: FlowKind) -> Result<(), WizardError> {
        self.machine.apply(WizardEvent::Start(flow))?;
        log::info!("Starting flow: {}", flow);
        self.reset_attempt();
        self.enter_current_step();
        Ok(())
    }

    /// Advance one step. A no-op without a flow or on the last step.
    pub fn next_step(&mut self) -> Result<(), WizardError> {
        self.move_by(WizardEvent::Advance)
    }

    /// Go back one step. A no-op without a flow or on the first step.
    pub fn prev_step(&mut self) -> Result<(), WizardError> {
        self.move_by(WizardEvent::Retreat)
    }

    /// Go straight to step `index` of the running flow.
    pub fn jump_to(&mut self, index: usize) -> Result<(), WizardError> {
        self.move_by(WizardEvent::Jump(index))
    }

    fn move_by(&mut self, event: WizardEvent) -> Result<(), WizardError> {
        let before = self.machine.state();
        let after = self.machine.apply(event)?;
        if after != before {
            self.enter_current_step();
        }
        Ok(())
    }

    /// Restart the failed flow from the connect step.
    pub fn retry(&mut self) -> Result<(), WizardError> {
        if !self.retry_allowed {
            return Err(WizardError::Unavailable("Retry".to_string()));
        }
        self.machine.apply(WizardEvent::Restart)?;
        self.reset_attempt();
        self.enter_current_step();
        Ok(())
    }

    /// Close the wizard, releasing the device. Refused mid-operation.
    pub fn close_dialog(&mut self) -> Result<(), WizardError> {
        self.machine.apply(WizardEvent::Close)?;
        self.release_session();
        self.reset_attempt();
        self.bundle = None;
        self.renderer.close_dialog();
        self.presentation.set_closed();
        Ok(())
    }

    /// The dismiss affordance: close, but only where the dialog allows it.
    pub fn dismiss(&mut self) -> Result<(), WizardError> {
        if self.machine.state().is_busy() {
            return Err(WizardError::Busy);
        }
        if self.renderer.current().is_some_and(|surface| !surface.closeable) {
            return Err(WizardError::NotCloseable);
        }
        self.close_dialog()
    }

    /// Press a button on the current dialog. Disabled or absent buttons are refused.
    pub fn press_button(&mut self, action: ButtonAction) -> Result<(), WizardError> {
        let Some(button) = self.renderer.current().and_then(|s| s.button(action)) else {
            return Err(WizardError::Unavailable(format!("{:?}", action)));
        };
        if !button.enabled {
            return Err(WizardError::Unavailable(button.label.to_string()));
        }
        match action {
            ButtonAction::Previous => self.prev_step(),
            ButtonAction::Next | ButtonAction::Continue => self.next_step(),
            ButtonAction::Close | ButtonAction::Cancel => self.close_dialog(),
            ButtonAction::Connect => self.connect(),
            ButtonAction::Retry => self.retry(),
            ButtonAction::StartFlow(flow) => self.run_flow(flow),
        }
    }

    /// Store a credentials form value and refresh the dialog.
    pub fn update_credential(
        &mut self,
        field: CredentialField,
        value: &str,
    ) -> Result<(), WizardError> {
        if self.current_step() != Some(StepKind::Credentials) {
            return Err(WizardError::Unavailable(field.label().to_string()));
        }
        self.credentials.set(field, value);
        let data = self.step_data(StepKind::Credentials);
        self.render(DialogId::Credentials, data);
        Ok(())
    }

    pub(crate) fn enter_current_step(&mut self) {
        loop {
            let Some(step) = self.current_step() else {
                return;
            };
            log::debug!("entering step {}", step);
            match self.run_step(step) {
                Ok(StepOutcome::Stay) => return,
                Ok(StepOutcome::Advance) => {
                    let before = self.machine.state();
                    match self.machine.apply(WizardEvent::Advance) {
                        Ok(after) if after != before => continue,
                        Ok(_) => return,
                        Err(err) => {
                            log::warn!("cannot advance past {}: {}", step, err);
                            return;
                        }
                    }
                }
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
        }
    }

    fn run_step(&mut self, step: StepKind) -> Result<StepOutcome, InstallerError> {
        if let Some(data) = self.completed.get(&step).cloned() {
            self.render(step.dialog(), data);
            return Ok(StepOutcome::Stay);
        }
        match step {
            StepKind::SerialConnect | StepKind::Confirm | StepKind::Credentials => {
                let data = self.step_data(step);
                self.render(step.dialog(), data);
                Ok(StepOutcome::Stay)
            }
            StepKind::EraseAll => self.erase_all(),
            StepKind::FlashBin | StepKind::Bootloader => self.flash_structure(step),
            StepKind::CopyUf2 => self.copy_uf2(),
            StepKind::Settings => self.write_settings(),
            StepKind::Success => {
                self.finish();
                Ok(StepOutcome::Stay)
            }
        }
    }

    /// Run `body` as the current step's device operation.
    pub(crate) fn operation<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, InstallerError>,
    ) -> Result<T, InstallerError> {
        if let Err(err) = self.machine.apply(WizardEvent::BeginOperation) {
            log::warn!("operation started outside a step: {}", err);
        }
        self.presentation.set_busy(true);
        let result = body(self);
        self.presentation.set_busy(false);
        if result.is_ok() {
            if let Err(err) = self.machine.apply(WizardEvent::EndOperation) {
                log::warn!("operation finished outside a step: {}", err);
            }
        }
        result
    }

    /// Tear the session down, then show the error dialog.
    pub(crate) fn fail(&mut self, err: InstallerError) {
        self.release_session();
        self.bundle = None;
        self.mismatch = None;
        self.retry_allowed = err.allows_retry();
        self.console.error(&err.to_string());
        if let Err(transition) = self.machine.apply(WizardEvent::Fail) {
            log::warn!("failure outside a flow: {}", transition);
        }
        self.presentation.set_busy(false);
        let data = DialogData {
            message: err.user_message(),
            ..self.base_data()
        };
        self.render(DialogId::Error, data);
    }

    pub(crate) fn release_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let port = session.port().to_string();
        match session.close() {
            Ok(()) => log::info!("Disconnected from {}", port),
            Err(err) => log::warn!("Failed to disconnect from {}: {}", port, err),
        }
    }

    fn reset_attempt(&mut self) {
        self.completed.clear();
        self.mismatch = None;
        self.retry_allowed = false;
    }

    pub(crate) fn base_data(&self) -> DialogData {
        DialogData {
            board_name: self.config.board_name.clone(),
            ..DialogData::default()
        }
    }

    pub(crate) fn step_data(&self, step: StepKind) -> DialogData {
        let mut data = self.base_data();
        if step == StepKind::Credentials {
            data.fields = CredentialField::editable()
                .iter()
                .map(|field| FieldView {
                    field: *field,
                    label: field.label(),
                    value: self.credentials.get(*field).to_string(),
                })
                .collect();
        }
        data
    }

    fn step_ready(&self, step: StepKind) -> bool {
        match step {
            StepKind::SerialConnect => {
                self.mismatch.is_none() && self.session.as_ref().is_some_and(|s| s.has_stub())
            }
            StepKind::Credentials => self.credentials.is_ready(),
            step if step.is_operation() => self.completed.contains_key(&step),
            _ => true,
        }
    }

    pub(crate) fn nav(&self) -> NavContext {
        let state = self.machine.state();
        let mut nav = NavContext {
            retry_allowed: self.retry_allowed,
            busy: state.is_busy(),
            ..NavContext::default()
        };
        if let Some((flow, index)) = state.position() {
            nav.step = index;
            nav.flow_len = flow.step_count();
            nav.step_ready = flow.step(index).is_some_and(|step| self.step_ready(step));
        }
        nav
    }

    pub(crate) fn render(&mut self, id: DialogId, data: DialogData) {
        let nav = self.nav();
        self.renderer.show_dialog(id, &data, &nav);
    }
}
