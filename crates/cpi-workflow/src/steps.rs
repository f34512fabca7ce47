//! Step bodies: connect, erase, flash, copy, settings, success.

use crate::dialog::{DialogData, DialogId};
use crate::engine::{BoardChoice, FlowEngine, StepOutcome};
use crate::flow::StepKind;
use crate::state::{WizardError, WizardEvent};
use anyhow::Context;
use cpi_core::bundle::FirmwareBundle;
use cpi_core::catalog::{BoardFirmwareEntry, Catalog};
use cpi_core::secrets::populate_secrets_file;
use cpi_core::settings::{merge_settings, SECRETS_FILENAME};
use cpi_core::InstallerError;
use cpi_hal::{
    format_mac, negotiated_baud, ChipFamily, DeviceSession, FlashStub, WriteFlags,
    ESP32_BAUD_WARNING, ROM_BAUD,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

const UF2_CHUNK: usize = 64 * 1024;

/// Result of checking the connected chip against the selected board.
enum BoardCheck {
    Matched,
    Mismatch {
        chip_name: String,
        boards: Vec<BoardChoice>,
    },
}

fn percent_of(written: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((written as u64 * 100) / total as u64).min(100) as u8
}

fn not_connected() -> InstallerError {
    InstallerError::Disconnected("No device connected.".to_string())
}

impl FlowEngine {
    /// Open the port, identify the chip and hand over to the stub.
    ///
    /// On a chip mismatch with compatible boards in the catalog the session
    /// stays open and the mismatch dialog is shown instead of advancing.
    pub fn connect(&mut self) -> Result<(), WizardError> {
        if self.machine.state().is_busy() {
            return Err(WizardError::Busy);
        }
        if self.current_step() != Some(StepKind::SerialConnect) {
            return Err(WizardError::Unavailable("Connect".to_string()));
        }
        self.release_session();
        self.mismatch = None;

        match self.operation(|engine| engine.open_and_identify()) {
            Ok(BoardCheck::Matched) => self.hand_over_to_stub(),
            Ok(BoardCheck::Mismatch { chip_name, boards }) => {
                self.show_mismatch(chip_name, boards);
                Ok(())
            }
            Err(err) => {
                self.fail(err);
                Ok(())
            }
        }
    }

    /// Pick a board from the mismatch dialog and finish connecting.
    pub fn select_board(&mut self, index: usize) -> Result<(), WizardError> {
        let Some(choice) = self
            .mismatch
            .as_ref()
            .and_then(|boards| boards.get(index))
            .cloned()
        else {
            return Err(WizardError::Unavailable(format!("Board {}", index + 1)));
        };
        self.mismatch = None;
        self.console
            .info(&format!("Compatible board selected: {}", choice.name));
        self.config.board_id = Some(choice.id);
        self.config.board_name = choice.name;
        self.bundle = None;
        self.hand_over_to_stub()
    }

    fn hand_over_to_stub(&mut self) -> Result<(), WizardError> {
        match self.operation(|engine| engine.start_stub()) {
            Ok(()) => self.next_step(),
            Err(err) => {
                self.fail(err);
                Ok(())
            }
        }
    }

    fn open_and_identify(&mut self) -> Result<BoardCheck, InstallerError> {
        self.console
            .info(&format!("Connecting to {}...", self.transport.describe()));
        let mut session =
            DeviceSession::open(self.transport.as_ref()).map_err(InstallerError::from_device)?;
        session.initialize().map_err(InstallerError::from_device)?;

        let chip_name = session.chip_name().to_string();
        let detected = session.chip_family();
        self.console.info(&format!("Connected to {}", chip_name));
        self.console.info(&format!(
            "MAC Address: {}",
            format_mac(&session.mac_address())
        ));
        self.session = Some(session);

        let board_id = self.config.board_id.clone();
        let catalog = self.load_catalog()?;
        let entry = catalog.lookup(board_id.as_deref())?;
        if detected == Some(entry.chip_family) {
            return Ok(BoardCheck::Matched);
        }

        let expected = entry.chip_family;
        let boards: Vec<BoardChoice> = detected
            .map(|chip| {
                catalog
                    .compatible_with(chip)
                    .into_iter()
                    .map(BoardChoice::from)
                    .collect()
            })
            .unwrap_or_default();
        if boards.is_empty() {
            return Err(InstallerError::UnsupportedBoard {
                chip_name,
                detected: detected.map_or_else(|| "unknown chip".to_string(), |c| c.to_string()),
                expected: expected.to_string(),
            });
        }
        Ok(BoardCheck::Mismatch { chip_name, boards })
    }

    fn show_mismatch(&mut self, chip_name: String, boards: Vec<BoardChoice>) {
        let err = InstallerError::BoardMismatch {
            selected_board: self.config.board_name.clone(),
            chip_name,
        };
        self.console.error(&err.to_string());
        let data = DialogData {
            message: err.user_message(),
            boards: boards.iter().map(|b| b.name.clone()).collect(),
            ..self.base_data()
        };
        self.mismatch = Some(boards);
        self.render(DialogId::BoardMismatch, data);
    }

    fn start_stub(&mut self) -> Result<(), InstallerError> {
        let requested = self.config.baud;
        let session = self.session.as_mut().ok_or_else(not_connected)?;
        session.run_stub().map_err(InstallerError::from_device)?;
        let chip = session.chip_family();
        let baud = chip.and_then(|chip| negotiated_baud(chip, requested));
        if let Some(baud) = baud {
            session
                .stub_mut()
                .and_then(|stub| stub.set_baudrate(baud))
                .map_err(InstallerError::from_device)?;
        }

        self.console.info("Stub is running.");
        if chip == Some(ChipFamily::Esp32) && requested != ROM_BAUD {
            self.console.info(ESP32_BAUD_WARNING);
        }
        if let Some(baud) = baud {
            self.console.info(&format!("Changed baud rate to {}", baud));
        }
        Ok(())
    }

    pub(crate) fn load_catalog(&mut self) -> Result<&Catalog, InstallerError> {
        if self.catalog.is_none() {
            self.console.info("Loading firmware catalog...");
            let catalog = self.source.fetch_catalog()?;
            let version = catalog.version().ok_or_else(|| {
                InstallerError::InvalidSettings(format!(
                    "Firmware catalog has an invalid release version: {:?}",
                    catalog.semver
                ))
            })?;
            log::info!(
                "Firmware catalog {} lists {} boards",
                version,
                catalog.firmwares.len()
            );
            self.catalog = Some(catalog);
        }
        self.catalog
            .as_ref()
            .ok_or_else(|| InstallerError::Fetch("Firmware catalog unavailable.".to_string()))
    }

    /// The selected board's catalog entry and the release to install.
    fn selected_entry(&mut self) -> Result<(BoardFirmwareEntry, String), InstallerError> {
        let board_id = self.config.board_id.clone();
        let catalog = self.load_catalog()?;
        let entry = catalog.lookup(board_id.as_deref())?.clone();
        Ok((entry, catalog.semver.clone()))
    }

    fn bundle_mut(&mut self) -> Result<&mut FirmwareBundle, InstallerError> {
        let board_id = self
            .config
            .board_id
            .clone()
            .ok_or_else(|| InstallerError::CatalogLookup("No board selected.".to_string()))?;
        let cached = matches!(&self.bundle, Some((id, _)) if *id == board_id);
        if !cached {
            self.console.info("Fetching latest firmware...");
            let bytes = self.source.fetch_bundle(&board_id)?;
            self.console.info("Unzipping firmware bundle...");
            let bundle = FirmwareBundle::from_bytes(bytes)?;
            self.bundle = Some((board_id, bundle));
        }
        self.bundle
            .as_mut()
            .map(|(_, bundle)| bundle)
            .ok_or_else(|| InstallerError::Fetch("Firmware bundle unavailable.".to_string()))
    }

    fn stub(&mut self) -> Result<&mut (dyn FlashStub + 'static), InstallerError> {
        self.session
            .as_mut()
            .ok_or_else(not_connected)?
            .stub_mut()
            .map_err(InstallerError::from_device)
    }

    fn complete(&mut self, step: StepKind, data: DialogData) {
        self.completed.insert(step, data.clone());
        self.render(step.dialog(), data);
    }

    pub(crate) fn erase_all(&mut self) -> Result<StepOutcome, InstallerError> {
        let mut data = DialogData {
            percentage: Some(0),
            ..self.base_data()
        };
        self.render(DialogId::Erase, data.clone());
        self.operation(|engine| {
            engine.console.info("Erasing flash memory. Please wait...");
            let started = Instant::now();
            engine.stub()?.erase_flash().map_err(InstallerError::from_device)?;
            engine.console.info(&format!(
                "Finished. Took {} ms to erase.",
                started.elapsed().as_millis()
            ));
            Ok(())
        })?;
        data.percentage = Some(100);
        self.complete(StepKind::EraseAll, data);
        Ok(StepOutcome::Advance)
    }

    /// Write every structure entry of the selected board, in declared order.
    pub(crate) fn flash_structure(
        &mut self,
        step: StepKind,
    ) -> Result<StepOutcome, InstallerError> {
        let data = self.operation(|engine| engine.write_structure())?;
        self.complete(step, data);
        Ok(StepOutcome::Advance)
    }

    fn write_structure(&mut self) -> Result<DialogData, InstallerError> {
        let (entry, semver) = self.selected_entry()?;
        let merged = merge_settings(&entry)?;
        self.console.info(&format!(
            "Flashing with settings: {}",
            merged.describe(&semver)
        ));

        let plan = merged.flash_plan(&semver);
        let total = plan.len();
        let mut data = DialogData {
            percentage: Some(100),
            ..self.base_data()
        };
        for (i, write) in plan.iter().enumerate() {
            let contents = format!("{} ({}/{})", write.filename, i + 1, total);
            self.console.info(&format!("Flashing {}", contents));
            let (name, payload) = self.bundle_mut()?.get_firmware(&write.template)?;
            log::debug!("{} resolved to {} ({} bytes)", write.template, name, payload.len());

            data = DialogData {
                contents,
                percentage: Some(0),
                ..self.base_data()
            };
            self.write_with_progress(DialogId::Flash, &data, &payload, write.offset)?;
            data.percentage = Some(100);
        }
        Ok(data)
    }

    /// `flash_data` with the dialog percentage and console kept current.
    fn write_with_progress(
        &mut self,
        id: DialogId,
        data: &DialogData,
        payload: &[u8],
        offset: u32,
    ) -> Result<(), InstallerError> {
        let nav = self.nav();
        self.renderer.show_dialog(id, data, &nav);

        let stub = self
            .session
            .as_mut()
            .ok_or_else(not_connected)?
            .stub_mut()
            .map_err(InstallerError::from_device)?;
        let console = &mut self.console;
        let renderer = &mut self.renderer;
        let mut last_percent = 0;
        let mut progress = |written: usize, total: usize| {
            let percent = percent_of(written, total);
            if percent == last_percent {
                return;
            }
            last_percent = percent;
            console.info(&format!("{}% ({}/{})...", percent, written, total));
            let update = DialogData {
                percentage: Some(percent),
                ..data.clone()
            };
            renderer.show_dialog(id, &update, &nav);
        };
        stub.flash_data(payload, &mut progress, offset, WriteFlags::default())
            .map_err(InstallerError::from_device)
    }

    pub(crate) fn copy_uf2(&mut self) -> Result<StepOutcome, InstallerError> {
        let data = self.operation(|engine| engine.copy_uf2_to_drive())?;
        self.complete(StepKind::CopyUf2, data);
        Ok(StepOutcome::Advance)
    }

    fn copy_uf2_to_drive(&mut self) -> Result<DialogData, InstallerError> {
        let (entry, _) = self.selected_entry()?;
        let merged = merge_settings(&entry)?;
        let mut data = DialogData {
            percentage: Some(100),
            ..self.base_data()
        };
        let Some(template) = merged.uf2 else {
            self.console
                .info(&format!("{} has no .uf2 firmware, skipping copy.", entry.name));
            return Ok(data);
        };
        let drive = self.config.uf2_drive.clone().ok_or_else(|| {
            InstallerError::Configuration(
                "no UF2 drive configured, pass --uf2-drive with the board's mounted drive"
                    .to_string(),
            )
        })?;

        let (name, payload) = self.bundle_mut()?.get_firmware(&template)?;
        let file_name = name.rsplit('/').next().unwrap_or(&name).to_string();
        let target = drive.join(&file_name);
        data.uf2_file = file_name;
        data.percentage = Some(0);
        self.render(DialogId::CopyUf2, data.clone());
        self.console
            .info(&format!("Copying {} to {}", data.uf2_file, target.display()));

        let mut file = File::create(&target)?;
        let total = payload.len();
        let mut written = 0;
        let mut last_percent = 0;
        for chunk in payload.chunks(UF2_CHUNK) {
            file.write_all(chunk)?;
            written += chunk.len();
            let percent = percent_of(written, total);
            if percent != last_percent {
                last_percent = percent;
                data.percentage = Some(percent);
                self.render(DialogId::CopyUf2, data.clone());
            }
        }
        file.sync_all()?;
        data.percentage = Some(100);
        Ok(data)
    }

    pub(crate) fn write_settings(&mut self) -> Result<StepOutcome, InstallerError> {
        let data = self.operation(|engine| engine.write_settings_file())?;
        self.complete(StepKind::Settings, data);
        Ok(StepOutcome::Advance)
    }

    fn write_settings_file(&mut self) -> Result<DialogData, InstallerError> {
        let (entry, _) = self.selected_entry()?;
        let merged = merge_settings(&entry)?;
        let template = self.bundle_mut()?.get_file_text(&merged.secrets_path())?;
        let contents = populate_secrets_file(&template, &self.credentials)?;

        if let Some(dir) = self.config.state_dir.clone() {
            match save_secrets_copy(&dir, &contents) {
                Ok(path) => log::info!("Saved a copy of the settings to {}", path.display()),
                Err(err) => log::warn!("{:#}", err),
            }
        }

        self.console.info(&format!(
            "Writing {} at 0x{:x}",
            SECRETS_FILENAME, merged.offset
        ));
        let mut data = DialogData {
            percentage: Some(0),
            ..self.base_data()
        };
        self.write_with_progress(
            DialogId::GenerateSettings,
            &data,
            contents.as_bytes(),
            merged.offset,
        )?;
        data.percentage = Some(100);
        Ok(data)
    }

    /// End the flow: the device is released and the wizard goes back to
    /// idle, leaving the success dialog up until it is closed.
    pub(crate) fn finish(&mut self) {
        self.release_session();
        self.bundle = None;
        self.console
            .info("To run the new firmware, please reset your device.");
        if let Err(err) = self.machine.apply(WizardEvent::Finish) {
            log::warn!("finished outside the last step: {}", err);
        }
        self.completed.clear();
        let data = self.base_data();
        self.render(DialogId::Success, data);
    }
}

fn save_secrets_copy(dir: &Path, contents: &str) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
    let path = dir.join(SECRETS_FILENAME);
    fs::write(&path, contents)
        .with_context(|| format!("Failed to save settings copy: {}", path.display()))?;
    Ok(path)
}
