use anyhow::Context;
use clap::Parser;
use cpi_core::cli::{Cli, Command};
use cpi_core::config::InstallerConfig;
use cpi_core::demo::{demo_board_id, demo_source};
use cpi_core::environment::Environment;
use cpi_core::firmware_source::{FirmwareSource, HttpFirmwareSource};
use cpi_core::preferences::{Preferences, BAUDRATE};
use cpi_core::secrets::{populate_secrets_file, CredentialForm};
use cpi_hal::{ChipFamily, EsptoolTransport, FakeTransport, SerialTransport};
use cpi_workflow::{EngineConfig, FlowEngine, FlowKind};
use std::fs;
use std::path::PathBuf;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = InstallerConfig::from_cli(&cli).context("Invalid configuration")?;

    // The wizard owns the terminal, so its logs go to a file unless told otherwise.
    let interactive = cli.command.is_none() && !cli.dump_dialogs;
    let log_file = config
        .log_file
        .clone()
        .or_else(|| interactive.then(|| config.default_log_path()));
    cpi_core::logging::init_with(log_file.as_deref());

    if cli.dump_dialogs {
        for dump in cpi_tui::dump::dump_all_dialogs() {
            println!("{}", dump);
        }
        return Ok(());
    }

    match &cli.command {
        None => run_wizard(&config),
        Some(Command::Boards { chip }) => list_boards(&config, *chip),
        Some(Command::Secrets {
            template,
            ssid,
            password,
            web_workflow_password,
            brightness,
            output,
        }) => {
            let form = CredentialForm {
                network_ssid: ssid.clone(),
                network_password: password.clone(),
                web_workflow_password: web_workflow_password.clone(),
                status_pixel_brightness: brightness.clone().unwrap_or_default(),
            };
            write_secrets(template.as_ref(), &form, output.as_ref())
        }
    }
}

/// Device and firmware source the wizard runs against.
struct Backend {
    transport: Box<dyn SerialTransport>,
    source: Box<dyn FirmwareSource>,
    board_id: Option<String>,
}

fn backend(config: &InstallerConfig) -> anyhow::Result<Backend> {
    match config.simulate {
        Some(chip) => {
            log::info!("Simulating a {} board", chip);
            Ok(Backend {
                transport: Box::new(FakeTransport::new(chip)),
                source: Box::new(demo_source()?),
                board_id: config
                    .board_id
                    .clone()
                    .or_else(|| Some(demo_board_id(chip))),
            })
        }
        None => Ok(Backend {
            transport: Box::new(EsptoolTransport::new(
                config.esptool.clone(),
                config.port.clone(),
            )),
            source: Box::new(HttpFirmwareSource::from_config(config)?),
            board_id: config.board_id.clone(),
        }),
    }
}

fn run_wizard(config: &InstallerConfig) -> anyhow::Result<()> {
    let esptool = EsptoolTransport::new(config.esptool.clone(), config.port.clone());
    Environment::detect(config, || esptool.is_available()).ensure_supported()?;
    for problem in config.latent_misconfigurations() {
        log::warn!("Latent misconfiguration: {}", problem);
    }

    let mut preferences = Preferences::open(&config.preferences_path());
    let saved_baud: Option<u32> = preferences.load_setting(BAUDRATE, None);
    if let Some(baud) = config.baud {
        if let Err(err) = preferences.save_setting(BAUDRATE, baud) {
            log::warn!("Failed to save baud rate preference: {:#}", err);
        }
    }

    let backend = backend(config)?;
    let mut engine_config = EngineConfig::from_installer(config, saved_baud);
    engine_config.board_id = backend.board_id;
    log::info!(
        "Installing for {} ({}) at {} baud",
        engine_config.board_name,
        engine_config.board_id.as_deref().unwrap_or("no board id"),
        engine_config.baud
    );

    let engine = FlowEngine::new(engine_config, backend.transport, backend.source);
    let flow = config.flow.map(FlowKind::from);
    cpi_tui::run(engine, flow, &mut preferences)
}

fn list_boards(config: &InstallerConfig, chip: Option<ChipFamily>) -> anyhow::Result<()> {
    Environment::detect(config, || true).ensure_supported()?;
    let backend = backend(config)?;
    let catalog = backend
        .source
        .fetch_catalog()
        .context("Failed to load the firmware catalog")?;

    println!("CircuitPython {}", catalog.semver);
    let mut shown = 0;
    for entry in catalog
        .firmwares
        .iter()
        .filter(|entry| chip.map_or(true, |chip| entry.chip_family == chip))
    {
        println!(
            "{:<40} {:<10} {}",
            entry.id,
            entry.chip_family.name(),
            entry.name
        );
        shown += 1;
    }
    if shown == 0 {
        println!("No boards found.");
    }
    Ok(())
}

fn write_secrets(
    template: Option<&PathBuf>,
    form: &CredentialForm,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    if !form.is_ready() {
        anyhow::bail!("A WiFi network name and a web workflow password are required.");
    }
    let template = match template {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?,
        None => "{}".to_string(),
    };
    let contents = populate_secrets_file(&template, form)?;
    match output {
        Some(path) => {
            fs::write(path, &contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", contents),
    }
    Ok(())
}
