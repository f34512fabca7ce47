//! CLI argument parsing for the installer
//!
//! Runs the interactive wizard when no subcommand is provided.

use crate::firmware_source::DEFAULT_TIMEOUT_SECS;
use clap::{Parser, Subcommand, ValueEnum};
use cpi_hal::{ChipFamily, BAUD_RATES};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowChoice {
    /// Erase and install a single combined .bin image
    Bin,
    /// Erase, install the bootloader, copy the .uf2 and write WiFi settings
    Uf2,
    /// Erase and install the bootloader only
    Bootloader,
    /// Only write new WiFi credentials
    Settings,
}

impl std::fmt::Display for FlowChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowChoice::Bin => write!(f, "bin"),
            FlowChoice::Uf2 => write!(f, "uf2"),
            FlowChoice::Bootloader => write!(f, "bootloader"),
            FlowChoice::Settings => write!(f, "settings"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cpinstaller")]
#[command(about = "CircuitPython installer for ESP32-family boards")]
#[command(long_about = "CircuitPython installer for ESP32-family boards\n\n\
    Flashes CircuitPython onto an ESP32 board over a serial port and writes its WiFi settings.\n\n\
    Run without a subcommand to launch the interactive wizard.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Board display name shown in the wizard
    #[arg(long, global = true)]
    pub board_name: Option<String>,

    /// Board identifier in the firmware catalog (e.g. adafruit_feather_esp32s3)
    #[arg(long, global = true)]
    pub board_id: Option<String>,

    /// Base URL of the firmware server
    #[arg(long, global = true)]
    pub firmware: Option<String>,

    /// Catalog URL (defaults to <firmware>/firmware.json)
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    /// Serial port of the board (esptool auto-detects when omitted)
    #[arg(long, global = true)]
    pub port: Option<String>,

    /// Baud rate to switch to after the stub is running
    #[arg(long, global = true, value_parser = parse_baud)]
    pub baud: Option<u32>,

    /// Run this flow directly instead of showing the menu
    #[arg(long, value_enum, global = true)]
    pub flow: Option<FlowChoice>,

    /// Use a simulated board of this chip family instead of a serial port
    #[arg(long, global = true, value_parser = parse_chip)]
    pub simulate: Option<ChipFamily>,

    /// esptool program to run
    #[arg(long, env = "CPI_ESPTOOL", global = true)]
    pub esptool: Option<String>,

    /// Mounted UF2 bootloader drive to copy the .uf2 onto
    #[arg(long, global = true)]
    pub uf2_drive: Option<PathBuf>,

    /// Directory for preferences, logs and generated secrets
    #[arg(long, env = "CPI_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Seconds to wait for each catalog or bundle download
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub fetch_timeout: u64,

    /// Print every dialog rendered with sample data and exit
    #[arg(long, global = true)]
    pub dump_dialogs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List boards in the firmware catalog
    Boards {
        /// Only show boards for this chip family
        #[arg(long, value_parser = parse_chip)]
        chip: Option<ChipFamily>,
    },

    /// Generate a secrets.json from a template without touching a board
    Secrets {
        /// Template file (an empty object is used when omitted)
        #[arg(long)]
        template: Option<PathBuf>,

        /// WiFi network name
        #[arg(long)]
        ssid: String,

        /// WiFi password (may be empty for open networks)
        #[arg(long, default_value = "")]
        password: String,

        /// Web workflow password
        #[arg(long)]
        web_workflow_password: String,

        /// Status pixel brightness (0.0 - 1.0)
        #[arg(long)]
        brightness: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn parse_chip(value: &str) -> Result<ChipFamily, String> {
    ChipFamily::from_chip_name(value).ok_or_else(|| {
        let known: Vec<&str> = ChipFamily::all().iter().map(|c| c.name()).collect();
        format!("unknown chip family '{}' (known: {})", value, known.join(", "))
    })
}

pub fn parse_baud(value: &str) -> Result<u32, String> {
    let baud: u32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(format!("baud rate must be one of {:?}", BAUD_RATES))
    }
}
