//! Installer configuration: TOML file values overridden by command line flags.

use crate::cli::{Cli, FlowChoice};
use crate::errors::{InstallerError, InstallerResult};
use cpi_hal::{ChipFamily, DEFAULT_ESPTOOL, ROM_BAUD};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_BOARD_NAME: &str = "ESP32-based device";
pub const STATE_DIR_NAME: &str = ".cpinstaller";

/// Values accepted in the optional TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub board_name: Option<String>,
    pub board_id: Option<String>,
    pub firmware: Option<String>,
    pub catalog: Option<String>,
    pub port: Option<String>,
    pub baud: Option<u32>,
    pub flow: Option<FlowChoice>,
    pub esptool: Option<String>,
    pub uf2_drive: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> InstallerResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> InstallerResult<Self> {
        toml::from_str(text)
            .map_err(|e| InstallerError::Configuration(format!("invalid config file: {}", e)))
    }
}

/// Fully resolved configuration, read once at start.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    pub board_name: String,
    pub board_id: Option<String>,
    pub firmware_url: Option<Url>,
    pub catalog_url: Option<Url>,
    pub port: Option<String>,
    /// Rate requested on the command line or in the file, if any.
    pub baud: Option<u32>,
    pub flow: Option<FlowChoice>,
    pub simulate: Option<ChipFamily>,
    pub esptool: String,
    pub uf2_drive: Option<PathBuf>,
    pub state_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    /// Seconds allowed for each catalog or bundle download.
    pub fetch_timeout_secs: u64,
}

impl InstallerConfig {
    pub fn resolve(cli: &Cli, file: FileConfig) -> InstallerResult<Self> {
        let firmware = cli.firmware.clone().or(file.firmware);
        let firmware_url = firmware.as_deref().map(parse_url).transpose()?;
        let catalog = cli.catalog.clone().or(file.catalog);
        let catalog_url = match catalog.as_deref() {
            Some(raw) => Some(parse_url(raw)?),
            None => firmware_url
                .as_ref()
                .map(|base| join_url(base, "firmware.json"))
                .transpose()?,
        };

        let baud = cli.baud.or(file.baud);
        if let Some(baud) = baud {
            if !cpi_hal::BAUD_RATES.contains(&baud) {
                return Err(InstallerError::Configuration(format!(
                    "unsupported baud rate {} (allowed: {:?})",
                    baud,
                    cpi_hal::BAUD_RATES
                )));
            }
        }

        Ok(Self {
            board_name: cli
                .board_name
                .clone()
                .or(file.board_name)
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BOARD_NAME.to_string()),
            board_id: cli
                .board_id
                .clone()
                .or(file.board_id)
                .filter(|id| !id.trim().is_empty()),
            firmware_url,
            catalog_url,
            port: cli.port.clone().or(file.port),
            baud,
            flow: cli.flow.or(file.flow),
            simulate: cli.simulate,
            esptool: cli
                .esptool
                .clone()
                .or(file.esptool)
                .unwrap_or_else(|| DEFAULT_ESPTOOL.to_string()),
            uf2_drive: cli.uf2_drive.clone().or(file.uf2_drive),
            state_dir: cli
                .state_dir
                .clone()
                .or(file.state_dir)
                .unwrap_or_else(default_state_dir),
            log_file: cli.log_file.clone().or(file.log_file),
            fetch_timeout_secs: cli.fetch_timeout,
        })
    }

    /// Load the config file named on the command line (if any) and resolve.
    pub fn from_cli(cli: &Cli) -> InstallerResult<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Rate to use when none was requested.
    pub fn effective_baud(&self, saved: Option<u32>) -> u32 {
        self.baud
            .or(saved.filter(|b| cpi_hal::BAUD_RATES.contains(b)))
            .unwrap_or(ROM_BAUD)
    }

    /// Settings that are accepted at start but will fail once a step needs them.
    pub fn latent_misconfigurations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.board_id.is_none() {
            problems.push("no board id configured (--board-id)".to_string());
        }
        if self.firmware_url.is_none() && self.simulate.is_none() {
            problems.push("no firmware URL configured (--firmware)".to_string());
        }
        problems
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.state_dir.join("preferences.json")
    }

    pub fn default_log_path(&self) -> PathBuf {
        self.state_dir.join("cpinstaller.log")
    }
}

fn default_state_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR_NAME)
}

fn parse_url(raw: &str) -> InstallerResult<Url> {
    Url::parse(raw)
        .map_err(|e| InstallerError::Configuration(format!("invalid URL '{}': {}", raw, e)))
}

/// URL of the packaged bundle for a board under the firmware server.
pub fn bundle_url(firmware_url: &Url, board_id: &str) -> InstallerResult<Url> {
    join_url(firmware_url, &format!("releases/{}", board_id))
}

fn join_url(base: &Url, path: &str) -> InstallerResult<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
        .map_err(|e| InstallerError::Configuration(format!("invalid URL path '{}': {}", path, e)))
}
