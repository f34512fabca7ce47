//! Where the catalog and bundles come from.

use crate::catalog::Catalog;
use crate::config::{bundle_url, InstallerConfig};
use crate::errors::{InstallerError, InstallerResult};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub trait FirmwareSource: Send {
    fn fetch_catalog(&self) -> InstallerResult<Catalog>;

    /// Raw zip bytes of a board's packaged bundle.
    fn fetch_bundle(&self, board_id: &str) -> InstallerResult<Vec<u8>>;
}

fn create_http_client(timeout_secs: u64) -> InstallerResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("cpinstaller")
        .build()
        .map_err(|e| InstallerError::Fetch(e.to_string()))
}

/// Fetches from the firmware server over HTTP(S).
pub struct HttpFirmwareSource {
    client: Client,
    catalog_url: Option<Url>,
    firmware_url: Option<Url>,
}

impl HttpFirmwareSource {
    pub fn new(
        catalog_url: Option<Url>,
        firmware_url: Option<Url>,
        timeout_secs: u64,
    ) -> InstallerResult<Self> {
        Ok(Self {
            client: create_http_client(timeout_secs)?,
            catalog_url,
            firmware_url,
        })
    }

    /// Source for the configured firmware server.
    pub fn from_config(config: &InstallerConfig) -> InstallerResult<Self> {
        Self::new(
            config.catalog_url.clone(),
            config.firmware_url.clone(),
            config.fetch_timeout_secs,
        )
    }

    fn get(&self, url: &Url, accept: &str) -> InstallerResult<Vec<u8>> {
        log::info!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, accept)
            .send()
            .map_err(|e| InstallerError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::Fetch(format!(
                "Failed to fetch {}: HTTP {}",
                url, status
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| InstallerError::Fetch(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl FirmwareSource for HttpFirmwareSource {
    fn fetch_catalog(&self) -> InstallerResult<Catalog> {
        let url = self.catalog_url.as_ref().ok_or_else(|| {
            InstallerError::CatalogLookup("No firmware catalog URL configured.".to_string())
        })?;
        let body = self.get(url, "application/json")?;
        let text = String::from_utf8(body)
            .map_err(|_| InstallerError::Fetch("Firmware catalog is not UTF-8".to_string()))?;
        Catalog::from_json(&text)
    }

    fn fetch_bundle(&self, board_id: &str) -> InstallerResult<Vec<u8>> {
        let base = self.firmware_url.as_ref().ok_or_else(|| {
            InstallerError::CatalogLookup("No firmware URL configured.".to_string())
        })?;
        let url = bundle_url(base, board_id)?;
        self.get(&url, "application/octet-stream")
    }
}

/// Serves a fixed catalog and bundles from memory.
#[derive(Debug, Clone)]
pub struct StaticFirmwareSource {
    catalog: Catalog,
    bundles: HashMap<String, Vec<u8>>,
}

impl StaticFirmwareSource {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            bundles: HashMap::new(),
        }
    }

    pub fn with_bundle(mut self, board_id: &str, bytes: Vec<u8>) -> Self {
        self.bundles.insert(board_id.to_string(), bytes);
        self
    }
}

impl FirmwareSource for StaticFirmwareSource {
    fn fetch_catalog(&self) -> InstallerResult<Catalog> {
        Ok(self.catalog.clone())
    }

    fn fetch_bundle(&self, board_id: &str) -> InstallerResult<Vec<u8>> {
        self.bundles.get(board_id).cloned().ok_or_else(|| {
            InstallerError::Fetch(format!("Failed to fetch bundle for {}: HTTP 404", board_id))
        })
    }
}
