//! Settings synthesizer: a board's catalog settings merged with the base file layout.

use crate::catalog::BoardFirmwareEntry;
use crate::errors::{InstallerError, InstallerResult};
use serde::Serialize;
use serde_json::json;

pub const SECRETS_FILENAME: &str = "secrets.json";
pub const ROOT_FOLDER: &str = "files";

/// Token in catalog filenames replaced by the release version.
pub const VERSION_TOKEN: &str = "VERSION";

/// A file generated on the host and written to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsFile {
    pub filename: String,
}

/// Base settings with a board's layout merged in, offsets parsed to integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedSettings {
    pub files: Vec<SettingsFile>,
    pub root_folder: String,
    pub offset: u32,
    /// `(offset, version-templated filename)` in declared order.
    pub structure: Vec<(u32, String)>,
    pub uf2: Option<String>,
}

/// One scheduled write of a bundle file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashWrite {
    pub offset: u32,
    /// Name as declared in the catalog, used to look the file up in the bundle.
    pub template: String,
    /// Name with `VERSION` substituted, for display.
    pub filename: String,
}

pub fn base_settings() -> (Vec<SettingsFile>, String) {
    (
        vec![SettingsFile {
            filename: SECRETS_FILENAME.to_string(),
        }],
        ROOT_FOLDER.to_string(),
    )
}

/// Merge a catalog entry over the base settings.
///
/// A bad hex offset means the catalog entry is corrupt and is reported as
/// [`InstallerError::InvalidSettings`].
pub fn merge_settings(entry: &BoardFirmwareEntry) -> InstallerResult<MergedSettings> {
    let (files, root_folder) = base_settings();
    let offset = parse_hex_offset(&entry.settings.offset).map_err(|e| {
        InstallerError::InvalidSettings(format!("{}: settings offset {}", entry.id, e))
    })?;
    let structure = entry
        .settings
        .structure
        .iter()
        .map(|(hex, filename)| {
            parse_hex_offset(hex)
                .map(|offset| (offset, filename.to_string()))
                .map_err(|e| {
                    InstallerError::InvalidSettings(format!("{}: structure key {}", entry.id, e))
                })
        })
        .collect::<InstallerResult<Vec<_>>>()?;

    Ok(MergedSettings {
        files,
        root_folder,
        offset,
        structure,
        uf2: entry.settings.uf2.clone(),
    })
}

/// Parse `0x1000` or `1000` as hexadecimal.
pub fn parse_hex_offset(text: &str) -> Result<u32, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(format!("'{}' is not a hex offset", text));
    }
    u32::from_str_radix(digits, 16).map_err(|_| format!("'{}' is not a hex offset", text))
}

pub fn substitute_version(template: &str, semver: &str) -> String {
    template.replace(VERSION_TOKEN, semver)
}

impl MergedSettings {
    /// One write per structure entry, in declared order.
    pub fn flash_plan(&self, semver: &str) -> Vec<FlashWrite> {
        self.structure
            .iter()
            .map(|(offset, template)| FlashWrite {
                offset: *offset,
                template: template.clone(),
                filename: substitute_version(template, semver),
            })
            .collect()
    }

    /// Path of the secrets template inside the bundle.
    pub fn secrets_path(&self) -> String {
        format!("{}/{}", self.root_folder, SECRETS_FILENAME)
    }

    /// Pretty JSON with every `VERSION` filled in, for the console.
    pub fn describe(&self, semver: &str) -> String {
        let structure: serde_json::Map<String, serde_json::Value> = self
            .structure
            .iter()
            .map(|(offset, filename)| (offset.to_string(), json!(filename)))
            .collect();
        let mut value = json!({
            "files": self.files,
            "rootFolder": self.root_folder,
            "offset": self.offset,
            "structure": structure,
        });
        if let (Some(uf2), Some(obj)) = (&self.uf2, value.as_object_mut()) {
            obj.insert("uf2".to_string(), json!(uf2));
        }
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        substitute_version(&text, semver)
    }
}
