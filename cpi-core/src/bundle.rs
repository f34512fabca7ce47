//! Firmware bundle resolver: the downloaded zip and version-templated lookups.

use crate::errors::{InstallerError, InstallerResult};
use crate::settings::VERSION_TOKEN;
use regex::Regex;
use std::io::{Cursor, Read, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_PREALLOC: usize = 4 * 1024 * 1024;

/// A downloaded bundle held in memory for the session.
pub struct FirmwareBundle {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    /// File entry names in archive order.
    names: Vec<String>,
}

impl std::fmt::Debug for FirmwareBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareBundle")
            .field("names", &self.names)
            .finish()
    }
}

impl FirmwareBundle {
    pub fn from_bytes(bytes: Vec<u8>) -> InstallerResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| InstallerError::Fetch(format!("Firmware bundle is not a zip: {}", e)))?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| InstallerError::Fetch(format!("Corrupt firmware bundle: {}", e)))?;
            if !entry.is_dir() {
                names.push(entry.name().to_string());
            }
        }
        Ok(Self { archive, names })
    }

    /// First entry matching `template`, where `VERSION` matches anything.
    ///
    /// Entries are tried in archive order, so when several versions of the
    /// same file are bundled the first one listed wins.
    pub fn find_in_zip(&self, template: &str) -> Option<&str> {
        let pattern = template_pattern(template)?;
        self.names
            .iter()
            .find(|name| pattern.is_match(name))
            .map(String::as_str)
    }

    /// Materialize the bytes of a named entry.
    pub fn read_entry(&mut self, name: &str) -> InstallerResult<Vec<u8>> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|_| InstallerError::MissingBundleFile(name.to_string()))?;
        let declared = usize::try_from(entry.size()).unwrap_or(MAX_PREALLOC);
        let mut data = Vec::with_capacity(declared.min(MAX_PREALLOC));
        entry.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Resolve `template` and return the concrete entry name and its bytes.
    pub fn get_firmware(&mut self, template: &str) -> InstallerResult<(String, Vec<u8>)> {
        let name = self
            .find_in_zip(template)
            .map(str::to_string)
            .ok_or_else(|| InstallerError::MissingBundleFile(template.to_string()))?;
        let data = self.read_entry(&name)?;
        Ok((name, data))
    }

    pub fn get_file_text(&mut self, template: &str) -> InstallerResult<String> {
        let (name, data) = self.get_firmware(template)?;
        String::from_utf8(data)
            .map_err(|_| InstallerError::InvalidSettings(format!("{} is not UTF-8 text", name)))
    }
}

/// Anchored at the end, optionally preceded by directories.
fn template_pattern(template: &str) -> Option<Regex> {
    let body = template
        .split(VERSION_TOKEN)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?:^|/){}$", body)).ok()
}

/// Build an uncompressed zip from `(name, bytes)` pairs, in order.
pub fn write_bundle(entries: &[(&str, &[u8])]) -> InstallerResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in entries {
        writer
            .start_file(*name, options)
            .map_err(|e| InstallerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        writer.write_all(data)?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| InstallerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(cursor.into_inner())
}
