use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SHOW_CONSOLE: &str = "showConsole";
pub const BAUDRATE: &str = "baudrate";

/// Small JSON key/value store for user preferences.
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    values: Map<String, Value>,
}

impl Preferences {
    /// Open the store. A missing or unreadable file starts empty.
    pub fn open(path: &Path) -> Self {
        let values = fs::read_to_string(path)
            .ok()
            .and_then(|text| match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(values) => Some(values),
                Err(err) => {
                    log::warn!("Ignoring corrupt preferences {}: {}", path.display(), err);
                    None
                }
            })
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    pub fn load_setting<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.values
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(default)
    }

    pub fn save_setting<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).context("Failed to serialize preference")?;
        self.values.insert(key.to_string(), value);
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        save_atomic(&self.path, &self.values)
    }
}

fn save_atomic(path: &Path, values: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create preferences directory: {}", parent.display())
        })?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(values).context("Failed to serialize preferences")?;
    let mut file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
    file.write_all(payload.as_bytes())
        .context("Failed to write preferences")?;
    file.sync_all().context("Failed to flush preferences")?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace preferences: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn settings_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("preferences.json");
        let mut prefs = Preferences::open(&path);
        assert!(!prefs.load_setting(SHOW_CONSOLE, false));
        prefs.save_setting(SHOW_CONSOLE, true).unwrap();
        prefs.save_setting(BAUDRATE, 921_600u32).unwrap();

        let reopened = Preferences::open(&path);
        assert!(reopened.load_setting(SHOW_CONSOLE, false));
        assert_eq!(reopened.load_setting(BAUDRATE, 115_200u32), 921_600);
    }

    #[test]
    fn wrong_type_or_corrupt_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, "{\"showConsole\": \"yes\"}").unwrap();
        assert!(!Preferences::open(&path).load_setting(SHOW_CONSOLE, false));

        fs::write(&path, "not json").unwrap();
        assert_eq!(Preferences::open(&path).load_setting(BAUDRATE, 115_200u32), 115_200);
    }
}
