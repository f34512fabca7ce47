//! Gate the installer on a usable serial tool and a trusted firmware origin.

use crate::config::InstallerConfig;
use crate::errors::{InstallerError, InstallerResult};
use url::Url;

pub const NOT_ALLOWED_MESSAGE: &str =
    "You can only install ESP devices on HTTPS websites or on the localhost.";

pub const UNSUPPORTED_MESSAGE: &str =
    "This system cannot run a serial flashing tool. Install esptool (pip install esptool) or pass --esptool.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub serial_supported: bool,
    pub secure_origin: bool,
}

impl Environment {
    /// Detect once at start. `esptool_available` is only consulted for real devices.
    pub fn detect(config: &InstallerConfig, esptool_available: impl FnOnce() -> bool) -> Self {
        let serial_supported = config.simulate.is_some() || esptool_available();
        let secure_origin = [config.firmware_url.as_ref(), config.catalog_url.as_ref()]
            .into_iter()
            .flatten()
            .all(is_secure_origin);
        Self {
            serial_supported,
            secure_origin,
        }
    }

    pub fn ensure_supported(&self) -> InstallerResult<()> {
        if !self.secure_origin {
            return Err(InstallerError::UnsupportedEnvironment(
                NOT_ALLOWED_MESSAGE.to_string(),
            ));
        }
        if !self.serial_supported {
            return Err(InstallerError::UnsupportedEnvironment(
                UNSUPPORTED_MESSAGE.to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTPS anywhere, or any scheme on the local machine.
pub fn is_secure_origin(url: &Url) -> bool {
    if url.scheme() == "https" {
        return true;
    }
    match url.host_str() {
        Some(host) => matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1"),
        None => url.scheme() == "file",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::FileConfig;
    use clap::Parser;

    fn config(args: &[&str]) -> InstallerConfig {
        let mut full = vec!["cpinstaller"];
        full.extend_from_slice(args);
        InstallerConfig::resolve(&Cli::try_parse_from(full).unwrap(), FileConfig::default())
            .unwrap()
    }

    #[test]
    fn origins() {
        assert!(is_secure_origin(&Url::parse("https://circuitpython.org/x").unwrap()));
        assert!(is_secure_origin(&Url::parse("http://localhost:8000/x").unwrap()));
        assert!(is_secure_origin(&Url::parse("http://127.0.0.1/x").unwrap()));
        assert!(!is_secure_origin(&Url::parse("http://example.com/x").unwrap()));
    }

    #[test]
    fn insecure_origin_wins_over_missing_tool() {
        let cfg = config(&["--firmware", "http://example.com/cp"]);
        let env = Environment::detect(&cfg, || false);
        match env.ensure_supported() {
            Err(InstallerError::UnsupportedEnvironment(msg)) => {
                assert_eq!(msg, NOT_ALLOWED_MESSAGE)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn simulation_does_not_need_esptool() {
        let cfg = config(&["--simulate", "esp32s3"]);
        let env = Environment::detect(&cfg, || panic!("esptool must not be looked up"));
        assert!(env.ensure_supported().is_ok());
    }

    #[test]
    fn missing_tool_is_unsupported() {
        let cfg = config(&["--firmware", "https://example.com/cp"]);
        let env = Environment::detect(&cfg, || false);
        assert!(matches!(
            env.ensure_supported(),
            Err(InstallerError::UnsupportedEnvironment(msg)) if msg == UNSUPPORTED_MESSAGE
        ));
    }
}
