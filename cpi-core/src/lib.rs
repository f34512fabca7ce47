//! Core library for the CircuitPython ESP32 installer.
//!
//! Configuration, the error taxonomy, the firmware catalog, settings and
//! secrets synthesis, and the bundle resolver. Device access lives in
//! `cpi-hal`; the wizard itself in `cpi-workflow`.

pub mod bundle;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod demo;
pub mod environment;
pub mod errors;
pub mod firmware_source;
pub mod logging;
pub mod preferences;
pub mod secrets;
pub mod settings;

pub use errors::{InstallerError, InstallerResult};
