use cpi_hal::HalError;
use thiserror::Error;

pub type InstallerResult<T> = std::result::Result<T, InstallerError>;

/// Guide listing supported boards and their install instructions.
pub const QUICK_START_LINK: &str =
    "https://learn.adafruit.com/circuitpython-with-esp32-quick-start/installing-circuitpython";

/// Installer failures, grouped the way they are surfaced to the user.
#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("{0}")]
    UnsupportedEnvironment(String),

    #[error("Connection Error, your board may be incompatible: {0}")]
    Connection(String),

    #[error("Oops, wrong board!\n- you selected: {selected_board}\n- you connected: {chip_name}")]
    BoardMismatch {
        selected_board: String,
        chip_name: String,
    },

    #[error(
        "Oops! This tool doesn't support your board, {chip_name} ({detected}). \
         The selected board expects {expected}."
    )]
    UnsupportedBoard {
        chip_name: String,
        detected: String,
        expected: String,
    },

    #[error("Oops, we lost connection to your board before completing the install. ({0})")]
    Disconnected(String),

    #[error("{0}")]
    CatalogLookup(String),

    #[error("No firmware file name {0} found in the zip!")]
    MissingBundleFile(String),

    #[error("{0}")]
    Fetch(String),

    #[error("Invalid firmware settings: {0}")]
    InvalidSettings(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Device error: {0}")]
    Device(#[from] HalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallerError {
    /// Classify a device failure by where it leaves the connection.
    pub fn from_device(err: HalError) -> Self {
        match err {
            HalError::Disconnected(msg) => InstallerError::Disconnected(msg),
            HalError::NotConnected => InstallerError::Disconnected(err.to_string()),
            HalError::PortBusy(_) | HalError::ConnectionFailed(_) => {
                InstallerError::Connection(err.to_string())
            }
            other => InstallerError::Device(other),
        }
    }

    /// Actionable advice shown together with the technical message.
    pub fn guidance(&self) -> String {
        match self {
            InstallerError::UnsupportedEnvironment(_) => "Install esptool (pip install esptool) \
                 and serve firmware over HTTPS or from localhost."
                .to_string(),
            InstallerError::Connection(detail)
            | InstallerError::Device(HalError::CommandFailed { stderr: detail, .. }) => {
                format!(
                    "Things to try:\n\
                     1. Reset your board and try again.\n\
                     \x20 - Look for a little black button near the power port.\n\
                     2. Restart the installer and try again.\n\
                     3. Make sure the port is not open in another program.\n\
                     4. Double-check your board type and serial port selection.\n\
                     5. Post on the Support Forum with this info:\n\n\
                     \"Firmware Tool: {}\"",
                    detail
                )
            }
            InstallerError::BoardMismatch { .. } => "You can:\n\
                 - select a compatible board from the list\n\
                 - connect a different board and click Connect again"
                .to_string(),
            InstallerError::UnsupportedBoard { .. } => format!(
                "Visit the quick-start guide ({}) for a list of supported boards and their install instructions.",
                QUICK_START_LINK
            ),
            InstallerError::Disconnected(_) => {
                "Please check your USB connection and click Connect again. \
                 Restart the installer if it becomes unresponsive."
                    .to_string()
            }
            InstallerError::CatalogLookup(_) | InstallerError::MissingBundleFile(_) => {
                "Check the board id and firmware URL, then try again.".to_string()
            }
            InstallerError::Fetch(_) => {
                "Check your network connection and the firmware URL, then try again.".to_string()
            }
            InstallerError::InvalidSettings(_) => {
                "The firmware catalog for this board is corrupt. Please report it.".to_string()
            }
            InstallerError::Configuration(_) => {
                "Check the command line flags and config file.".to_string()
            }
            InstallerError::Device(_) | InstallerError::Io(_) => {
                "Reset your board, check the cable and try again.".to_string()
            }
        }
    }

    /// Whether the error dialog should offer to retry from the connect step.
    pub fn allows_retry(&self) -> bool {
        matches!(
            self,
            InstallerError::Disconnected(_) | InstallerError::Connection(_)
        )
    }

    /// Technical message and guidance, as shown in the error dialog.
    pub fn user_message(&self) -> String {
        format!("{}\n\n{}", self, self.guidance())
    }
}
