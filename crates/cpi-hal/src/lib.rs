//! Device layer for the CircuitPython installer.
//!
//! Everything that touches a board goes through the traits in [`device`], so
//! flows can be exercised against [`FakeTransport`] without hardware.

pub mod chip;
pub mod device;
pub mod error;
pub mod esptool;
pub mod fake_device;
pub mod session;

pub use chip::{negotiated_baud, ChipFamily, BAUD_RATES, ESP32_BAUD_WARNING, ROM_BAUD};
pub use device::{format_mac, FlashStub, Loader, ProgressFn, SerialTransport, WriteFlags};
pub use error::{HalError, HalResult};
pub use esptool::{EsptoolTransport, DEFAULT_ESPTOOL};
pub use fake_device::{FailPoint, FakeTransport, Operation};
pub use session::DeviceSession;
