//! Traits for the external flashing collaborator.
//!
//! The installer never speaks the ROM/stub protocol itself. A transport hands
//! out a [`Loader`] for a freshly opened port; the loader identifies the chip
//! and uploads the stub, yielding a [`FlashStub`] that can erase and write.

use crate::chip::ChipFamily;
use crate::HalResult;

/// Progress callback for long writes: `(bytes_written, total_bytes)`.
pub type ProgressFn<'a> = dyn FnMut(usize, usize) + 'a;

/// Options for one `flash_data` call. The default is a plain write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteFlags {
    /// Encrypt the image as it is written (flash encryption enabled boards).
    pub encrypt: bool,
}

/// Opens the serial port and returns a ROM-level handle.
pub trait SerialTransport: Send {
    /// Human readable port description for logs.
    fn describe(&self) -> String;

    fn connect(&self) -> HalResult<Box<dyn Loader>>;
}

/// ROM bootloader handle, valid until the stub is uploaded.
pub trait Loader: Send {
    /// Sync with the ROM and read chip identification.
    fn initialize(&mut self) -> HalResult<()>;

    fn chip_family(&self) -> Option<ChipFamily>;

    fn chip_name(&self) -> String;

    fn mac_address(&self) -> [u8; 6];

    /// Upload the stub and hand over a programming-capable handle.
    fn run_stub(self: Box<Self>) -> HalResult<Box<dyn FlashStub>>;

    /// Release the port without uploading the stub.
    fn disconnect(&mut self) -> HalResult<()>;
}

/// Stub handle with fast flash commands.
pub trait FlashStub: Send {
    fn erase_flash(&mut self) -> HalResult<()>;

    fn flash_data(
        &mut self,
        data: &[u8],
        progress: &mut ProgressFn<'_>,
        offset: u32,
        flags: WriteFlags,
    ) -> HalResult<()>;

    fn set_baudrate(&mut self, baud: u32) -> HalResult<()>;

    fn disconnect(&mut self) -> HalResult<()>;
}

/// Format a MAC address as `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
