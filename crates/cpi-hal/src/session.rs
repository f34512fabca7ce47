//! Scoped ownership of the single serial connection.

use crate::chip::ChipFamily;
use crate::device::{FlashStub, Loader, SerialTransport};
use crate::{HalError, HalResult};

enum Handle {
    Rom(Box<dyn Loader>),
    Stub(Box<dyn FlashStub>),
}

/// RAII guard around an open device connection.
///
/// Exactly one session exists per flow. The port is released by [`close`]
/// or, failing that, when the guard is dropped, so every exit path of a flow
/// (success, cancel, error, panic unwinding) tears the connection down.
///
/// [`close`]: DeviceSession::close
pub struct DeviceSession {
    port: String,
    handle: Option<Handle>,
    chip_family: Option<ChipFamily>,
    chip_name: String,
    mac: [u8; 6],
}

impl DeviceSession {
    pub fn open(transport: &dyn SerialTransport) -> HalResult<Self> {
        let port = transport.describe();
        log::debug!("opening device session on {}", port);
        let loader = transport.connect()?;
        Ok(Self {
            port,
            handle: Some(Handle::Rom(loader)),
            chip_family: None,
            chip_name: String::new(),
            mac: [0; 6],
        })
    }

    pub fn initialize(&mut self) -> HalResult<()> {
        let loader = match self.handle.as_mut() {
            Some(Handle::Rom(loader)) => loader,
            Some(Handle::Stub(_)) => return Ok(()),
            None => return Err(HalError::NotConnected),
        };
        loader.initialize()?;
        self.chip_family = loader.chip_family();
        self.chip_name = loader.chip_name();
        self.mac = loader.mac_address();
        Ok(())
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn chip_family(&self) -> Option<ChipFamily> {
        self.chip_family
    }

    pub fn chip_name(&self) -> &str {
        &self.chip_name
    }

    pub fn mac_address(&self) -> [u8; 6] {
        self.mac
    }

    pub fn has_stub(&self) -> bool {
        matches!(self.handle, Some(Handle::Stub(_)))
    }

    /// Upload the stub. A no-op when it is already running.
    pub fn run_stub(&mut self) -> HalResult<()> {
        match self.handle.take() {
            Some(Handle::Rom(loader)) => {
                // On failure the loader has been consumed; the port is gone.
                let stub = loader.run_stub()?;
                self.handle = Some(Handle::Stub(stub));
                Ok(())
            }
            Some(stub @ Handle::Stub(_)) => {
                self.handle = Some(stub);
                Ok(())
            }
            None => Err(HalError::NotConnected),
        }
    }

    pub fn stub_mut(&mut self) -> HalResult<&mut (dyn FlashStub + 'static)> {
        match self.handle.as_mut() {
            Some(Handle::Stub(stub)) => Ok(stub.as_mut()),
            _ => Err(HalError::NotConnected),
        }
    }

    /// Release the connection now and report the disconnect result.
    pub fn close(mut self) -> HalResult<()> {
        self.release()
    }

    fn release(&mut self) -> HalResult<()> {
        let result = match self.handle.take() {
            Some(Handle::Rom(mut loader)) => loader.disconnect(),
            Some(Handle::Stub(mut stub)) => stub.disconnect(),
            None => Ok(()),
        };
        log::debug!("device session on {} released", self.port);
        result
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if let Err(err) = self.release() {
            log::warn!("device session failed to disconnect {}: {}", self.port, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_device::{FakeTransport, FailPoint, Operation};

    #[test]
    fn session_disconnects_on_drop() {
        let transport = FakeTransport::new(ChipFamily::Esp32S3);
        {
            let mut session = DeviceSession::open(&transport).unwrap();
            session.initialize().unwrap();
            assert!(transport.is_port_open());
        }
        assert!(!transport.is_port_open());
        assert!(transport
            .operations()
            .iter()
            .any(|op| matches!(op, Operation::Disconnect)));
    }

    #[test]
    fn close_releases_exactly_once() {
        let transport = FakeTransport::new(ChipFamily::Esp32S2);
        let mut session = DeviceSession::open(&transport).unwrap();
        session.initialize().unwrap();
        session.run_stub().unwrap();
        session.close().unwrap();

        let disconnects = transport
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::Disconnect))
            .count();
        assert_eq!(disconnects, 1);
        assert!(!transport.is_port_open());
    }

    #[test]
    fn stub_is_only_available_after_handoff() {
        let transport = FakeTransport::new(ChipFamily::Esp32C3);
        let mut session = DeviceSession::open(&transport).unwrap();
        session.initialize().unwrap();
        assert!(matches!(session.stub_mut(), Err(HalError::NotConnected)));
        session.run_stub().unwrap();
        assert!(session.has_stub());
        session.stub_mut().unwrap().erase_flash().unwrap();
    }

    #[test]
    fn failed_stub_upload_leaves_port_released() {
        let transport = FakeTransport::new(ChipFamily::Esp32S3).fail_at(FailPoint::RunStub);
        let mut session = DeviceSession::open(&transport).unwrap();
        session.initialize().unwrap();
        assert!(session.run_stub().is_err());
        drop(session);
        assert!(!transport.is_port_open());
        assert!(DeviceSession::open(&transport).is_ok());
    }

    #[test]
    fn initialize_reads_identity() {
        let transport = FakeTransport::new(ChipFamily::Esp32S2).with_chip_name("ESP32-S2FNR2");
        let mut session = DeviceSession::open(&transport).unwrap();
        session.initialize().unwrap();
        assert_eq!(session.chip_family(), Some(ChipFamily::Esp32S2));
        assert_eq!(session.chip_name(), "ESP32-S2FNR2");
    }
}
