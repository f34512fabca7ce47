//! Fake device backend for testing.
//!
//! Records every protocol operation without touching a serial port, so flows
//! can be exercised in CI and in `--simulate` mode.

use crate::chip::ChipFamily;
use crate::device::{FlashStub, Loader, ProgressFn, SerialTransport, WriteFlags};
use crate::{HalError, HalResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Initialize,
    RunStub,
    SetBaudrate { baud: u32 },
    EraseFlash,
    FlashData {
        offset: u32,
        data: Vec<u8>,
        flags: WriteFlags,
    },
    Disconnect,
}

/// Where an injected failure fires. Each injected failure fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Connect,
    Initialize,
    RunStub,
    SetBaudrate,
    EraseFlash,
    /// Drop the connection part way through a write.
    FlashData,
}

#[derive(Debug)]
struct FakeDeviceState {
    operations: Vec<Operation>,
    port_open: bool,
    chip: ChipFamily,
    chip_name: String,
    mac: [u8; 6],
    fail_at: Option<FailPoint>,
    chunk_size: usize,
}

/// Fake serial transport that hands out recording loaders.
#[derive(Debug, Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeDeviceState>>,
}

impl FakeTransport {
    pub fn new(chip: ChipFamily) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeDeviceState {
                operations: Vec::new(),
                port_open: false,
                chip,
                chip_name: chip.name().to_string(),
                mac: [0x7c, 0xdf, 0xa1, 0x00, 0x0b, 0x42],
                fail_at: None,
                chunk_size: 0x4000,
            })),
        }
    }

    pub fn with_chip_name(self, name: &str) -> Self {
        lock(&self.state).chip_name = name.to_string();
        self
    }

    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        lock(&self.state).chunk_size = chunk_size.max(1);
        self
    }

    pub fn fail_at(self, point: FailPoint) -> Self {
        self.inject_failure(point);
        self
    }

    /// Arm a one-shot failure on an already shared transport.
    pub fn inject_failure(&self, point: FailPoint) {
        lock(&self.state).fail_at = Some(point);
    }

    /// Swap the attached board, as if the user plugged in another one.
    pub fn set_chip(&self, chip: ChipFamily) {
        let mut state = lock(&self.state);
        state.chip = chip;
        state.chip_name = chip.name().to_string();
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        lock(&self.state).operations.clone()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        lock(&self.state).operations.iter().any(check)
    }

    /// Count recorded operations matching `check`.
    pub fn count_operations(&self, check: impl Fn(&Operation) -> bool) -> usize {
        lock(&self.state).operations.iter().filter(|op| check(op)).count()
    }

    /// Clear all recorded operations.
    pub fn clear(&self) {
        lock(&self.state).operations.clear();
    }

    pub fn is_port_open(&self) -> bool {
        lock(&self.state).port_open
    }

    /// Bytes written at `offset` by the last matching write, if any.
    pub fn written_at(&self, offset: u32) -> Option<Vec<u8>> {
        lock(&self.state)
            .operations
            .iter()
            .rev()
            .find_map(|op| match op {
                Operation::FlashData { offset: o, data, .. } if *o == offset => Some(data.clone()),
                _ => None,
            })
    }
}

impl SerialTransport for FakeTransport {
    fn describe(&self) -> String {
        "simulated serial port".to_string()
    }

    fn connect(&self) -> HalResult<Box<dyn Loader>> {
        let mut state = lock(&self.state);
        if state.port_open {
            return Err(HalError::PortBusy("simulated serial port".to_string()));
        }
        trip(&mut state, FailPoint::Connect, || {
            HalError::ConnectionFailed("simulated open failure".to_string())
        })?;
        state.port_open = true;
        state.operations.push(Operation::Connect);
        drop(state);
        Ok(Box::new(FakeLoader {
            state: Arc::clone(&self.state),
            initialized: false,
            released: false,
        }))
    }
}

struct FakeLoader {
    state: Arc<Mutex<FakeDeviceState>>,
    initialized: bool,
    released: bool,
}

impl Loader for FakeLoader {
    fn initialize(&mut self) -> HalResult<()> {
        let mut state = lock(&self.state);
        trip(&mut state, FailPoint::Initialize, || {
            HalError::ConnectionFailed("Failed to connect with the device".to_string())
        })?;
        state.operations.push(Operation::Initialize);
        self.initialized = true;
        Ok(())
    }

    fn chip_family(&self) -> Option<ChipFamily> {
        let state = lock(&self.state);
        ChipFamily::from_chip_name(&state.chip_name).or(Some(state.chip))
    }

    fn chip_name(&self) -> String {
        lock(&self.state).chip_name.clone()
    }

    fn mac_address(&self) -> [u8; 6] {
        lock(&self.state).mac
    }

    fn run_stub(mut self: Box<Self>) -> HalResult<Box<dyn FlashStub>> {
        if !self.initialized {
            return Err(HalError::NotConnected);
        }
        let mut state = lock(&self.state);
        if let Err(err) = trip(&mut state, FailPoint::RunStub, || {
            HalError::Disconnected("stub upload interrupted".to_string())
        }) {
            state.port_open = false;
            drop(state);
            self.released = true;
            return Err(err);
        }
        state.operations.push(Operation::RunStub);
        drop(state);
        self.released = true;
        Ok(Box::new(FakeStub {
            state: Arc::clone(&self.state),
            released: false,
        }))
    }

    fn disconnect(&mut self) -> HalResult<()> {
        release(&self.state, &mut self.released);
        Ok(())
    }
}

impl Drop for FakeLoader {
    fn drop(&mut self) {
        release(&self.state, &mut self.released);
    }
}

struct FakeStub {
    state: Arc<Mutex<FakeDeviceState>>,
    released: bool,
}

impl FakeStub {
    fn ensure_open(&self) -> HalResult<()> {
        if self.released {
            Err(HalError::NotConnected)
        } else {
            Ok(())
        }
    }
}

impl FlashStub for FakeStub {
    fn erase_flash(&mut self) -> HalResult<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        trip(&mut state, FailPoint::EraseFlash, || {
            HalError::Disconnected("device stopped responding during erase".to_string())
        })?;
        state.operations.push(Operation::EraseFlash);
        Ok(())
    }

    fn flash_data(
        &mut self,
        data: &[u8],
        progress: &mut ProgressFn<'_>,
        offset: u32,
        flags: WriteFlags,
    ) -> HalResult<()> {
        self.ensure_open()?;
        let total = data.len();
        let (chunk_size, fail) = {
            let mut state = lock(&self.state);
            let fail = trip(&mut state, FailPoint::FlashData, || {
                HalError::Disconnected("device disconnected".to_string())
            });
            (state.chunk_size, fail)
        };

        let mut written = 0;
        progress(0, total);
        while written < total {
            written = (written + chunk_size).min(total);
            progress(written, total);
            if fail.is_err() && written < total {
                return fail;
            }
        }
        fail?;

        lock(&self.state).operations.push(Operation::FlashData {
            offset,
            data: data.to_vec(),
            flags,
        });
        Ok(())
    }

    fn set_baudrate(&mut self, baud: u32) -> HalResult<()> {
        self.ensure_open()?;
        let mut state = lock(&self.state);
        trip(&mut state, FailPoint::SetBaudrate, || {
            HalError::UnsupportedBaudRate(baud)
        })?;
        state.operations.push(Operation::SetBaudrate { baud });
        Ok(())
    }

    fn disconnect(&mut self) -> HalResult<()> {
        release(&self.state, &mut self.released);
        Ok(())
    }
}

impl Drop for FakeStub {
    fn drop(&mut self) {
        release(&self.state, &mut self.released);
    }
}

fn lock(state: &Mutex<FakeDeviceState>) -> MutexGuard<'_, FakeDeviceState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn trip(
    state: &mut FakeDeviceState,
    point: FailPoint,
    error: impl FnOnce() -> HalError,
) -> HalResult<()> {
    if state.fail_at == Some(point) {
        state.fail_at = None;
        log::debug!("fake device: injected failure at {:?}", point);
        return Err(error());
    }
    Ok(())
}

fn release(state: &Mutex<FakeDeviceState>, released: &mut bool) {
    if *released {
        return;
    }
    *released = true;
    let mut state = lock(state);
    state.port_open = false;
    state.operations.push(Operation::Disconnect);
}
