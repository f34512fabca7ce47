//! Device backend that drives the `esptool` command line tool.
//!
//! Each protocol step is one esptool invocation against the same port. esptool
//! uploads its own stub per invocation, so the stub handoff only switches the
//! handle type; the port is never held open between steps.

use crate::chip::{ChipFamily, ROM_BAUD};
use crate::device::{FlashStub, Loader, ProgressFn, SerialTransport, WriteFlags};
use crate::{HalError, HalResult};
use std::io::{self, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

const CHIP_ID_TIMEOUT: Duration = Duration::from_secs(30);
const ERASE_TIMEOUT: Duration = Duration::from_secs(3 * 60);
const WRITE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_MAX_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Default esptool executable name.
pub const DEFAULT_ESPTOOL: &str = "esptool.py";

#[derive(Debug, Clone)]
struct Invocation {
    program: String,
    port: Option<String>,
    chip: Option<ChipFamily>,
    baud: u32,
}

impl Invocation {
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(chip) = self.chip {
            cmd.args(["--chip", chip.esptool_id()]);
        }
        if let Some(port) = &self.port {
            cmd.args(["--port", port]);
        }
        cmd.args(["--baud", &self.baud.to_string()]);
        cmd.args(["--before", "default_reset", "--after", "no_reset"]);
        cmd.args(args);
        cmd
    }

    fn run(&self, args: &[&str], timeout: Duration) -> HalResult<String> {
        let mut cmd = self.command(args);
        log::debug!("esptool: {} {:?}", self.program, args);
        let output = output_with_timeout(&self.program, &mut cmd, timeout)?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(
                &self.program,
                output.status.code(),
                &format!("{}{}", stdout, stderr),
            ));
        }
        Ok(stdout)
    }
}

/// Serial transport backed by an external esptool executable.
#[derive(Debug, Clone)]
pub struct EsptoolTransport {
    invocation: Invocation,
}

impl EsptoolTransport {
    pub fn new(program: impl Into<String>, port: Option<String>) -> Self {
        Self {
            invocation: Invocation {
                program: program.into(),
                port,
                chip: None,
                baud: ROM_BAUD,
            },
        }
    }

    /// Whether the configured executable can be launched at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.invocation.program)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }
}

impl SerialTransport for EsptoolTransport {
    fn describe(&self) -> String {
        match &self.invocation.port {
            Some(port) => port.clone(),
            None => "auto-detected serial port".to_string(),
        }
    }

    fn connect(&self) -> HalResult<Box<dyn Loader>> {
        Ok(Box::new(EsptoolLoader {
            invocation: self.invocation.clone(),
            chip_name: String::new(),
            mac: [0; 6],
        }))
    }
}

struct EsptoolLoader {
    invocation: Invocation,
    chip_name: String,
    mac: [u8; 6],
}

impl Loader for EsptoolLoader {
    fn initialize(&mut self) -> HalResult<()> {
        let stdout = self.invocation.run(&["chip_id"], CHIP_ID_TIMEOUT)?;
        let (chip_name, mac) = parse_chip_id_output(&stdout)?;
        log::info!("esptool detected {} ({})", chip_name, crate::format_mac(&mac));
        self.invocation.chip = ChipFamily::from_chip_name(&chip_name);
        self.chip_name = chip_name;
        self.mac = mac;
        Ok(())
    }

    fn chip_family(&self) -> Option<ChipFamily> {
        self.invocation.chip
    }

    fn chip_name(&self) -> String {
        self.chip_name.clone()
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }

    fn run_stub(self: Box<Self>) -> HalResult<Box<dyn FlashStub>> {
        if self.chip_name.is_empty() {
            return Err(HalError::NotConnected);
        }
        Ok(Box::new(EsptoolStub {
            invocation: self.invocation.clone(),
            connected: true,
        }))
    }

    fn disconnect(&mut self) -> HalResult<()> {
        Ok(())
    }
}

struct EsptoolStub {
    invocation: Invocation,
    connected: bool,
}

impl EsptoolStub {
    fn ensure_connected(&self) -> HalResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(HalError::NotConnected)
        }
    }
}

impl FlashStub for EsptoolStub {
    fn erase_flash(&mut self) -> HalResult<()> {
        self.ensure_connected()?;
        self.invocation.run(&["erase_flash"], ERASE_TIMEOUT)?;
        Ok(())
    }

    fn flash_data(
        &mut self,
        data: &[u8],
        progress: &mut ProgressFn<'_>,
        offset: u32,
        flags: WriteFlags,
    ) -> HalResult<()> {
        self.ensure_connected()?;
        let mut image = tempfile::NamedTempFile::new()?;
        image.write_all(data)?;
        image.flush()?;

        let owned = write_flash_args(offset, &image.path().display().to_string(), flags);
        let args: Vec<&str> = owned.iter().map(String::as_str).collect();
        let total = data.len();
        progress(0, total);
        let mut cmd = self.invocation.command(&args);
        log::debug!("esptool: {} {:?}", self.invocation.program, args);
        stream_with_timeout(&self.invocation.program, &mut cmd, |line| {
            if let Some(pct) = parse_write_progress(line) {
                progress(total * pct as usize / 100, total);
            }
        })?;
        progress(total, total);
        Ok(())
    }

    fn set_baudrate(&mut self, baud: u32) -> HalResult<()> {
        self.ensure_connected()?;
        self.invocation.baud = baud;
        Ok(())
    }

    fn disconnect(&mut self) -> HalResult<()> {
        self.connected = false;
        Ok(())
    }
}

fn write_flash_args(offset: u32, image: &str, flags: WriteFlags) -> Vec<String> {
    let mut args = vec![
        "write_flash".to_string(),
        "--flash_mode".to_string(),
        "keep".to_string(),
    ];
    if flags.encrypt {
        args.push("--encrypt".to_string());
    }
    args.push(format!("0x{:x}", offset));
    args.push(image.to_string());
    args
}

/// Extract the chip description and MAC from `esptool chip_id` output.
pub fn parse_chip_id_output(stdout: &str) -> HalResult<(String, [u8; 6])> {
    let mut chip = None;
    let mut mac = None;
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Chip is ") {
            let name = rest.split(" (").next().unwrap_or(rest).trim();
            chip = Some(name.to_string());
        } else if let Some(rest) = line.strip_prefix("MAC: ") {
            mac = Some(parse_mac(rest.trim())?);
        }
    }
    match (chip, mac) {
        (Some(chip), Some(mac)) => Ok((chip, mac)),
        (None, _) => Err(HalError::Parse("esptool output has no chip line".to_string())),
        (_, None) => Err(HalError::Parse("esptool output has no MAC line".to_string())),
    }
}

fn parse_mac(text: &str) -> HalResult<[u8; 6]> {
    let mut mac = [0u8; 6];
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 6 {
        return Err(HalError::Parse(format!("bad MAC address: {}", text)));
    }
    for (slot, part) in mac.iter_mut().zip(parts) {
        *slot = u8::from_str_radix(part, 16)
            .map_err(|_| HalError::Parse(format!("bad MAC address: {}", text)))?;
    }
    Ok(mac)
}

/// Percentage from a `Writing at 0x00010000... (42 %)` progress line.
pub fn parse_write_progress(line: &str) -> Option<u8> {
    let rest = line.trim().strip_prefix("Writing at ")?;
    let open = rest.rfind('(')?;
    let close = rest[open..].find('%')? + open;
    let pct: u8 = rest[open + 1..close].trim().parse().ok()?;
    (pct <= 100).then_some(pct)
}

/// Map an esptool failure onto the HAL error taxonomy.
pub fn classify_failure(program: &str, code: Option<i32>, output: &str) -> HalError {
    let lower = output.to_lowercase();
    let tail = output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string();
    if lower.contains("resource busy") || lower.contains("port is busy") {
        HalError::PortBusy(tail)
    } else if lower.contains("failed to connect") || lower.contains("could not open port") {
        HalError::ConnectionFailed(tail)
    } else if lower.contains("device not configured")
        || lower.contains("serial exception")
        || lower.contains("disconnected")
    {
        HalError::Disconnected(tail)
    } else {
        HalError::CommandFailed {
            program: program.to_string(),
            code,
            stderr: tail,
        }
    }
}

fn map_command_err(program: &str, err: io::Error) -> HalError {
    if err.kind() == io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

/// Kill and reap a child that is being abandoned.
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn output_with_timeout(program: &str, cmd: &mut Command, timeout: Duration) -> HalResult<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| map_command_err(program, e))?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    // Drain pipes concurrently to avoid deadlocks on large output.
    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout.take() {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr.take() {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let failure = match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            let stdout = stdout_handle.join().unwrap_or_default();
            let stderr = stderr_handle.join().unwrap_or_default();
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }
        Ok(None) => HalError::CommandTimeout {
            program: program.to_string(),
            timeout_secs: timeout.as_secs(),
        },
        Err(err) => HalError::Io(err),
    };
    reap(&mut child);
    let _ = stdout_handle.join();
    let _ = stderr_handle.join();
    Err(failure)
}

/// Run a command, feeding each stdout line (split on `\n` or `\r`) to `on_line`.
///
/// The child is killed and reaped on every error path.
fn stream_with_timeout(
    program: &str,
    cmd: &mut Command,
    mut on_line: impl FnMut(&str),
) -> HalResult<()> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| map_command_err(program, e))?;

    let stderr_handle = child.stderr.take().map(|stderr| {
        std::thread::spawn(move || {
            let mut s = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut s);
            s
        })
    });
    let lines = spawn_line_reader(&mut child);

    let mut collected = String::new();
    let outcome = wait_streaming(program, &mut child, &lines, |line| {
        on_line(line);
        collected.push_str(line);
        collected.push('\n');
    });
    let status = match outcome {
        Ok(status) => status,
        Err(err) => {
            reap(&mut child);
            if let Some(h) = stderr_handle {
                let _ = h.join();
            }
            return Err(err);
        }
    };

    let stderr_s = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    if !status.success() {
        collected.push_str(&stderr_s);
        return Err(classify_failure(program, status.code(), &collected));
    }
    Ok(())
}

fn spawn_line_reader(child: &mut Child) -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel::<io::Result<String>>();
    if let Some(stdout) = child.stdout.take() {
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                match reader.read(&mut byte) {
                    Ok(0) => break,
                    Ok(_) if byte[0] == b'\n' || byte[0] == b'\r' => {
                        if !line.is_empty() {
                            let text = String::from_utf8_lossy(&line).to_string();
                            line.clear();
                            if tx.send(Ok(text)).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(_) => line.push(byte[0]),
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            }
            if !line.is_empty() {
                let _ = tx.send(Ok(String::from_utf8_lossy(&line).to_string()));
            }
        });
    }
    rx
}

/// Pump output lines until stdout closes, then wait for the exit status.
fn wait_streaming(
    program: &str,
    child: &mut Child,
    lines: &mpsc::Receiver<io::Result<String>>,
    mut on_line: impl FnMut(&str),
) -> HalResult<ExitStatus> {
    let start = Instant::now();
    let mut last_output = Instant::now();
    loop {
        let timed_out = if start.elapsed() > WRITE_MAX_TIMEOUT {
            Some(WRITE_MAX_TIMEOUT)
        } else if last_output.elapsed() > WRITE_IDLE_TIMEOUT {
            Some(WRITE_IDLE_TIMEOUT)
        } else {
            None
        };
        if let Some(limit) = timed_out {
            return Err(HalError::CommandTimeout {
                program: program.to_string(),
                timeout_secs: limit.as_secs(),
            });
        }

        match lines.recv_timeout(Duration::from_millis(250)) {
            Ok(Ok(line)) => {
                last_output = Instant::now();
                on_line(&line);
            }
            Ok(Err(err)) => return Err(HalError::Io(err)),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    child
        .wait_timeout(Duration::from_secs(5))
        .map_err(HalError::Io)?
        .ok_or_else(|| HalError::CommandTimeout {
            program: program.to_string(),
            timeout_secs: 5,
        })
}
