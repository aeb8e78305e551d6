//! Line capture
//!
//! Drives a [`Session`] from a byte source: a serial port wired to the card's
//! I/O contact, or a raw dump replayed from disk.
//!
//! Speed changes requested by the session are applied to the source between
//! two bytes, so the UART follows PPS and specific-mode ATRs.

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{CaptureConfig, LineHandle, SessionConfig};
use crate::error::CaptureError;
use crate::packet::Packet;
use crate::session::{LineObserver, Session};

/// Modem status input wired to the card's RST contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetLine {
    /// Data Carrier Detect
    #[serde(alias = "dcd")]
    Cd,
    /// Data Set Ready
    Dsr,
    /// Clear To Send
    Cts,
    /// Ring Indicator
    Ri,
}

impl std::str::FromStr for ResetLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cd" | "dcd" => Ok(ResetLine::Cd),
            "dsr" => Ok(ResetLine::Dsr),
            "cts" => Ok(ResetLine::Cts),
            "ri" => Ok(ResetLine::Ri),
            other => Err(format!("unknown reset line '{}'", other)),
        }
    }
}

/// A byte stream whose speed can be changed
pub trait LineSource: Read {
    /// Reconfigure the receiver for a new baud rate
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;

    /// Level of the reset status input, `None` when not monitored
    fn reset_level(&mut self) -> io::Result<Option<bool>> {
        Ok(None)
    }

    /// Whether an empty read means the stream ended
    fn ends_on_empty_read(&self) -> bool {
        true
    }
}

/// Serial port attached to a card's I/O line
pub struct SerialLine {
    port: Box<dyn SerialPort>,
    reset_line: Option<ResetLine>,
}

impl SerialLine {
    /// Open and configure the port named by `config.session.line`.
    ///
    /// Characters are 8 data bits, even parity, and two stop bits to cover
    /// the guard time.
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let port = serialport::new(config.session.line.as_str(), config.session.base_baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::Even)
            .stop_bits(serialport::StopBits::Two)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        port.clear(serialport::ClearBuffer::All)?;
        tracing::info!(
            "Opened {} at {} baud",
            config.session.line,
            config.session.base_baud_rate
        );
        Ok(Self {
            port,
            reset_line: config.reset_line,
        })
    }
}

impl Read for SerialLine {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl LineSource for SerialLine {
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn reset_level(&mut self) -> io::Result<Option<bool>> {
        let Some(line) = self.reset_line else {
            return Ok(None);
        };
        let level = match line {
            ResetLine::Cd => self.port.read_carrier_detect(),
            ResetLine::Dsr => self.port.read_data_set_ready(),
            ResetLine::Cts => self.port.read_clear_to_send(),
            ResetLine::Ri => self.port.read_ring_indicator(),
        };
        level
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn ends_on_empty_read(&self) -> bool {
        false
    }
}

/// Raw line dump replayed from any reader
pub struct ReplaySource<R> {
    reader: R,
    baud_rates: Vec<u32>,
}

impl<R: Read> ReplaySource<R> {
    /// Wrap a reader holding raw line bytes
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            baud_rates: Vec::new(),
        }
    }

    /// Every baud rate requested during the replay, in order
    pub fn baud_rates(&self) -> &[u32] {
        &self.baud_rates
    }
}

impl<R: Read> Read for ReplaySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: Read> LineSource for ReplaySource<R> {
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        self.baud_rates.push(baud_rate);
        Ok(())
    }
}

/// Detects the rising edge of the reset input
#[derive(Debug, Clone, Default)]
pub struct ResetMonitor {
    last: Option<bool>,
}

impl ResetMonitor {
    /// Create a monitor with no previous sample
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample; true when the level went from low to high
    pub fn update(&mut self, level: bool) -> bool {
        let rising = self.last == Some(false) && level;
        self.last = Some(level);
        rising
    }
}

/// Observer forwarding packets and holding speed changes for the source
struct CaptureObserver<F> {
    on_packet: F,
    pending_baud: Option<u32>,
}

impl<F: FnMut(&Packet)> LineObserver for CaptureObserver<F> {
    fn packet_completed(&mut self, packet: &Packet) {
        (self.on_packet)(packet)
    }

    fn set_baud_rate(&mut self, _line: &LineHandle, baud_rate: u32) {
        self.pending_baud = Some(baud_rate);
    }
}

fn apply_pending_baud<S, F>(source: &mut S, session: &mut Session<CaptureObserver<F>>)
where
    S: LineSource,
    F: FnMut(&Packet),
{
    let Some(baud_rate) = session.observer_mut().pending_baud.take() else {
        return;
    };
    if let Err(e) = source.set_baud_rate(baud_rate) {
        tracing::warn!(
            line = %session.config().line,
            "Failed to set baud rate {}: {}",
            baud_rate,
            e
        );
    }
}

/// Decode `source` until it ends or `running` is cleared.
///
/// Every completed packet is passed to `on_packet`.
pub fn run<S, F>(
    source: &mut S,
    config: SessionConfig,
    on_packet: F,
    running: &AtomicBool,
) -> Result<(), CaptureError>
where
    S: LineSource,
    F: FnMut(&Packet),
{
    let observer = CaptureObserver {
        on_packet,
        pending_baud: None,
    };
    let mut session = Session::new(config, observer)?;
    apply_pending_baud(source, &mut session);

    let mut reset = ResetMonitor::new();
    let mut buf = [0u8; 256];
    while running.load(Ordering::SeqCst) {
        if let Some(level) = source.reset_level()? {
            if reset.update(level) {
                tracing::debug!(line = %session.config().line, "reset line released");
                session.reset();
                apply_pending_baud(source, &mut session);
            }
        }

        let n = match source.read(&mut buf) {
            Ok(0) if source.ends_on_empty_read() => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for byte in &buf[..n] {
            session.add_byte(*byte);
            apply_pending_baud(source, &mut session);
        }
    }
    Ok(())
}

/// Information about an available serial port
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,
    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,
    /// USB product ID (if USB device)
    pub pid: Option<u16>,
    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (Some(usb.vid), Some(usb.pid), usb.product),
            _ => (None, None, None),
        };
        Self {
            name: info.port_name,
            vid,
            pid,
            product,
        }
    }
}

/// USB serial adapters first, numerically, then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0, "ttyUSB"), (1, "ttyACM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (2, 0, basename.to_string())
}

/// List available serial ports in a stable order
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}
