//! Light strip transports — trait + SPI (WS2812) and console backends.

use std::fmt;
use std::io::Write;

use crate::config::Config;
use crate::led::Color;

// ── Error type ──

/// Light strip transport errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* identifies the device path or operation and *details* describes
/// what went wrong.
#[derive(Debug)]
pub enum DeviceError {
    NotFound(String),
    PermissionDenied(String),
    OpenFailed(String),
    WriteFailed(String),
    Unsupported(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound(path) => write!(f, "Light strip not found: {path}"),
            DeviceError::PermissionDenied(path) => {
                write!(f, "Permission denied opening light strip: {path}")
            }
            DeviceError::OpenFailed(e) => write!(f, "Failed to open light strip: {e}"),
            DeviceError::WriteFailed(e) => write!(f, "Frame write failed: {e}"),
            DeviceError::Unsupported(e) => write!(f, "Unsupported light strip: {e}"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl DeviceError {
    /// Classify an I/O error raised while opening `path`.
    pub fn from_open_io(path: &str, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DeviceError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(path.to_string()),
            _ => DeviceError::OpenFailed(format!("{path}: {e}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Trait ──

/// A physical (or simulated) strip of addressable cells.
///
/// `write_frame` must transmit the whole frame in one transaction so that an
/// observer never sees a mix of two frames.
pub trait LightStrip {
    /// Human-readable transport name, e.g. the device path.
    fn name(&self) -> &str;
    /// Transmit one complete frame, cell 0 first.
    fn write_frame(&mut self, frame: &[Color]) -> Result<()>;
}

impl<T: LightStrip + ?Sized> LightStrip for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_frame(&mut self, frame: &[Color]) -> Result<()> {
        (**self).write_frame(frame)
    }
}

/// Transport selected by the `device` config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripKind {
    Spi,
    Console,
}

impl StripKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spi" => Some(StripKind::Spi),
            "console" => Some(StripKind::Console),
            _ => None,
        }
    }
}

impl fmt::Display for StripKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripKind::Spi => write!(f, "spi"),
            StripKind::Console => write!(f, "console"),
        }
    }
}

/// Open the strip transport named in `config`.
pub fn open_strip(config: &Config) -> Result<Box<dyn LightStrip>> {
    let kind = StripKind::parse(&config.device)
        .ok_or_else(|| DeviceError::Unsupported(format!("unknown device kind: {}", config.device)))?;
    log::debug!("[device] opening {kind} strip");
    match kind {
        StripKind::Spi => open_spi(&config.spi_path),
        StripKind::Console => Ok(Box::new(ConsoleStrip::stdout())),
    }
}

#[cfg(target_os = "linux")]
fn open_spi(path: &str) -> Result<Box<dyn LightStrip>> {
    Ok(Box::new(spi::SpiStrip::open(path)?))
}

#[cfg(not(target_os = "linux"))]
fn open_spi(path: &str) -> Result<Box<dyn LightStrip>> {
    Err(DeviceError::Unsupported(format!(
        "{path}: SPI output is only available on Linux"
    )))
}

/// Like [`open_strip`], but the transport is opened on first use and again
/// after any failed write, so a strip that is missing at startup or unplugged
/// later comes back on its own.
pub fn reopening_strip(
    config: &Config,
) -> ReopeningStrip<Box<dyn LightStrip>, impl FnMut() -> Result<Box<dyn LightStrip>>> {
    let config = config.clone();
    let label = match StripKind::parse(&config.device) {
        Some(StripKind::Spi) => format!("spi {}", config.spi_path),
        _ => config.device.trim().to_ascii_lowercase(),
    };
    ReopeningStrip::new(label, move || open_strip(&config))
}

// ── Reopening wrapper ──

/// Strip that (re)opens its transport lazily through `open`.
///
/// A failed open or write is returned to the caller as usual; the next
/// `write_frame` tries to open the transport again.
pub struct ReopeningStrip<S, F> {
    label: String,
    inner: Option<S>,
    open: F,
}

impl<S, F> ReopeningStrip<S, F>
where
    S: LightStrip,
    F: FnMut() -> Result<S>,
{
    pub fn new(label: impl Into<String>, open: F) -> Self {
        ReopeningStrip {
            label: label.into(),
            inner: None,
            open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Open the transport now if it is not already open.
    pub fn connect(&mut self) -> Result<&mut S> {
        let strip = match self.inner.take() {
            Some(strip) => strip,
            None => {
                let strip = (self.open)()?;
                log::info!("[device] {} opened", self.label);
                strip
            }
        };
        Ok(self.inner.insert(strip))
    }

    pub fn inner(&self) -> Option<&S> {
        self.inner.as_ref()
    }
}

impl<S, F> LightStrip for ReopeningStrip<S, F>
where
    S: LightStrip,
    F: FnMut() -> Result<S>,
{
    fn name(&self) -> &str {
        &self.label
    }

    fn write_frame(&mut self, frame: &[Color]) -> Result<()> {
        let strip = self.connect()?;
        if let Err(e) = strip.write_frame(frame) {
            log::debug!("[device] {} closed after failed write", self.label);
            self.inner = None;
            return Err(e);
        }
        Ok(())
    }
}

// ── WS2812 encoding ──

/// SPI clock for WS2812 encoding: three SPI bits per data bit gives the
/// 800 kHz data rate the strip expects.
pub const WS2812_SPI_HZ: u32 = 2_400_000;

/// Zero bytes appended after a frame. At 2.4 MHz this holds the line low for
/// ~320 µs, enough to latch both old (50 µs) and new (280 µs) WS2812 parts.
pub const WS2812_RESET_BYTES: usize = 96;

/// Largest strip a single spidev transfer can carry with the default 4 KiB
/// kernel buffer.
pub const MAX_SPI_CELLS: usize = (4096 - WS2812_RESET_BYTES) / 9;

/// Encode a frame as an SPI bit stream for WS2812 cells.
///
/// Each cell is sent GRB, MSB first; each data bit becomes `110` (one) or
/// `100` (zero).
pub fn encode_ws2812_spi(frame: &[Color]) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame.len() * 9 + WS2812_RESET_BYTES);
    for color in frame {
        for byte in [color.g, color.r, color.b] {
            let mut acc: u32 = 0;
            for bit in (0..8).rev() {
                acc = (acc << 3) | if (byte >> bit) & 1 == 1 { 0b110 } else { 0b100 };
            }
            out.extend_from_slice(&[(acc >> 16) as u8, (acc >> 8) as u8, acc as u8]);
        }
    }
    out.resize(out.len() + WS2812_RESET_BYTES, 0);
    out
}

// ── Linux spidev backend ──

#[cfg(target_os = "linux")]
mod spi {
    use std::io::Write;

    use spidev::{SpiModeFlags, Spidev, SpidevOptions};

    use super::{DeviceError, LightStrip, Result, WS2812_SPI_HZ, encode_ws2812_spi};
    use crate::led::Color;

    /// WS2812 strip on a Linux spidev node (MOSI pin, e.g. GPIO10 on a Pi).
    pub struct SpiStrip {
        path: String,
        spi: Spidev,
    }

    impl SpiStrip {
        pub fn open(path: &str) -> Result<Self> {
            let mut spi = Spidev::open(path).map_err(|e| DeviceError::from_open_io(path, e))?;
            let options = SpidevOptions::new()
                .bits_per_word(8)
                .max_speed_hz(WS2812_SPI_HZ)
                .mode(SpiModeFlags::SPI_MODE_0)
                .build();
            spi.configure(&options)
                .map_err(|e| DeviceError::OpenFailed(format!("{path}: configure: {e}")))?;
            log::info!("[device] SPI strip ready on {path}");
            Ok(SpiStrip {
                path: path.to_string(),
                spi,
            })
        }
    }

    impl LightStrip for SpiStrip {
        fn name(&self) -> &str {
            &self.path
        }

        fn write_frame(&mut self, frame: &[Color]) -> Result<()> {
            let buf = encode_ws2812_spi(frame);
            // One write() is one spidev transfer, so the frame goes out whole.
            let written = self
                .spi
                .write(&buf)
                .map_err(|e| DeviceError::WriteFailed(format!("{}: {e}", self.path)))?;
            if written != buf.len() {
                return Err(DeviceError::WriteFailed(format!(
                    "{}: short write ({written} of {} bytes)",
                    self.path,
                    buf.len()
                )));
            }
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
pub use spi::SpiStrip;

// ── Console backend ──

/// Renders frames as a row of 24-bit ANSI color blocks.
pub struct ConsoleStrip<W: Write> {
    out: W,
}

impl ConsoleStrip<std::io::Stdout> {
    pub fn stdout() -> Self {
        ConsoleStrip {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleStrip<W> {
    pub fn new(out: W) -> Self {
        ConsoleStrip { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Format one frame as a single console line.
pub fn format_console_frame(frame: &[Color]) -> String {
    let mut line = String::with_capacity(frame.len() * 24 + 8);
    line.push_str("  ");
    for c in frame {
        if c.is_off() {
            line.push('\u{25CB}');
        } else {
            line.push_str(&format!("\x1b[38;2;{};{};{}m\u{25CF}\x1b[0m", c.r, c.g, c.b));
        }
    }
    line.push('\n');
    line
}

impl<W: Write> LightStrip for ConsoleStrip<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn write_frame(&mut self, frame: &[Color]) -> Result<()> {
        let line = format_console_frame(frame);
        self.out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| DeviceError::WriteFailed(format!("console: {e}")))
    }
}

// ── Mock strip for testing ──

/// In-memory strip for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;

    /// Records every successfully written frame. Set `fail_writes` to make
    /// `write_frame` fail without recording.
    #[derive(Default)]
    pub struct MockStrip {
        pub frames: Vec<Vec<Color>>,
        pub fail_writes: bool,
        pub attempts: usize,
    }

    impl MockStrip {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn last_frame(&self) -> Option<&[Color]> {
            self.frames.last().map(Vec::as_slice)
        }
    }

    impl LightStrip for MockStrip {
        fn name(&self) -> &str {
            "mock"
        }

        fn write_frame(&mut self, frame: &[Color]) -> Result<()> {
            self.attempts += 1;
            if self.fail_writes {
                return Err(DeviceError::WriteFailed(
                    "mock: write failure injected".into(),
                ));
            }
            self.frames.push(frame.to_vec());
            Ok(())
        }
    }
}
