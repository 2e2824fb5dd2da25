//! Screen size discovery.
//!
//! The size comes from one of two places:
//!
//! 1. The OS (`ioctl(TIOCGWINSZ)`), through a [`SizeQuery`].
//! 2. The terminal itself: the cursor is pushed to the bottom-right corner
//!    with `CSI 999 C` / `CSI 999 B` (both clamp at the screen edge), then a
//!    cursor position report is requested with `CSI 6 n`. The reply is
//!    `CSI <rows> ; <cols> R`.
//!
//! There is no default size. If neither source gives a usable answer the
//! probe fails.

use std::io::{self, Read, Write};

use crossterm::cursor::{MoveDown, MoveRight};
use crossterm::queue;
use tracing::{debug, info};

use crate::error::GeometryError;

/// Request a cursor position report (DSR 6).
const CURSOR_REPORT_REQUEST: &[u8] = b"\x1b[6n";

/// Far enough that any real terminal clamps it.
const EDGE_DISTANCE: u16 = 999;

/// Upper bound on the reply, terminator included.
const REPORT_CAPACITY: usize = 32;

/// Usable size of the display, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub rows: u16,
    pub columns: u16,
}

impl ScreenGeometry {
    /// Both dimensions must be at least 1.
    pub fn new(rows: u16, columns: u16) -> Result<Self, GeometryError> {
        if rows == 0 || columns == 0 {
            return Err(GeometryError::Degenerate { rows, columns });
        }
        Ok(Self { rows, columns })
    }
}

/// Which source the probe consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeometryStrategy {
    /// OS query, escape-sequence round-trip if that fails.
    #[default]
    Auto,
    /// OS query only.
    Direct,
    /// Escape-sequence round-trip only.
    Fallback,
}

impl GeometryStrategy {
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "direct" | "ioctl" => Some(Self::Direct),
            "fallback" | "escape" => Some(Self::Fallback),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Direct => "direct",
            Self::Fallback => "fallback",
        }
    }
}

/// Asks the OS for the window size.
pub trait SizeQuery {
    /// Returns `(rows, columns)`.
    fn window_size(&self) -> io::Result<(u16, u16)>;
}

/// `ioctl(TIOCGWINSZ)` on a terminal descriptor.
#[cfg(unix)]
pub struct WinsizeQuery {
    fd: std::os::fd::OwnedFd,
}

#[cfg(unix)]
impl WinsizeQuery {
    pub fn new(fd: std::os::fd::OwnedFd) -> Self {
        Self { fd }
    }
}

#[cfg(unix)]
impl SizeQuery for WinsizeQuery {
    fn window_size(&self) -> io::Result<(u16, u16)> {
        use std::os::fd::AsRawFd;

        let mut ws = libc::winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: TIOCGWINSZ writes a `winsize` into the pointer we pass.
        if unsafe { libc::ioctl(self.fd.as_raw_fd(), libc::TIOCGWINSZ, &mut ws) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok((ws.ws_row, ws.ws_col))
    }
}

pub struct GeometryProbe<Q> {
    strategy: GeometryStrategy,
    query: Q,
}

impl<Q: SizeQuery> GeometryProbe<Q> {
    pub fn new(strategy: GeometryStrategy, query: Q) -> Self {
        Self { strategy, query }
    }

    pub fn strategy(&self) -> GeometryStrategy {
        self.strategy
    }

    /// Determine the screen size. `input` and `output` must be the terminal
    /// streams; they are only touched by the escape-sequence path.
    pub fn probe<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<ScreenGeometry, GeometryError> {
        let geometry = match self.strategy {
            GeometryStrategy::Direct => self.direct()?,
            GeometryStrategy::Fallback => self.fallback(input, output)?,
            GeometryStrategy::Auto => match self.direct() {
                Ok(geometry) => geometry,
                Err(e) => {
                    debug!("direct size query failed ({}), asking the terminal", e);
                    self.fallback(input, output)?
                }
            },
        };

        info!(
            "screen geometry: {}x{} (strategy: {})",
            geometry.columns,
            geometry.rows,
            self.strategy.name()
        );
        Ok(geometry)
    }

    fn direct(&self) -> Result<ScreenGeometry, GeometryError> {
        let (rows, columns) = self
            .query
            .window_size()
            .map_err(GeometryError::Unavailable)?;
        ScreenGeometry::new(rows, columns)
    }

    fn fallback<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<ScreenGeometry, GeometryError> {
        let mut to_corner = Vec::with_capacity(12);
        queue!(to_corner, MoveRight(EDGE_DISTANCE), MoveDown(EDGE_DISTANCE))
            .map_err(GeometryError::Write)?;

        write_once(output, &to_corner)?;
        write_once(output, CURSOR_REPORT_REQUEST)?;

        let report = read_report(input)?;
        debug!("cursor position report: {:?}", String::from_utf8_lossy(&report));
        parse_cursor_report(&report)
    }
}

/// One write call whose length must match. A short write is an error, not
/// something to resume.
fn write_once<W: Write>(output: &mut W, bytes: &[u8]) -> Result<(), GeometryError> {
    let written = loop {
        match output.write(bytes) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(GeometryError::Write(e)),
        }
    };
    if written != bytes.len() {
        return Err(GeometryError::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }
    output.flush().map_err(GeometryError::Write)
}

/// Collect the reply up to (not including) `R`. Stops early when a read
/// comes back empty or the buffer is full.
fn read_report<R: Read>(input: &mut R) -> Result<Vec<u8>, GeometryError> {
    let mut report = Vec::with_capacity(REPORT_CAPACITY);
    let mut byte = [0u8; 1];

    while report.len() < REPORT_CAPACITY - 1 {
        match input.read(&mut byte) {
            Ok(1) => {}
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                break
            }
            Err(e) => return Err(GeometryError::Read(e)),
        }
        if byte[0] == b'R' {
            break;
        }
        report.push(byte[0]);
    }

    Ok(report)
}

/// Parse `ESC [ <rows> ; <cols>` with an optional trailing `R`.
pub fn parse_cursor_report(report: &[u8]) -> Result<ScreenGeometry, GeometryError> {
    let body = report
        .strip_prefix(b"\x1b[")
        .ok_or(GeometryError::BadPrefix)?;
    let body = body.strip_suffix(b"R").unwrap_or(body);

    let malformed = || GeometryError::Malformed(String::from_utf8_lossy(report).into_owned());

    let text = std::str::from_utf8(body).map_err(|_| malformed())?;
    let (rows, columns) = text.split_once(';').ok_or_else(malformed)?;
    let rows: u16 = rows.parse().map_err(|_| malformed())?;
    let columns: u16 = columns.parse().map_err(|_| malformed())?;

    ScreenGeometry::new(rows, columns)
}
