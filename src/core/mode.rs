//! Raw mode on the controlling terminal.
//!
//! [`TerminalMode`] captures the terminal attributes, applies a raw
//! configuration derived from that snapshot, and writes the exact snapshot
//! back on exit. It is the only place in the crate that changes termios.
//!
//! Restoration is armed in three places:
//!
//! - [`TerminalMode::exit`] on the controlled shutdown path
//! - `Drop`, for early returns and panic unwinding
//! - a [`RestoreHandle`] the binary hands to its panic hook, so the terminal
//!   is usable again before the panic message is printed

use std::fmt;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::session::ModeControl;
use crate::error::{Error, Result};

/// Default raw-mode read timeout, in tenths of a second.
pub const DEFAULT_READ_TIMEOUT: u8 = 1;

/// Snapshot of the terminal attributes taken before raw mode was entered.
#[derive(Clone, Copy)]
pub struct SavedAttributes {
    termios: libc::termios,
}

impl SavedAttributes {
    /// Read the current attributes of `fd`.
    pub fn capture(fd: impl AsFd) -> io::Result<Self> {
        let termios = get_attrs(fd.as_fd().as_raw_fd())?;
        Ok(Self { termios })
    }

    fn restore(&self, fd: RawFd) -> io::Result<()> {
        set_attrs(fd, &self.termios)
    }
}

impl PartialEq for SavedAttributes {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (&self.termios, &other.termios);
        a.c_iflag == b.c_iflag
            && a.c_oflag == b.c_oflag
            && a.c_cflag == b.c_cflag
            && a.c_lflag == b.c_lflag
            && a.c_cc == b.c_cc
    }
}

impl Eq for SavedAttributes {}

impl fmt::Debug for SavedAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.termios;
        f.debug_struct("SavedAttributes")
            .field("iflag", &format_args!("{:#x}", t.c_iflag))
            .field("oflag", &format_args!("{:#x}", t.c_oflag))
            .field("cflag", &format_args!("{:#x}", t.c_cflag))
            .field("lflag", &format_args!("{:#x}", t.c_lflag))
            .field("vmin", &t.c_cc[libc::VMIN])
            .field("vtime", &t.c_cc[libc::VTIME])
            .finish()
    }
}

/// How raw mode is derived from the saved attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawModeConfig {
    /// VTIME in tenths of a second. VMIN is always 0, so a read returns
    /// after this long even if no byte arrived.
    pub read_timeout: u8,
}

impl Default for RawModeConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl RawModeConfig {
    pub fn new(read_timeout: u8) -> Self {
        Self { read_timeout }
    }

    /// Derive raw attributes from `saved`. Bits not listed here are left
    /// as the user had them.
    pub(crate) fn apply(&self, saved: &SavedAttributes) -> libc::termios {
        let mut raw = saved.termios;

        // No break-to-SIGINT, no CR->NL, no parity check, no 8th-bit strip,
        // no Ctrl+S/Ctrl+Q flow control.
        raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        // "\n" stays "\n" on output.
        raw.c_oflag &= !libc::OPOST;
        raw.c_cflag = (raw.c_cflag & !libc::CSIZE) | libc::CS8;
        // No echo, byte-at-a-time input, no Ctrl+C/Ctrl+Z signals, no Ctrl+V.
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);

        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = self.read_timeout;
        raw
    }
}

/// Restores one saved snapshot onto a descriptor number.
///
/// The handle does not own the descriptor. It is meant for the panic hook,
/// which runs while the owning [`TerminalMode`] is still alive.
#[derive(Debug, Clone, Copy)]
pub struct RestoreHandle {
    fd: RawFd,
    saved: SavedAttributes,
}

impl RestoreHandle {
    pub fn restore(&self) -> io::Result<()> {
        self.saved.restore(self.fd)
    }
}

/// A [`RestoreHandle`] shared with a panic hook or signal action, which can
/// outlive the session. Once disarmed it never touches the descriptor
/// again, so a closed (or reused) fd is left alone.
///
/// `restore` only loads an atomic and calls `tcsetattr`, so it may run
/// inside a signal handler.
#[derive(Debug, Clone)]
pub struct ArmedRestore {
    handle: RestoreHandle,
    armed: Arc<AtomicBool>,
}

impl ArmedRestore {
    pub fn new(handle: RestoreHandle) -> Self {
        Self {
            handle,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns `false` without doing anything once disarmed.
    pub fn restore(&self) -> io::Result<bool> {
        if !self.armed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.handle.restore()?;
        Ok(true)
    }

    /// Disarms every clone.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

/// Owner of the terminal mode for one session.
pub struct TerminalMode {
    fd: OwnedFd,
    config: RawModeConfig,
    saved: Option<SavedAttributes>,
}

impl TerminalMode {
    /// Take ownership of a descriptor on the controlling terminal. Nothing
    /// is changed until [`enter`](Self::enter).
    pub fn new(fd: OwnedFd, config: RawModeConfig) -> Self {
        Self {
            fd,
            config,
            saved: None,
        }
    }

    /// Capture the current attributes and switch to raw mode.
    ///
    /// Entering twice keeps the first snapshot.
    pub fn enter(&mut self) -> Result<()> {
        if self.saved.is_some() {
            debug!("raw mode already active");
            return Ok(());
        }

        let fd = self.fd.as_raw_fd();
        let saved = SavedAttributes::capture(&self.fd).map_err(|e| Error::control("tcgetattr", e))?;
        debug!("saved terminal attributes: {:?}", saved);

        let raw = self.config.apply(&saved);
        set_attrs(fd, &raw).map_err(|e| Error::control("tcsetattr", e))?;

        self.saved = Some(saved);
        info!("raw mode enabled (VTIME={})", self.config.read_timeout);
        Ok(())
    }

    /// Put the saved attributes back, discarding unread input first.
    ///
    /// Calling this when not in raw mode does nothing.
    pub fn exit(&mut self) -> Result<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };

        if let Err(e) = saved.restore(self.fd.as_raw_fd()) {
            // Keep the snapshot so Drop gets another attempt.
            self.saved = Some(saved);
            return Err(Error::control("tcsetattr", e));
        }

        info!("raw mode disabled, terminal attributes restored");
        Ok(())
    }

    #[allow(dead_code)]
    pub fn is_raw(&self) -> bool {
        self.saved.is_some()
    }

    /// Snapshot taken by the last successful [`enter`](Self::enter).
    #[allow(dead_code)]
    pub fn saved(&self) -> Option<&SavedAttributes> {
        self.saved.as_ref()
    }

    /// Handle for restoring this session's snapshot from outside normal
    /// control flow. `None` until raw mode has been entered.
    pub fn restore_handle(&self) -> Option<RestoreHandle> {
        self.saved.map(|saved| RestoreHandle {
            fd: self.fd.as_raw_fd(),
            saved,
        })
    }
}

impl ModeControl for TerminalMode {
    fn enter(&mut self) -> Result<()> {
        TerminalMode::enter(self)
    }

    fn exit(&mut self) -> Result<()> {
        TerminalMode::exit(self)
    }
}

impl Drop for TerminalMode {
    fn drop(&mut self) {
        if let Err(e) = self.exit() {
            warn!("failed to restore terminal on drop: {}", e);
        }
    }
}

fn get_attrs(fd: RawFd) -> io::Result<libc::termios> {
    let mut termios = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: tcgetattr fully initializes the struct when it returns 0.
    unsafe {
        if libc::tcgetattr(fd, termios.as_mut_ptr()) == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(termios.assume_init())
    }
}

/// `tcsetattr(TCSAFLUSH)`, retried on EINTR.
fn set_attrs(fd: RawFd, termios: &libc::termios) -> io::Result<()> {
    loop {
        // SAFETY: `termios` is a valid, initialized struct for the call.
        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, termios) } == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
