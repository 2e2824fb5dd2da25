//! Core terminal session components.
//!
//! - **mode**: raw mode entry and guaranteed restoration (termios)
//! - **geometry**: screen size detection with an escape-sequence fallback
//! - **input**: timed single-byte keyboard reads
//! - **session**: the lifecycle state machine tying the above together
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── TerminalMode (saved attributes + raw flags)
//! ├── GeometryProbe (TIOCGWINSZ, or ESC[6n cursor report)
//! ├── InputReader (VMIN=0 / VTIME reads)
//! └── FrameRenderer + KeyMapper (from ui)
//! ```

#[cfg(unix)]
pub mod mode;
pub mod geometry;
pub mod input;
pub mod session;
