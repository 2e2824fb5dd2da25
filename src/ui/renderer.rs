//! Frame renderer
//!
//! Builds a whole frame in memory and hands it to the terminal in one write.

use std::io::{self, Write};

use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use tracing::trace;

use crate::core::geometry::ScreenGeometry;

/// Cursor to row 1, column 1.
const CURSOR_HOME: &[u8] = b"\x1b[H";

/// Explicit carriage return + line feed; OPOST is off in raw mode.
const LINE_ADVANCE: &[u8] = b"\r\n";

/// Glyph drawn at the start of every empty row.
pub const DEFAULT_FILLER: char = '~';

/// Full-screen renderer. Keeps no state between frames.
pub struct FrameRenderer {
    filler: char,
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_FILLER)
    }
}

impl FrameRenderer {
    pub fn new(filler: char) -> Self {
        Self { filler }
    }

    /// Bytes of one complete frame: clear, home, one filler per row, home.
    pub fn compose(&self, geometry: ScreenGeometry) -> Vec<u8> {
        let mut glyph = [0u8; 4];
        let glyph = self.filler.encode_utf8(&mut glyph).as_bytes();

        let rows = geometry.rows as usize;
        let mut frame =
            Vec::with_capacity(16 + rows * (glyph.len() + LINE_ADVANCE.len()));

        Self::push_clear(&mut frame);
        for row in 0..rows {
            frame.extend_from_slice(glyph);
            if row + 1 < rows {
                frame.extend_from_slice(LINE_ADVANCE);
            }
        }
        frame.extend_from_slice(CURSOR_HOME);
        frame
    }

    /// Compose and emit one frame as a single write.
    pub fn draw<W: Write>(&self, out: &mut W, geometry: ScreenGeometry) -> io::Result<()> {
        let frame = self.compose(geometry);
        trace!("frame: {} bytes for {} rows", frame.len(), geometry.rows);
        out.write_all(&frame)?;
        out.flush()
    }

    /// Erase the display and home the cursor.
    pub fn clear<W: Write>(out: &mut W) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(7);
        Self::push_clear(&mut bytes);
        out.write_all(&bytes)?;
        out.flush()
    }

    fn push_clear(buf: &mut Vec<u8>) {
        // Writing into a Vec cannot fail.
        let _ = queue!(buf, Clear(ClearType::All));
        buf.extend_from_slice(CURSOR_HOME);
    }
}

/// Renders frame bytes as readable text (for debugging)
pub struct DebugRenderer;

impl DebugRenderer {
    /// Escape control bytes so a frame can be printed to a cooked terminal.
    pub fn render(frame: &[u8]) -> String {
        let mut output = String::with_capacity(frame.len() * 2);
        for ch in String::from_utf8_lossy(frame).chars() {
            match ch {
                '\x1b' => output.push_str("\\e"),
                '\r' => output.push_str("\\r"),
                '\n' => output.push_str("\\n\n"),
                c if c.is_control() => output.push_str(&format!("\\x{:02x}", c as u32)),
                c => output.push(c),
            }
        }
        output
    }
}
