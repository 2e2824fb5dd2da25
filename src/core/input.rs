//! Single-byte keyboard input.

use std::io::{self, Read};

use tracing::trace;

use crate::error::{Error, Result};

/// Outcome of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Byte(u8),
    /// The raw-mode timeout expired with nothing typed.
    Timeout,
}

/// Reads one byte at a time from the terminal.
///
/// In raw mode (VMIN = 0, VTIME = n) a read returns 0 bytes once the timeout
/// expires; that is reported as [`KeyEvent::Timeout`], not as an error.
pub struct InputReader<R> {
    reader: R,
}

impl<R: Read> InputReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read_key(&mut self) -> Result<KeyEvent> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(KeyEvent::Timeout),
                Ok(_) => {
                    trace!("key byte {:#04x}", byte[0]);
                    return Ok(KeyEvent::Byte(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(KeyEvent::Timeout)
                }
                Err(e) => return Err(Error::io("read", e)),
            }
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::time::Duration;

    /// Replays a script of read results.
    struct Scripted(VecDeque<io::Result<u8>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(b)) => {
                    buf[0] = b;
                    Ok(1)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_returns_supplied_byte() {
        let mut reader = InputReader::new(&b"a\x11"[..]);
        assert_eq!(reader.read_key().unwrap(), KeyEvent::Byte(b'a'));
        assert_eq!(reader.read_key().unwrap(), KeyEvent::Byte(0x11));
        assert_eq!(reader.read_key().unwrap(), KeyEvent::Timeout);
    }

    #[test]
    fn test_interrupted_is_retried() {
        let script = VecDeque::from(vec![
            Err(io::ErrorKind::Interrupted.into()),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b'x'),
        ]);
        let mut reader = InputReader::new(Scripted(script));
        assert_eq!(reader.read_key().unwrap(), KeyEvent::Byte(b'x'));
    }

    #[test]
    fn test_real_error_propagates() {
        let script = VecDeque::from(vec![Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "hangup",
        ))]);
        let mut reader = InputReader::new(Scripted(script));
        match reader.read_key() {
            Err(Error::Io { op, .. }) => assert_eq!(op, "read"),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_without_input() {
        use std::os::unix::net::UnixStream;

        let (a, mut b) = UnixStream::pair().unwrap();
        a.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let mut reader = InputReader::new(a);

        assert_eq!(reader.read_key().unwrap(), KeyEvent::Timeout);

        b.write_all(b"q").unwrap();
        assert_eq!(reader.read_key().unwrap(), KeyEvent::Byte(b'q'));
        assert_eq!(reader.read_key().unwrap(), KeyEvent::Timeout);
    }
}
