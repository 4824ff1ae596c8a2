//! HC-05 serial link helpers: UART settings and line assembly.

use core::fmt;

use heapless::Vec;

pub const BAUD_RATE: u32 = 9600;
pub const READ_TIMEOUT_MS: u64 = 100;
pub const RX_BUFFER_SIZE: usize = 128;

/// Collects UART chunks into `\n`-terminated lines.
///
/// A trailing `\r` is dropped. A line that does not fit in `N` bytes is
/// emitted as soon as the buffer fills; the `\n` (or `\r\n`) that then ends
/// it does not produce a second, empty line.
pub struct LineBuffer<const N: usize> {
    buf: Vec<u8, N>,
    // The last line went out early, on a full buffer or a flush.
    cut: bool,
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            cut: false,
        }
    }

    pub fn feed<F>(&mut self, chunk: &[u8], mut on_line: F)
    where
        F: FnMut(&[u8]),
    {
        for &byte in chunk {
            if byte == b'\n' {
                let only_cr = matches!(self.buf.as_slice(), [] | [b'\r']);
                if self.cut && only_cr {
                    self.buf.clear();
                } else {
                    self.emit(&mut on_line);
                }
                self.cut = false;
                continue;
            }
            // Capacity is checked just below, so this push cannot fail.
            let _ = self.buf.push(byte);
            if byte != b'\r' {
                self.cut = false;
            }
            if self.buf.is_full() {
                self.emit(&mut on_line);
                self.cut = true;
            }
        }
    }

    /// Emits a partial line, if any.
    pub fn flush<F>(&mut self, mut on_line: F)
    where
        F: FnMut(&[u8]),
    {
        if !self.buf.is_empty() {
            self.emit(&mut on_line);
            self.cut = true;
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn emit<F>(&mut self, on_line: &mut F)
    where
        F: FnMut(&[u8]),
    {
        let line = match self.buf.last() {
            Some(b'\r') => &self.buf[..self.buf.len() - 1],
            _ => &self.buf[..],
        };
        on_line(line);
        self.buf.clear();
    }
}

/// Displays bytes as UTF-8, replacing invalid sequences with U+FFFD.
pub struct Lossy<'a>(pub &'a [u8]);

impl fmt::Display for Lossy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_str("\u{FFFD}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::{String, ToString};
    use std::vec::Vec;

    fn lines<const N: usize>(buffer: &mut LineBuffer<N>, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        buffer.feed(chunk, |line| out.push(Lossy(line).to_string()));
        out
    }

    #[test]
    fn assembles_lines_across_chunks() {
        let mut buffer = LineBuffer::<32>::new();
        assert!(lines(&mut buffer, b"hel").is_empty());
        assert_eq!(buffer.pending(), 3);
        assert_eq!(lines(&mut buffer, b"lo\r\nwor"), vec!["hello"]);
        assert_eq!(lines(&mut buffer, b"ld\n\n"), vec!["world", ""]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn long_line_is_flushed_when_full() {
        let mut buffer = LineBuffer::<4>::new();
        assert_eq!(lines(&mut buffer, b"abcdefg\n"), vec!["abcd", "efg"]);
    }

    #[test]
    fn terminator_after_a_full_buffer_is_not_a_line() {
        let mut buffer = LineBuffer::<4>::new();
        assert_eq!(lines(&mut buffer, b"abcd\r\n"), vec!["abcd"]);
        assert_eq!(lines(&mut buffer, b"abc\r"), vec!["abc"]);
        assert_eq!(lines(&mut buffer, b"\nxy\n"), vec!["xy"]);
        assert_eq!(lines(&mut buffer, b"wxyz\n\n"), vec!["wxyz", ""]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn terminator_after_a_flush_is_not_a_line() {
        let mut buffer = LineBuffer::<16>::new();
        lines(&mut buffer, b"typed");
        let mut out = Vec::new();
        buffer.flush(|line| out.push(line.to_vec()));
        assert_eq!(out, vec![b"typed".to_vec()]);
        assert!(lines(&mut buffer, b"\r\n").is_empty());
        assert_eq!(lines(&mut buffer, b"next\n"), vec!["next"]);
    }

    #[test]
    fn flush_emits_partial_line() {
        let mut buffer = LineBuffer::<16>::new();
        lines(&mut buffer, b"partial");
        let mut out = Vec::new();
        buffer.flush(|line| out.push(line.to_vec()));
        assert_eq!(out, vec![b"partial".to_vec()]);

        buffer.flush(|_| panic!("nothing pending"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(Lossy(b"ok \xFF!").to_string(), "ok \u{FFFD}!");
        assert_eq!(Lossy(b"plain").to_string(), "plain");
    }
}
