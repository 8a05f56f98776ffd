//! Byte-to-line framing.

/// Default maximum line length in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Accumulates raw bytes and splits them into lines.
///
/// Lines end at `\n`; surrounding whitespace (including a trailing `\r`) is
/// trimmed and invalid UTF-8 is replaced rather than rejected. Blank lines
/// are skipped. A run longer than `max_len` without a newline is dropped and
/// framing resumes after the next newline.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete, non-blank line.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > self.max_len {
                    tracing::warn!(
                        bytes = self.buf.len(),
                        max_len = self.max_len,
                        "Discarding overlong line"
                    );
                    self.buf.clear();
                    self.discarding = true;
                } else if self.discarding {
                    self.buf.clear();
                }
                return None;
            };

            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if pos > self.max_len {
                tracing::warn!(bytes = pos, max_len = self.max_len, "Discarding overlong line");
                continue;
            }

            let text = String::from_utf8_lossy(&raw[..pos]);
            let line = text.trim();
            if line.is_empty() {
                tracing::trace!("Skipping blank line");
                continue;
            }
            return Some(line.to_string());
        }
    }

    /// Number of buffered bytes not yet framed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_lines_across_pushes() {
        let mut buf = LineBuffer::default();
        buf.push(b"PHProbe-Tank1,pH,6.");
        assert_eq!(buf.next_line(), None);
        buf.push(b"75\r\nECMeter-Res,EC,1.42\n");
        assert_eq!(buf.next_line().as_deref(), Some("PHProbe-Tank1,pH,6.75"));
        assert_eq!(buf.next_line().as_deref(), Some("ECMeter-Res,EC,1.42"));
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut buf = LineBuffer::default();
        buf.push(b"\r\n   \n\nA,T,1.0\n");
        assert_eq!(buf.next_line().as_deref(), Some("A,T,1.0"));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buf = LineBuffer::default();
        buf.push(b"probe\xff,pH,7.0\n");
        let line = buf.next_line().unwrap();
        assert_eq!(line, "probe\u{fffd},pH,7.0");
    }

    #[test]
    fn test_overlong_run_is_discarded() {
        let mut buf = LineBuffer::new(8);
        buf.push(b"0123456789abcdef");
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.pending(), 0);

        // Tail of the overlong line is dropped, next line survives
        buf.push(b"tail\nA,T,1\n");
        assert_eq!(buf.next_line().as_deref(), Some("A,T,1"));
    }

    #[test]
    fn test_overlong_complete_line_is_discarded() {
        let mut buf = LineBuffer::new(4);
        buf.push(b"too-long\nok\n");
        assert_eq!(buf.next_line().as_deref(), Some("ok"));
    }
}
