// src/io/serial/framer.rs
//
// Newline framing for the controller's text protocol. Bytes arrive in
// arbitrary chunks; complete lines come out. A trailing partial line is kept
// until the next feed.

use serde::{Deserialize, Serialize};

use crate::io::GateError;

/// Default residual cap, well above the longest line the board sends.
pub const DEFAULT_MAX_PENDING: usize = 4096;

/// What to do when a partial line grows past the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Throw away the oversized partial line and resynchronise on the next `\n`.
    #[default]
    DiscardPartial,
    /// Report `GateError::FramerOverflow`; the session treats it as fatal.
    Fail,
}

/// A fatal overflow under `OverflowPolicy::Fail`. `completed` holds the lines
/// the same chunk finished before the overflow, in arrival order.
#[derive(Debug)]
pub struct Overflow {
    pub completed: Vec<String>,
    pub error: GateError,
}

#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_pending: usize,
    policy: OverflowPolicy,
    /// Set after an overflow under `DiscardPartial`: bytes are dropped up to the next `\n`.
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(DEFAULT_MAX_PENDING, OverflowPolicy::default())
    }
}

impl LineFramer {
    pub fn new(max_pending: usize, policy: OverflowPolicy) -> Self {
        LineFramer {
            buffer: Vec::new(),
            max_pending: max_pending.max(1),
            policy,
            discarding: false,
        }
    }

    /// Feed a chunk, returning every line it completed in arrival order.
    ///
    /// Lines are trimmed (which removes a `\r` before the `\n`); lines that are
    /// empty after trimming are dropped.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<String>, Overflow> {
        let mut lines = Vec::new();

        for &byte in data {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    self.buffer.clear();
                    continue;
                }
                let raw: Vec<u8> = self.buffer.drain(..).collect();
                let text = String::from_utf8_lossy(&raw);
                let line = text.trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            self.buffer.push(byte);

            if self.buffer.len() > self.max_pending {
                let dropped = self.buffer.len();
                self.buffer.clear();
                match self.policy {
                    OverflowPolicy::DiscardPartial => {
                        tlog!(
                            "[framer] Discarding {} byte partial line (limit {})",
                            dropped,
                            self.max_pending
                        );
                        self.discarding = true;
                    }
                    OverflowPolicy::Fail => {
                        return Err(Overflow {
                            completed: lines,
                            error: GateError::FramerOverflow {
                                limit: self.max_pending,
                            },
                        });
                    }
                }
            }
        }

        Ok(lines)
    }

    /// Bytes of the incomplete trailing line.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Forget any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_split_across_feeds() {
        let mut framer = LineFramer::default();
        assert!(framer.feed(b"ab").unwrap().is_empty());
        assert_eq!(framer.feed(b"cd\n").unwrap(), vec!["abcd"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_multiple_lines_keep_residual() {
        let mut framer = LineFramer::default();
        assert_eq!(framer.feed(b"a\nb\nc").unwrap(), vec!["a", "b"]);
        assert_eq!(framer.pending(), b"c");
        assert_eq!(framer.feed(b"\n").unwrap(), vec!["c"]);
    }

    #[test]
    fn test_crlf_and_whitespace_trimmed() {
        let mut framer = LineFramer::default();
        let lines = framer.feed(b"AT+STLAMP=ON\r\n  curr_version=1.0 \r\n").unwrap();
        assert_eq!(lines, vec!["AT+STLAMP=ON", "curr_version=1.0"]);
    }

    #[test]
    fn test_empty_lines_dropped() {
        let mut framer = LineFramer::default();
        let lines = framer.feed(b"\n\r\n   \nOK\n\n").unwrap();
        assert_eq!(lines, vec!["OK"]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut framer = LineFramer::default();
        let mut out = Vec::new();
        for b in b"X=1\r\nY=2\n" {
            out.extend(framer.feed(&[*b]).unwrap());
        }
        assert_eq!(out, vec!["X=1", "Y=2"]);
    }

    #[test]
    fn test_overflow_discards_until_newline() {
        let mut framer = LineFramer::new(4, OverflowPolicy::DiscardPartial);
        let lines = framer.feed(b"0123456789\nok\n").unwrap();
        assert_eq!(lines, vec!["ok"]);
    }

    #[test]
    fn test_overflow_fail_policy() {
        let mut framer = LineFramer::new(4, OverflowPolicy::Fail);
        let err = framer.feed(b"0123456789").unwrap_err();
        assert!(matches!(err.error, GateError::FramerOverflow { limit: 4 }));
        assert!(err.completed.is_empty());
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_overflow_fail_keeps_earlier_lines() {
        let mut framer = LineFramer::new(4, OverflowPolicy::Fail);
        let err = framer.feed(b"A=1\n0123456789").unwrap_err();
        assert_eq!(err.completed, vec!["A=1"]);
        assert!(matches!(err.error, GateError::FramerOverflow { limit: 4 }));
    }

    #[test]
    fn test_fresh_framer_is_empty_after_reset() {
        let mut framer = LineFramer::default();
        framer.feed(b"partial").unwrap();
        framer.reset();
        assert!(framer.pending().is_empty());
        assert_eq!(framer.feed(b"next\n").unwrap(), vec!["next"]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut framer = LineFramer::default();
        let lines = framer.feed(&[b'A', 0xFF, b'=', b'1', b'\n']).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('A'));
        assert!(lines[0].ends_with("=1"));
    }
}
