//! Delimiter-based frame assembly for byte-stream transports.
//!
//! A serial read returns whatever bytes happen to be in the UART buffer: half
//! a frame, three frames, or a frame split across two reads.  The assembler
//! accumulates bytes until it sees the delimiter and hands back complete
//! frames.  Two rules bound the memory a noisy line can consume:
//!
//! - a partial frame longer than `max_len` bytes is discarded;
//! - a partial frame older than `stale_after` is discarded the next time the
//!   assembler is fed or [`FrameAssembler::expire`] is called.
//!
//! The clock is passed in by the caller so the rules are testable without
//! sleeping.

use std::time::{Duration, Instant};

use crate::protocol::error::FrameError;

#[derive(Debug)]
pub struct FrameAssembler {
    delimiter: u8,
    max_len: usize,
    stale_after: Duration,
    buf: Vec<u8>,
    started_at: Option<Instant>,
}

impl FrameAssembler {
    pub fn new(delimiter: u8, max_len: usize, stale_after: Duration) -> Self {
        Self {
            delimiter,
            max_len,
            stale_after,
            buf: Vec::with_capacity(max_len.min(4096)),
            started_at: None,
        }
    }

    /// Line-oriented assembler: `\n` delimiter, trailing `\r` stripped.
    pub fn lines(max_len: usize, stale_after: Duration) -> Self {
        Self::new(b'\n', max_len, stale_after)
    }

    /// Bytes buffered in the current partial frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feeds `bytes` received at `now`.  Returns every complete frame (without
    /// the delimiter) and every discarded partial, in stream order.
    pub fn push(&mut self, bytes: &[u8], now: Instant) -> Vec<Result<Vec<u8>, FrameError>> {
        let mut out = Vec::new();
        if let Some(err) = self.expire(now) {
            out.push(Err(err));
        }

        for &byte in bytes {
            if byte == self.delimiter {
                let mut frame = std::mem::take(&mut self.buf);
                self.started_at = None;
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
                if !frame.is_empty() {
                    out.push(Ok(frame));
                }
                continue;
            }

            if self.buf.is_empty() {
                self.started_at = Some(now);
            }
            self.buf.push(byte);
            if self.buf.len() > self.max_len {
                self.started_at = None;
                out.push(Err(FrameError::Overflow {
                    max: self.max_len,
                    discarded: std::mem::take(&mut self.buf),
                }));
            }
        }
        out
    }

    /// Discards the partial frame if it is older than the staleness threshold.
    pub fn expire(&mut self, now: Instant) -> Option<FrameError> {
        let started = self.started_at?;
        if now.saturating_duration_since(started) <= self.stale_after {
            return None;
        }
        self.started_at = None;
        Some(FrameError::Stale {
            stale_ms: self.stale_after.as_millis() as u64,
            discarded: std::mem::take(&mut self.buf),
        })
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> FrameAssembler {
        FrameAssembler::lines(16, Duration::from_millis(2_000))
    }

    fn frames(results: Vec<Result<Vec<u8>, FrameError>>) -> Vec<Vec<u8>> {
        results.into_iter().filter_map(Result::ok).collect()
    }

    #[test]
    fn test_frame_split_across_reads_is_reassembled() {
        // Arrange
        let mut asm = assembler();
        let now = Instant::now();

        // Act
        let first = asm.push(b"*R;12;1", now);
        let second = asm.push(b"7;H\r\n", now);

        // Assert
        assert!(first.is_empty());
        assert_eq!(frames(second), vec![b"*R;12;17;H".to_vec()]);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn test_several_frames_in_one_read() {
        let mut asm = assembler();
        let out = frames(asm.push(b"*H;OK\n*S;3\n*H", Instant::now()));
        assert_eq!(out, vec![b"*H;OK".to_vec(), b"*S;3".to_vec()]);
        assert_eq!(asm.pending(), 2);
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let mut asm = assembler();
        assert!(asm.push(b"\r\n\n", Instant::now()).is_empty());
    }

    #[test]
    fn test_overflow_discards_partial_frame() {
        // Arrange
        let mut asm = assembler();

        // Act
        let out = asm.push(&[b'x'; 20], Instant::now());

        // Assert
        assert!(matches!(out.first(), Some(Err(FrameError::Overflow { max: 16, .. }))));
        assert_eq!(asm.pending(), 3);
    }

    #[test]
    fn test_stale_partial_is_discarded_before_new_bytes() {
        // Arrange
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.push(b"*R;1", t0);

        // Act
        let out = asm.push(b"*S;2\n", t0 + Duration::from_millis(2_500));

        // Assert
        match out.as_slice() {
            [Err(err @ FrameError::Stale { .. }), Ok(frame)] => {
                assert_eq!(err.discarded(), b"*R;1");
                assert_eq!(frame, b"*S;2");
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_expire_keeps_fresh_partial() {
        let mut asm = assembler();
        let t0 = Instant::now();
        asm.push(b"*R", t0);
        assert!(asm.expire(t0 + Duration::from_millis(1_000)).is_none());
        assert_eq!(asm.pending(), 2);
    }
}
