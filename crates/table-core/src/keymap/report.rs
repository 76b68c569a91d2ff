//! Boot keyboard report decoding.
//!
//! A boot report is 8 bytes: `[modifiers, reserved, k1, k2, k3, k4, k5, k6]`.
//! `k1..k6` list every key held down at the time of the report, so a key is
//! *pressed* when it appears in a report but not in the previous one.  Key
//! releases produce a report without the key and are otherwise ignored.

use crate::keymap::hid::{ScanKey, MOD_LEFT_SHIFT, MOD_RIGHT_SHIFT};

/// Size of a boot keyboard input report.
pub const BOOT_REPORT_LEN: usize = 8;

/// Usage sent in every key slot when too many keys are held (phantom state).
const ERROR_ROLL_OVER: u8 = 0x01;

/// Turns boot reports into scan strings.
#[derive(Debug)]
pub struct BootReportDecoder {
    held: Vec<u8>,
    buf: String,
    max_len: usize,
}

impl BootReportDecoder {
    pub fn new(max_len: usize) -> Self {
        Self {
            held: Vec::with_capacity(6),
            buf: String::new(),
            max_len,
        }
    }

    /// Feeds one report.  Returns every scan terminated by this report.
    pub fn push(&mut self, report: &[u8]) -> Vec<String> {
        let mut scans = Vec::new();
        if report.len() < 3 {
            return scans;
        }
        let keys: Vec<u8> = report[2..report.len().min(BOOT_REPORT_LEN)]
            .iter()
            .copied()
            .filter(|&k| k != 0)
            .collect();
        if keys.iter().all(|&k| k == ERROR_ROLL_OVER) && !keys.is_empty() {
            return scans;
        }

        let shift = report[0] & (MOD_LEFT_SHIFT | MOD_RIGHT_SHIFT) != 0;
        for &usage in keys.iter().filter(|k| !self.held.contains(*k)) {
            let key = ScanKey::from_usage(usage);
            if key.is_terminator() {
                if !self.buf.is_empty() {
                    scans.push(std::mem::take(&mut self.buf));
                }
            } else if let Some(c) = key.to_char(shift) {
                if self.buf.len() < self.max_len {
                    self.buf.push(c);
                }
            }
        }
        self.held = keys;
        scans
    }

    /// Characters typed since the last terminator.
    pub fn partial(&self) -> &str {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.buf.clear();
    }
}
