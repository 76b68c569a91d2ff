//! Keyboard-wedge scanner decoding.
//!
//! Most card-shoe barcode scanners enumerate as a USB boot keyboard and
//! "type" the decoded barcode followed by Enter.  [`hid`] maps HID usage IDs
//! (page 0x07) to the characters a scanner can produce, and [`report`] turns
//! a stream of 8-byte boot reports into complete scan strings.

pub mod hid;
pub mod report;

pub use hid::ScanKey;
pub use report::BootReportDecoder;
