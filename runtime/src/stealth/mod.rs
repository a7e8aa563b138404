//! Measures against bot protection on builder sites.
//!
//! A realistic desktop identity for both fetch strategies, a page script
//! hiding automation signals in the headless browser, and jittered
//! back-off between retries.

pub mod behavior;
pub mod fingerprint;

pub use fingerprint::{stealth_script, DEFAULT_USER_AGENT};
