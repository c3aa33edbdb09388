//! Jail state
//!
//! This module provides:
//! - Parsing of `fail2ban-client status` reports
//! - The shared store holding the latest snapshot of a jail

pub mod state;
pub mod status;

// Re-exports
pub use state::{Clock, JailSnapshot, JailStateStore, SystemClock};
pub use status::JailStatus;
