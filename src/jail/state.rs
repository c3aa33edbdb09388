//! Jail state store
//!
//! Holds the one snapshot of jail state the rest of the program reads.
//! The poll loop is the only writer. Readers either take a copy with
//! [`JailStateStore::current`] or subscribe to be woken on every write.

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::watch;

use crate::error::Error;
use crate::jail::status::JailStatus;

/// Source of timestamps for the store
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that returns whatever it was last set to
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<std::sync::Mutex<DateTime<Local>>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(std::sync::Mutex::new(now)),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: DateTime<Local>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Everything known about the watched jail at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JailSnapshot {
    /// Jail being watched
    pub jail_name: String,
    /// Counters from the last successful poll
    pub status: JailStatus,
    /// When `status` was last refreshed
    pub last_updated: Option<DateTime<Local>>,
    /// Reason the most recent poll failed, cleared by the next success
    pub last_error: Option<String>,
    /// When `last_error` was recorded
    pub last_error_at: Option<DateTime<Local>>,
    /// One-line summary for display
    pub message: String,
}

impl JailSnapshot {
    /// Initial snapshot before anything has been polled
    pub fn new(jail_name: impl Into<String>) -> Self {
        Self {
            jail_name: jail_name.into(),
            status: JailStatus::default(),
            last_updated: None,
            last_error: None,
            last_error_at: None,
            message: "starting...".to_string(),
        }
    }

    /// Whether the most recent poll failed
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Shared owner of the current [`JailSnapshot`]
#[derive(Clone)]
pub struct JailStateStore {
    tx: Arc<watch::Sender<JailSnapshot>>,
}

impl JailStateStore {
    /// Create a store with zeroed counters for `jail_name`
    pub fn new(jail_name: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(JailSnapshot::new(jail_name));
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current snapshot
    pub fn current(&self) -> JailSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified after every write
    pub fn subscribe(&self) -> watch::Receiver<JailSnapshot> {
        self.tx.subscribe()
    }

    /// Record a successful poll, replacing the previous status wholesale
    pub fn apply_success(&self, status: JailStatus, at: DateTime<Local>) {
        self.tx.send_modify(|snap| {
            snap.message = format!("monitoring jail '{}'", snap.jail_name);
            snap.status = status;
            snap.last_updated = Some(at);
            snap.last_error = None;
            snap.last_error_at = None;
        });
    }

    /// Record a failed poll; the last good status stays on display
    pub fn apply_failure(&self, error: &Error, at: DateTime<Local>) {
        let reason = error.to_string();
        self.tx.send_modify(|snap| {
            snap.message = format!("error ({})", reason);
            snap.last_error = Some(reason);
            snap.last_error_at = Some(at);
        });
    }
}
