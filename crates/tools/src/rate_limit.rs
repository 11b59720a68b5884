//! Per-tool call limiting over a rolling 60-second window.
//!
//! The window is anchored at the last successful call: once 60 s have
//! passed since it, the counter resets. Admission and slot reservation
//! happen under one lock, so concurrent callers cannot both take the last
//! slot. A reservation that is not committed (the call failed or panicked)
//! is released on drop and never counts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Length of the limiting window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct WindowState {
    completed: u32,
    in_flight: u32,
    last_success: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    state: Mutex<HashMap<String, WindowState>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowState>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Try to reserve a slot for `tool` under `limit` calls per window.
    ///
    /// Returns `None` when the window is full.
    pub fn try_acquire(&self, tool: &str, limit: u32) -> Option<Permit<'_>> {
        let now = Instant::now();
        let mut state = self.lock();
        let entry = state.entry(tool.to_string()).or_default();

        let window_open = entry
            .last_success
            .is_some_and(|last| now.duration_since(last) < WINDOW);
        if !window_open {
            entry.completed = 0;
        }

        if entry.completed + entry.in_flight >= limit {
            return None;
        }

        entry.in_flight += 1;
        Some(Permit {
            limiter: self,
            tool: tool.to_string(),
            committed: false,
        })
    }

    /// Calls counted in the current window for `tool`.
    pub fn window_count(&self, tool: &str) -> u32 {
        self.lock().get(tool).map_or(0, |s| s.completed)
    }

    fn finish(&self, tool: &str, success: bool) {
        let mut state = self.lock();
        if let Some(entry) = state.get_mut(tool) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
            if success {
                entry.completed += 1;
                entry.last_success = Some(Instant::now());
            }
        }
    }
}

/// A reserved slot. Commit it after a successful call; dropping it
/// uncommitted gives the slot back.
#[must_use]
pub struct Permit<'a> {
    limiter: &'a RateLimiter,
    tool: String,
    committed: bool,
}

impl Permit<'_> {
    pub fn commit(mut self) {
        self.committed = true;
        self.limiter.finish(&self.tool, true);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter.finish(&self.tool, false);
        }
    }
}
