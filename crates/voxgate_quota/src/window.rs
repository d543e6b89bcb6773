//! Fixed-length usage windows.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::Serialize;

/// Characters consumed within one accounting window.
///
/// A window covers `[window_start, window_start + window_length)`. Once the
/// clock reaches the end, the window is treated as empty and restarts at the
/// time it is next touched.
///
/// Characters held by admitted requests that have not finished yet are kept
/// apart in `reserved` and survive a restart; they settle into whichever
/// window is current when the request completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct QuotaWindow {
    /// Characters recorded in this window
    chars_used: u64,
    /// Characters held by requests still in flight
    reserved: u64,
    /// When this window started
    window_start: DateTime<Utc>,
    /// How long the window lasts
    #[serde(skip)]
    window_length: chrono::Duration,
}

impl QuotaWindow {
    /// Start an empty window at `now`.
    pub fn new(window_length: chrono::Duration, now: DateTime<Utc>) -> Self {
        Self {
            chars_used: 0,
            reserved: 0,
            window_start: now,
            window_length,
        }
    }

    /// When the window ends. `None` if the end is beyond representable time.
    pub fn resets_at(&self) -> Option<DateTime<Utc>> {
        self.window_start.checked_add_signed(self.window_length)
    }

    /// Whether `now` is at or past the end of the window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.resets_at().is_some_and(|end| now >= end)
    }

    /// Restart the window at `now` if it has expired.
    pub fn roll(&mut self, now: DateTime<Utc>) {
        if self.is_expired(now) {
            self.chars_used = 0;
            self.window_start = now;
        }
    }

    /// Usage as seen at `now`, counting an expired window as empty.
    pub fn used_at(&self, now: DateTime<Utc>) -> u64 {
        if self.is_expired(now) { 0 } else { self.chars_used }
    }

    /// Reset time as seen at `now`: an expired window would restart now.
    pub fn resets_at_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_expired(now) {
            now.checked_add_signed(self.window_length)
        } else {
            self.resets_at()
        }
    }

    /// Recorded plus reserved characters as seen at `now`.
    pub fn held_at(&self, now: DateTime<Utc>) -> u64 {
        self.used_at(now).saturating_add(self.reserved)
    }

    /// Whether the window has expired and nothing is reserved against it.
    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        self.reserved == 0 && self.is_expired(now)
    }

    /// Add characters to the window.
    pub(crate) fn add(&mut self, chars: u64) {
        self.chars_used = self.chars_used.saturating_add(chars);
    }

    /// Hold characters for an in-flight request.
    pub(crate) fn reserve(&mut self, chars: u64) {
        self.reserved = self.reserved.saturating_add(chars);
    }

    /// Turn held characters into recorded usage.
    pub(crate) fn commit(&mut self, chars: u64) {
        self.reserved = self.reserved.saturating_sub(chars);
        self.add(chars);
    }

    /// Drop held characters without recording them.
    pub(crate) fn release(&mut self, chars: u64) {
        self.reserved = self.reserved.saturating_sub(chars);
    }
}
