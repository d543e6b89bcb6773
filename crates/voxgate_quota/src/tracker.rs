//! Per-identity character budget tracking.

use crate::{QuotaConfig, QuotaWindow};
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use voxgate_core::{DenialReason, GuardrailDecision, SharedClock};

/// Identities kept before idle ones are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct IdentityUsage {
    daily: QuotaWindow,
    monthly: QuotaWindow,
}

impl IdentityUsage {
    fn new(config: &QuotaConfig, now: DateTime<Utc>) -> Self {
        Self {
            daily: QuotaWindow::new(config.daily_window(), now),
            monthly: QuotaWindow::new(config.monthly_window(), now),
        }
    }

    fn roll(&mut self, now: DateTime<Utc>) {
        self.daily.roll(now);
        self.monthly.roll(now);
    }

    fn is_idle(&self, now: DateTime<Utc>) -> bool {
        self.daily.is_idle(now) && self.monthly.is_idle(now)
    }
}

/// Current usage for one identity, for headers and status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
pub struct QuotaStatus {
    /// Characters used in the current daily window
    daily_used: u64,
    /// Characters held by in-flight requests
    daily_reserved: u64,
    /// Daily character cap
    daily_limit: u64,
    /// Characters left today, net of reservations
    daily_remaining: u64,
    /// When the daily window resets
    daily_resets_at: Option<DateTime<Utc>>,
    /// Characters used in the current monthly window
    monthly_used: u64,
    /// Characters held by in-flight requests
    monthly_reserved: u64,
    /// Monthly character cap
    monthly_limit: u64,
    /// Characters left this month, net of reservations
    monthly_remaining: u64,
    /// When the monthly window resets
    monthly_resets_at: Option<DateTime<Utc>>,
    /// Per-request character cap
    max_chars_per_request: u64,
}

/// Character budget tracker.
///
/// Two ways to spend budget:
/// - [`QuotaTracker::check`] then [`QuotaTracker::record`], for callers that
///   run one request at a time per identity.
/// - [`QuotaTracker::try_reserve`], which checks and holds the characters in
///   one critical section. Concurrent requests see each other's holds, so an
///   identity can never be admitted past its caps. The hold is committed on
///   success and released otherwise, including when the reservation is dropped.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use voxgate_core::ManualClock;
/// use voxgate_quota::{QuotaConfig, QuotaTracker};
///
/// let config = QuotaConfig::builder().max_chars_per_day(1_000).build().unwrap();
/// let tracker = QuotaTracker::new(config, Arc::new(ManualClock::starting_now()));
///
/// let held = tracker.try_reserve("alice", 600).unwrap();
/// assert!(tracker.try_reserve("alice", 600).is_err());
/// held.commit();
/// assert_eq!(*tracker.status("alice").daily_remaining(), 400);
/// ```
#[derive(Debug)]
pub struct QuotaTracker {
    config: QuotaConfig,
    clock: SharedClock,
    usage: Mutex<HashMap<String, IdentityUsage>>,
}

impl QuotaTracker {
    /// Create a tracker with the given caps.
    pub fn new(config: QuotaConfig, clock: SharedClock) -> Self {
        debug!(
            max_chars_per_request = config.max_chars_per_request(),
            max_chars_per_day = config.max_chars_per_day(),
            max_chars_per_month = config.max_chars_per_month(),
            "Creating quota tracker"
        );
        Self {
            config,
            clock,
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Configured caps.
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Check whether `identity` may spend `char_count` characters.
    ///
    /// Evaluates the per-request, daily and monthly caps in that order and
    /// stops at the first violation. Neither consumes budget nor stores state.
    #[instrument(skip(self))]
    pub fn check(&self, identity: &str, char_count: u64) -> GuardrailDecision {
        let now = self.clock.now();
        let usage = self.usage.lock();
        self.evaluate(usage.get(identity), char_count, now)
    }

    /// Check and hold `char_count` characters for `identity` atomically.
    ///
    /// # Errors
    ///
    /// Returns the denying decision when any cap would be exceeded; nothing
    /// is held in that case.
    #[instrument(skip(self))]
    pub fn try_reserve(
        &self,
        identity: &str,
        char_count: u64,
    ) -> Result<QuotaReservation<'_>, GuardrailDecision> {
        let now = self.clock.now();
        let mut usage = self.usage.lock();

        let decision = self.evaluate(usage.get(identity), char_count, now);
        if !decision.allowed {
            return Err(decision);
        }

        let entry = self.entry(&mut usage, identity, now);
        entry.daily.reserve(char_count);
        entry.monthly.reserve(char_count);
        debug!(
            daily_reserved = entry.daily.reserved(),
            monthly_reserved = entry.monthly.reserved(),
            "Reserved characters"
        );

        Ok(QuotaReservation {
            tracker: self,
            identity: identity.to_string(),
            char_count,
            settled: false,
        })
    }

    /// Record `char_count` characters against both windows of `identity`.
    ///
    /// Call only after the guarded work succeeded.
    #[instrument(skip(self))]
    pub fn record(&self, identity: &str, char_count: u64) {
        let now = self.clock.now();
        let mut usage = self.usage.lock();
        let entry = self.entry(&mut usage, identity, now);
        entry.daily.add(char_count);
        entry.monthly.add(char_count);
        debug!(
            daily_used = entry.daily.chars_used(),
            monthly_used = entry.monthly.chars_used(),
            "Recorded character usage"
        );
    }

    /// Current usage and reset times for `identity`. Does not mutate state.
    pub fn status(&self, identity: &str) -> QuotaStatus {
        let now = self.clock.now();
        let usage = self.usage.lock();

        let (daily_used, daily_reserved, daily_resets_at) = match usage.get(identity) {
            Some(entry) => (
                entry.daily.used_at(now),
                *entry.daily.reserved(),
                entry.daily.resets_at_from(now),
            ),
            None => (0, 0, now.checked_add_signed(self.config.daily_window())),
        };
        let (monthly_used, monthly_reserved, monthly_resets_at) = match usage.get(identity) {
            Some(entry) => (
                entry.monthly.used_at(now),
                *entry.monthly.reserved(),
                entry.monthly.resets_at_from(now),
            ),
            None => (0, 0, now.checked_add_signed(self.config.monthly_window())),
        };

        let daily_limit = *self.config.max_chars_per_day();
        let monthly_limit = *self.config.max_chars_per_month();
        QuotaStatus {
            daily_used,
            daily_reserved,
            daily_limit,
            daily_remaining: daily_limit.saturating_sub(daily_used + daily_reserved),
            daily_resets_at,
            monthly_used,
            monthly_reserved,
            monthly_limit,
            monthly_remaining: monthly_limit.saturating_sub(monthly_used + monthly_reserved),
            monthly_resets_at,
            max_chars_per_request: *self.config.max_chars_per_request(),
        }
    }

    /// Number of identities with stored usage.
    pub fn tracked_identities(&self) -> usize {
        self.usage.lock().len()
    }

    /// Clear all usage. Test isolation only.
    pub fn reset(&self) {
        self.usage.lock().clear();
        debug!("Reset quota tracker");
    }

    fn evaluate(
        &self,
        entry: Option<&IdentityUsage>,
        char_count: u64,
        now: DateTime<Utc>,
    ) -> GuardrailDecision {
        let (daily_held, monthly_held) = entry
            .map(|e| (e.daily.held_at(now), e.monthly.held_at(now)))
            .unwrap_or_default();
        let daily_remaining = self.config.max_chars_per_day().saturating_sub(daily_held);
        let monthly_remaining = self.config.max_chars_per_month().saturating_sub(monthly_held);

        let limit = *self.config.max_chars_per_request();
        if char_count > limit {
            warn!(char_count, limit, "Request exceeds per-request character cap");
            return GuardrailDecision::budget_denied(
                DenialReason::PerRequestCap {
                    requested: char_count,
                    limit,
                },
                None,
            )
            .with_remaining(daily_remaining, monthly_remaining);
        }

        if char_count > daily_remaining {
            warn!(char_count, daily_remaining, "Daily character limit exceeded");
            let resets_at = match entry {
                Some(e) => e.daily.resets_at_from(now),
                None => now.checked_add_signed(self.config.daily_window()),
            };
            return GuardrailDecision::budget_denied(DenialReason::DailyCap, resets_at)
                .with_remaining(daily_remaining, monthly_remaining);
        }

        if char_count > monthly_remaining {
            warn!(char_count, monthly_remaining, "Monthly character limit exceeded");
            let resets_at = match entry {
                Some(e) => e.monthly.resets_at_from(now),
                None => now.checked_add_signed(self.config.monthly_window()),
            };
            return GuardrailDecision::budget_denied(DenialReason::MonthlyCap, resets_at)
                .with_remaining(daily_remaining, monthly_remaining);
        }

        debug!(daily_remaining, monthly_remaining, "Quota check passed");
        GuardrailDecision::allow().with_remaining(daily_remaining, monthly_remaining)
    }

    /// Rolled usage for `identity`, created if absent. Prunes idle identities
    /// first when the map is large.
    fn entry<'m>(
        &self,
        usage: &'m mut HashMap<String, IdentityUsage>,
        identity: &str,
        now: DateTime<Utc>,
    ) -> &'m mut IdentityUsage {
        if usage.len() >= PRUNE_THRESHOLD && !usage.contains_key(identity) {
            prune_idle(usage, now);
        }
        let entry = usage
            .entry(identity.to_string())
            .or_insert_with(|| IdentityUsage::new(&self.config, now));
        entry.roll(now);
        entry
    }

    fn settle(&self, identity: &str, char_count: u64, commit: bool) {
        let now = self.clock.now();
        let mut usage = self.usage.lock();
        if commit {
            let entry = self.entry(&mut usage, identity, now);
            entry.daily.commit(char_count);
            entry.monthly.commit(char_count);
            debug!(
                identity,
                daily_used = entry.daily.chars_used(),
                monthly_used = entry.monthly.chars_used(),
                "Committed reserved characters"
            );
        } else if let Some(entry) = usage.get_mut(identity) {
            entry.daily.release(char_count);
            entry.monthly.release(char_count);
            debug!(identity, char_count, "Released reserved characters");
        }
    }
}

/// Drop identities whose windows have both expired with nothing held; a
/// fresh entry is indistinguishable from them.
fn prune_idle(usage: &mut HashMap<String, IdentityUsage>, now: DateTime<Utc>) {
    let before = usage.len();
    usage.retain(|_, entry| !entry.is_idle(now));
    debug!(
        pruned = before - usage.len(),
        remaining = usage.len(),
        "Pruned idle quota entries"
    );
}

/// Characters held for one in-flight request.
///
/// Dropping the reservation without committing releases it, so a cancelled
/// or panicking request costs nothing.
#[must_use = "dropping a reservation releases it"]
#[derive(Debug)]
pub struct QuotaReservation<'a> {
    tracker: &'a QuotaTracker,
    identity: String,
    char_count: u64,
    settled: bool,
}

impl QuotaReservation<'_> {
    /// Characters held.
    pub fn char_count(&self) -> u64 {
        self.char_count
    }

    /// Record the held characters as used.
    pub fn commit(mut self) {
        self.settled = true;
        self.tracker.settle(&self.identity, self.char_count, true);
    }

    /// Give the held characters back.
    pub fn release(mut self) {
        self.settled = true;
        self.tracker.settle(&self.identity, self.char_count, false);
    }
}

impl Drop for QuotaReservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.settle(&self.identity, self.char_count, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use voxgate_core::{Clock, ManualClock};

    fn tracker() -> (QuotaTracker, ManualClock) {
        let clock = ManualClock::starting_now();
        let config = QuotaConfig::builder()
            .max_chars_per_request(500)
            .max_chars_per_day(1_000)
            .build()
            .unwrap();
        (QuotaTracker::new(config, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_prune_keeps_identities_with_live_windows_or_holds() {
        let (tracker, clock) = tracker();
        let now = clock.now();
        let mut usage = HashMap::new();
        usage.insert("stale".to_string(), IdentityUsage::new(tracker.config(), now));
        let mut held = IdentityUsage::new(tracker.config(), now);
        held.daily.reserve(5);
        held.monthly.reserve(5);
        usage.insert("held".to_string(), held);

        clock.advance(Duration::from_secs(31 * 86_400));
        let later = clock.now();
        usage.insert("fresh".to_string(), IdentityUsage::new(tracker.config(), later));

        prune_idle(&mut usage, later);

        assert!(!usage.contains_key("stale"));
        assert!(usage.contains_key("held"));
        assert!(usage.contains_key("fresh"));
    }

    #[test]
    fn test_dropped_reservation_is_released() {
        let (tracker, _clock) = tracker();

        {
            let _held = tracker.try_reserve("alice", 400).unwrap();
            assert_eq!(*tracker.status("alice").daily_reserved(), 400);
            assert_eq!(*tracker.status("alice").daily_remaining(), 600);
        }

        let status = tracker.status("alice");
        assert_eq!(*status.daily_reserved(), 0);
        assert_eq!(*status.daily_used(), 0);
        assert_eq!(*status.daily_remaining(), 1_000);
    }
}
