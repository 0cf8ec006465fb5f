// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Operational flag and liveness tracking.

use std::time::{Duration, Instant};

/// Slack added on top of the poll interval before the engine is
/// considered non-operational due to staleness.
pub const STALENESS_GRACE: Duration = Duration::from_secs(6);

/// Tracks the two completion flags and the last successful upstream
/// response, and derives the `operational` verdict the downstream cache
/// servers consult before replying.
pub struct HealthSupervisor {
    static_complete: bool,
    dynamic_complete: bool,
    last_successful_update_at: Option<Instant>,
    poll_interval: Duration,
}

impl HealthSupervisor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            static_complete: false,
            dynamic_complete: false,
            last_successful_update_at: None,
            poll_interval,
        }
    }

    pub fn static_complete(&self) -> bool {
        self.static_complete
    }

    pub fn dynamic_complete(&self) -> bool {
        self.dynamic_complete
    }

    pub fn set_static_complete(&mut self, complete: bool) {
        self.static_complete = complete;
    }

    pub fn set_dynamic_complete(&mut self, complete: bool) {
        self.dynamic_complete = complete;
    }

    pub fn last_successful_update_at(&self) -> Option<Instant> {
        self.last_successful_update_at
    }

    pub fn record_successful_update(&mut self, now: Instant) {
        self.last_successful_update_at = Some(now);
    }

    /// `operational := static_complete ∧ dynamic_complete ∧ (now −
    /// last_successful_update_at ≤ poll_interval + 6s)`.
    pub fn is_operational(&self, now: Instant) -> bool {
        if !self.static_complete || !self.dynamic_complete {
            return false;
        }
        match self.last_successful_update_at {
            Some(last) => now.duration_since(last) <= self.poll_interval + STALENESS_GRACE,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_operational_until_both_sets_complete_and_fresh() {
        let mut health = HealthSupervisor::new(Duration::from_millis(500));
        let now = Instant::now();
        assert!(!health.is_operational(now));

        health.set_static_complete(true);
        health.set_dynamic_complete(true);
        assert!(!health.is_operational(now), "still no successful update recorded");

        health.record_successful_update(now);
        assert!(health.is_operational(now));
    }

    #[test]
    fn goes_non_operational_after_staleness_grace_elapses() {
        let mut health = HealthSupervisor::new(Duration::from_millis(500));
        let t0 = Instant::now();
        health.set_static_complete(true);
        health.set_dynamic_complete(true);
        health.record_successful_update(t0);

        assert!(health.is_operational(t0 + Duration::from_millis(500)));
        assert!(!health.is_operational(t0 + Duration::from_secs(7)));
    }
}
