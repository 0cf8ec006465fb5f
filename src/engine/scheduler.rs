// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Poll scheduler: picks the active register set, batches it into
//! contiguous upstream read requests, and rate-limits ticks.

use std::time::{Duration, Instant};

use crate::engine::health::HealthSupervisor;
use crate::registers::{RegisterClass, RegisterTable};

/// Upper bound on the word count of a single batched upstream request.
pub const MAX_RUN_WORDS: u16 = 100;

/// Backpressure threshold: a tick is skipped entirely once this many
/// requests are already outstanding.
pub const BACKPRESSURE_DEPTH: usize = 2;

pub struct PollScheduler {
    poll_interval: Duration,
    last_poll_start: Option<Instant>,
}

impl PollScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            last_poll_start: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one tick of the contiguous-run scheduling algorithm. Returns the
    /// `(start, word_count)` runs to dispatch, or an empty vec if the
    /// tick is skipped (too soon, or backpressure).
    pub fn tick(
        &mut self,
        table: &RegisterTable,
        health: &HealthSupervisor,
        inflight_depth: usize,
        now: Instant,
    ) -> Vec<(u16, u16)> {
        if let Some(last) = self.last_poll_start {
            if now.duration_since(last) < self.poll_interval {
                return Vec::new();
            }
        }
        if inflight_depth > BACKPRESSURE_DEPTH {
            return Vec::new();
        }
        self.last_poll_start = Some(now);

        let active_set = if !health.static_complete() {
            table
                .addresses_in_class(RegisterClass::Static)
                .into_iter()
                .filter(|&addr| !table.is_fetched(addr))
                .collect::<Vec<_>>()
        } else {
            table.addresses_in_class(RegisterClass::Dynamic)
        };

        batch_contiguous_runs(table, &active_set)
    }
}

/// Partition `addresses` (already in ascending order) into contiguous
/// runs, breaking on a gap or once a run would exceed [`MAX_RUN_WORDS`].
fn batch_contiguous_runs(table: &RegisterTable, addresses: &[u16]) -> Vec<(u16, u16)> {
    let mut runs = Vec::new();
    let mut iter = addresses.iter().copied();
    let Some(mut run_start) = iter.next() else {
        return runs;
    };
    let mut run_words = words_at(table, run_start);
    let mut expected_next = run_start + run_words;

    for addr in iter {
        let width = words_at(table, addr);
        if addr == expected_next && run_words + width <= MAX_RUN_WORDS {
            run_words += width;
            expected_next = addr + width;
        } else {
            runs.push((run_start, run_words));
            run_start = addr;
            run_words = width;
            expected_next = addr + width;
        }
    }
    runs.push((run_start, run_words));
    runs
}

fn words_at(table: &RegisterTable, address: u16) -> u16 {
    table.def_at(address).map(|d| d.width.words()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{et112_dynamic_registers, et112_static_registers, RegisterTable};

    fn dynamic_table() -> RegisterTable {
        RegisterTable::new(et112_dynamic_registers())
    }

    fn already_operational_health() -> HealthSupervisor {
        let mut health = HealthSupervisor::new(Duration::from_millis(500));
        health.set_static_complete(true);
        health.set_dynamic_complete(true);
        health
    }

    #[test]
    fn contiguity_batching_matches_expected_two_runs() {
        let table = dynamic_table();
        let health = already_operational_health();
        let mut scheduler = PollScheduler::new(Duration::from_millis(500));
        let runs = scheduler.tick(&table, &health, 0, Instant::now());
        assert_eq!(runs, vec![(0, 24), (32, 4)]);
    }

    #[test]
    fn too_soon_since_last_tick_yields_no_runs() {
        let table = dynamic_table();
        let health = already_operational_health();
        let mut scheduler = PollScheduler::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert!(!scheduler.tick(&table, &health, 0, t0).is_empty());
        assert!(scheduler.tick(&table, &health, 0, t0 + Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn backpressure_skips_tick_with_three_outstanding() {
        let table = dynamic_table();
        let health = already_operational_health();
        let mut scheduler = PollScheduler::new(Duration::from_millis(500));
        let runs = scheduler.tick(&table, &health, 3, Instant::now());
        assert!(runs.is_empty());
    }

    #[test]
    fn static_set_prefers_unfetched_addresses() {
        let mut table = RegisterTable::new(et112_static_registers());
        table.mark_fetched(11);
        let health = HealthSupervisor::new(Duration::from_millis(500)); // neither set complete
        let mut scheduler = PollScheduler::new(Duration::from_millis(500));
        let runs = scheduler.tick(&table, &health, 0, Instant::now());
        let covered: Vec<u16> = runs.iter().map(|(start, _)| *start).collect();
        assert!(!covered.contains(&11), "already-fetched static register must be excluded");
    }
}
