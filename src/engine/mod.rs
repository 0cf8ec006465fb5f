// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The Modbus cache engine: register table, in-flight table, and health state behind one mutex
//! (`GatewayEngine`), plus the poller and response-handler activities
//! that drive it.

pub mod codec;
pub mod dispatcher;
pub mod health;
pub mod inflight;
pub mod scheduler;
pub mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::registers::{
    et112_dynamic_registers, et112_static_registers, AddrKind, CacheBackend, CacheSource,
    RegisterClass, RegisterTable, RegisterValue, SanityFilter,
};
use dispatcher::{Dispatcher, UpstreamOutcome, UpstreamResponse};
use health::HealthSupervisor;
use inflight::InFlightTable;
use scheduler::PollScheduler;
use snapshot::RegisterSnapshot;

/// Capacity of the channel the dispatcher uses to deliver upstream
/// results to the response-handler task. Generous relative to the
/// transport queue-depth caps (6/10) so the channel itself is never the
/// bottleneck.
const RESPONSE_CHANNEL_CAPACITY: usize = 64;

/// Everything the single engine mutex guards: the register
/// table, the sanity filter's bogus counter, the in-flight table, and the
/// health supervisor's completion flags / staleness clock.
struct EngineState {
    table: RegisterTable,
    sanity: SanityFilter,
    inflight: InFlightTable,
    health: HealthSupervisor,
}

/// Owns the register table, the in-flight request table, and the health
/// supervisor behind one mutex, and is `Arc`-shared with the poller
/// task, the response-handler task, and both downstream server tasks.
pub struct GatewayEngine {
    state: Mutex<EngineState>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
}

impl GatewayEngine {
    /// Build the engine's register table from the ET112 catalogue and
    /// wrap the already-constructed upstream dispatcher.
    pub fn new(poll_interval: Duration, dispatcher: Dispatcher) -> Self {
        let mut defs = et112_dynamic_registers();
        defs.extend(et112_static_registers());
        let table = RegisterTable::new(defs);
        Self {
            state: Mutex::new(EngineState {
                table,
                sanity: SanityFilter::new(),
                inflight: InFlightTable::new(),
                health: HealthSupervisor::new(poll_interval),
            }),
            dispatcher,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_operational(&self) -> bool {
        let state = self.state.lock().expect("engine mutex poisoned");
        state.health.is_operational(Instant::now())
    }

    /// Atomic snapshot for observers.
    pub fn snapshot(&self) -> RegisterSnapshot {
        let mut state = self.state.lock().expect("engine mutex poisoned");
        snapshot::take_snapshot(&mut state.table, &state.sanity)
    }
}

impl CacheSource for GatewayEngine {
    fn read_words(&self, start: u16, count: u16) -> Vec<u16> {
        let mut state = self.state.lock().expect("engine mutex poisoned");
        state.table.read_words(start, count)
    }

    /// Downstream FC6 write-through: optimistically
    /// updates the local cell, then fires the equivalent upstream write
    /// through the same queue-depth gate, RTU timeout, and in-flight
    /// token bookkeeping as a dispatched read. A single Modbus write only
    /// carries one 16-bit word, so only plain 16-bit registers can be
    /// targeted this way; writing to the low word of a 32-bit register
    /// would otherwise leave the cell's high half stale and is rejected
    /// instead.
    fn write_single(&self, address: u16, value: u16) -> bool {
        let accepted = {
            let mut state = self.state.lock().expect("engine mutex poisoned");
            match state.table.kind_at(address) {
                AddrKind::Identity16 => {
                    state.table.write_raw(address, RegisterValue::U16(value));
                    true
                }
                _ => false,
            }
        };
        if accepted {
            let token = {
                let mut state = self.state.lock().expect("engine mutex poisoned");
                let token = state.inflight.issue();
                state.inflight.record(token, address, 1, Instant::now());
                token
            };
            if !self.dispatcher.dispatch_write(token, address, value) {
                // Transport queue depth cap reached; give back the slot,
                // same as a read that loses the race in `run_poller`.
                let mut state = self.state.lock().expect("engine mutex poisoned");
                state.inflight.resolve(token);
            }
        }
        accepted
    }
}

impl CacheBackend for GatewayEngine {
    fn is_operational(&self) -> bool {
        self.is_operational()
    }
}

/// Recompute the static/dynamic completion flags by set-equality with the
/// definition address sets.
fn update_completion_flags(state: &mut EngineState) {
    let static_complete = state
        .table
        .addresses_in_class(RegisterClass::Static)
        .iter()
        .all(|&addr| state.table.is_fetched(addr));
    let dynamic_complete = state
        .table
        .addresses_in_class(RegisterClass::Dynamic)
        .iter()
        .all(|&addr| state.table.is_fetched(addr));
    state.health.set_static_complete(static_complete);
    state.health.set_dynamic_complete(dynamic_complete);
}

/// The periodic poller activity: drives the scheduler every
/// sub-tick, dispatching whatever contiguous runs it emits.
pub async fn run_poller(engine: Arc<GatewayEngine>, shutdown: Arc<AtomicBool>) {
    let mut scheduler = PollScheduler::new(engine.poll_interval());
    // The scheduler's own rate limiting (step 1) is coarser than this;
    // ticking faster than `poll_interval` just lets it notice the
    // deadline promptly without busy-spinning.
    let mut ticker = tokio::time::interval(Duration::from_millis(50));

    while !shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;
        let now = Instant::now();

        let runs = {
            let mut state = engine.state.lock().expect("engine mutex poisoned");
            let purged = state.inflight.purge(now);
            for token in purged {
                debug!("purged stale in-flight token {token}");
            }
            let depth = state.inflight.depth();
            scheduler.tick(&state.table, &state.health, depth, now)
        };

        for (start, count) in runs {
            let token = {
                let mut state = engine.state.lock().expect("engine mutex poisoned");
                let token = state.inflight.issue();
                state.inflight.record(token, start, count, now);
                token
            };
            if !engine.dispatcher.dispatch_read(token, start, count) {
                // Transport queue depth cap reached; give back the slot,
                // the scheduler will re-offer this run next tick.
                let mut state = engine.state.lock().expect("engine mutex poisoned");
                state.inflight.resolve(token);
            }
        }
    }
}

/// The response-handler activity: consumes upstream results
/// off the dispatcher's channel and applies them to the register table.
pub async fn run_response_handler(engine: Arc<GatewayEngine>, mut responses: mpsc::Receiver<UpstreamResponse>) {
    while let Some(UpstreamResponse { token, outcome }) = responses.recv().await {
        let mut state = engine.state.lock().expect("engine mutex poisoned");
        let Some(entry) = state.inflight.resolve(token) else {
            debug!("no in-flight entry for token {token}; response arrived after purge or eviction");
            continue;
        };
        match outcome {
            UpstreamOutcome::Read(Ok(words)) => {
                codec::apply_response(&mut state.table, &state.sanity, &entry, &words);
                state.health.record_successful_update(Instant::now());
                update_completion_flags(&mut state);
            }
            UpstreamOutcome::Read(Err(err)) => {
                warn!("upstream read for token {token} (start={}, count={}) failed: {err}", entry.start, entry.count);
            }
            // No rollback on a failed write-through: the cell already
            // reflects the optimistic update the downstream write saw.
            UpstreamOutcome::Write(Ok(())) => {}
            UpstreamOutcome::Write(Err(err)) => {
                warn!("upstream write-through for token {token} (address={}) failed: {err}", entry.start);
            }
        }
    }
    info!("response handler channel closed; poller has no more results to consume");
}

/// Build the response channel pair the dispatcher and response handler
/// share.
pub fn response_channel() -> (mpsc::Sender<UpstreamResponse>, mpsc::Receiver<UpstreamResponse>) {
    mpsc::channel(RESPONSE_CHANNEL_CAPACITY)
}

/// Spawn the poller and response-handler tasks for a constructed engine.
/// Returns their join handles so the daemon can await them on shutdown.
pub fn spawn_engine_tasks(
    engine: Arc<GatewayEngine>,
    responses: mpsc::Receiver<UpstreamResponse>,
    shutdown: Arc<AtomicBool>,
) -> (JoinHandle<()>, JoinHandle<()>) {
    let poller = tokio::spawn(run_poller(engine.clone(), shutdown));
    let response_handler = tokio::spawn(run_response_handler(engine, responses));
    (poller, response_handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_single_rejects_32bit_identity_address() {
        // Address 0 (Voltage) is a 32-bit register; a single FC6 write
        // cannot update it without leaving a half stale.
        let defs = et112_dynamic_registers();
        let table = RegisterTable::new(defs);
        assert_eq!(table.kind_at(0), AddrKind::Identity32);
    }

    #[test]
    fn completion_flags_false_until_every_address_fetched() {
        let table = RegisterTable::new(et112_static_registers());
        let mut state = EngineState {
            table,
            sanity: SanityFilter::new(),
            inflight: InFlightTable::new(),
            health: HealthSupervisor::new(Duration::from_millis(500)),
        };
        update_completion_flags(&mut state);
        assert!(!state.health.static_complete());

        for addr in state.table.addresses_in_class(RegisterClass::Static) {
            state.table.write_raw(addr, RegisterValue::U16(0));
        }
        update_completion_flags(&mut state);
        assert!(state.health.static_complete());
    }
}
