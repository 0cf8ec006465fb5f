// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Watermark tracking and the per-unit plausibility filter.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use super::model::{RegisterTable, RegisterValue, Unit};

/// Applies the per-unit plausibility rule and tracks the
/// running count of rejected values ("bogus counter").
#[derive(Default)]
pub struct SanityFilter {
    bogus_count: AtomicU64,
}

impl SanityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bogus_count(&self) -> u64 {
        self.bogus_count.load(Ordering::Relaxed)
    }

    /// Offer a newly decoded value for `address` to the filter. On
    /// acceptance, writes `raw` into the register cell, marks it fetched,
    /// and updates its watermarks; returns `true`. On rejection, the cell
    /// and watermarks are left untouched, the bogus counter is
    /// incremented, and `false` is returned.
    pub fn accept(&self, table: &mut RegisterTable, address: u16, raw: RegisterValue, proposed_scaled: f32) -> bool {
        let Some(def) = table.def_at(address) else {
            // Caller is responsible for only offering identity addresses;
            // an unmapped address simply cannot be accepted.
            return false;
        };
        let unit = def.unit;
        let current = table.cell(address).map(|c| c.fetched).unwrap_or(false);
        let current_scaled = if current { table_read_scaled_immut(table, address) } else { 0.0 };

        let accepted = if !current {
            // Uninitialised cell: accept unconditionally.
            true
        } else {
            Self::plausible(unit, proposed_scaled, current_scaled)
        };

        if accepted {
            table.write_raw(address, raw);
            table.mark_fetched(address);
            table.update_watermarks(address, proposed_scaled);
        } else {
            debug!(
                "sanity rejection: address {address} unit {unit:?} proposed {proposed_scaled} current {current_scaled}"
            );
            self.bogus_count.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    fn plausible(unit: Unit, proposed: f32, current: f32) -> bool {
        match unit {
            Unit::Volt => (205.0..=265.0).contains(&proposed),
            Unit::Amp => (-150.0..=150.0).contains(&proposed),
            Unit::Watt | Unit::VoltAmp | Unit::Var => (-25_000.0..=25_000.0).contains(&proposed),
            Unit::Hertz => (40.0..=65.0).contains(&proposed),
            Unit::KilowattHour | Unit::KilovarHour => (proposed - current).abs() <= 30.0,
            Unit::PowerFactor | Unit::None => true,
        }
    }
}

/// Helper mirroring `RegisterTable::read_scaled` without requiring `&mut`,
/// since the filter only needs the already-stored value for the kWh delta
/// check and must not record an unexpected-read for a known address.
fn table_read_scaled_immut(table: &RegisterTable, address: u16) -> f32 {
    let Some(def) = table.def_at(address) else {
        return 0.0;
    };
    let Some(cell) = table.cell(address) else {
        return 0.0;
    };
    cell.raw.decode(def.encoding) * def.scale
}
