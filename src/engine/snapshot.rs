// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Atomic snapshot service: a consistent picture of the dynamic
//! register set plus the counters the telemetry surface reads.

use crate::registers::{baud_rate_kbps, RegisterClass, RegisterTable, RegisterValue, SanityFilter, Unit};

/// Identity address of the static RS-485 baud-rate-code register.
const BAUD_RATE_CODE_ADDRESS: u16 = 8193;

/// One formatted dynamic register, ready for the telemetry surface.
#[derive(Debug, Clone)]
pub struct RegisterSnapshotEntry {
    pub address: u16,
    pub description: &'static str,
    pub value: String,
    pub high: String,
    pub low: String,
}

/// Consistent picture of the whole engine state for observers, produced
/// under the same lock that guards register writes so no consumer ever
/// observes a half-updated 32-bit value.
#[derive(Debug, Clone)]
pub struct RegisterSnapshot {
    pub registers: Vec<RegisterSnapshotEntry>,
    pub unexpected_addresses: Vec<u16>,
    pub bogus_count: u64,
    pub upstream_baud_rate_code: Option<u16>,
    pub upstream_baud_rate_kbps: Option<f32>,
}

fn format_value(value: f32, unit: Unit) -> String {
    let suffix = unit.suffix();
    if suffix.is_empty() {
        format!("{value}")
    } else {
        format!("{value} {suffix}")
    }
}

/// Build a [`RegisterSnapshot`] from the current cache state. The caller
/// is expected to hold the engine's single mutex for the duration of this
/// call (see [`crate::engine::GatewayEngine`]).
pub fn take_snapshot(table: &mut RegisterTable, sanity: &SanityFilter) -> RegisterSnapshot {
    let dynamic_addresses = table.addresses_in_class(RegisterClass::Dynamic);
    let mut registers = Vec::with_capacity(dynamic_addresses.len());
    for address in dynamic_addresses {
        let def = table.def_at(address).expect("address came from addresses_in_class").clone();
        let value = table.read_scaled(address);
        let (high, low) = table
            .cell(address)
            .map(|cell| (cell.high, cell.low))
            .unwrap_or((f32::NEG_INFINITY, f32::INFINITY));
        registers.push(RegisterSnapshotEntry {
            address,
            description: def.description,
            value: format_value(value, def.unit),
            high: format_value(high, def.unit),
            low: format_value(low, def.unit),
        });
    }

    let upstream_baud_rate_code = table.is_fetched(BAUD_RATE_CODE_ADDRESS).then(|| {
        table
            .cell(BAUD_RATE_CODE_ADDRESS)
            .map(|cell| match cell.raw {
                RegisterValue::U16(v) => v,
                RegisterValue::U32(v) => v as u16,
            })
    }).flatten();

    RegisterSnapshot {
        registers,
        unexpected_addresses: table.unexpected_addresses().iter().copied().collect(),
        bogus_count: sanity.bogus_count(),
        upstream_baud_rate_code,
        upstream_baud_rate_kbps: upstream_baud_rate_code.and_then(baud_rate_kbps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::et112_dynamic_registers;

    #[test]
    fn snapshot_formats_voltage_with_unit_suffix() {
        let mut table = RegisterTable::new(et112_dynamic_registers());
        let sanity = SanityFilter::new();
        table.write_raw(0, RegisterValue::U32(2301));
        table.mark_fetched(0);
        table.update_watermarks(0, 230.1);

        let snapshot = take_snapshot(&mut table, &sanity);
        let voltage = snapshot.registers.iter().find(|r| r.address == 0).unwrap();
        assert_eq!(voltage.value, "230.1 V");
        assert_eq!(voltage.high, "230.1 V");
    }

    #[test]
    fn snapshot_reports_bogus_count_and_unexpected_addresses() {
        let mut table = RegisterTable::new(et112_dynamic_registers());
        let sanity = SanityFilter::new();
        table.read_raw(9999);
        let snapshot = take_snapshot(&mut table, &sanity);
        assert!(snapshot.unexpected_addresses.contains(&9999));
        assert_eq!(snapshot.bogus_count, 0);
    }
}
