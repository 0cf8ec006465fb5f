// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Upstream response decoding.
//!
//! Request encoding is just a standard Modbus function-3 read against a
//! fixed slave id, which `tokio-modbus`'s client already builds; this
//! module only implements the response side: walking the addresses an
//! in-flight entry covered and offering each decoded value to the sanity
//! filter.

use super::inflight::InFlightEntry;
use crate::registers::{AddrKind, RegisterTable, RegisterValue, SanityFilter};

/// Slave unit id the upstream client always addresses.
pub const UPSTREAM_SLAVE_ID: u8 = 1;

/// Apply a decoded word stream from an upstream read response to the
/// register table, offering each identity-address value to the sanity
/// filter. `words` is the payload `tokio-modbus` already decoded into
/// big-endian 16-bit words (word-order reassembly is handled by the
/// client); this function performs steps 2-3.
pub fn apply_response(table: &mut RegisterTable, sanity: &SanityFilter, entry: &InFlightEntry, words: &[u16]) {
    let mut idx = 0usize;
    let mut addr = entry.start;
    let limit = entry.start + entry.count;

    while addr < limit && idx < words.len() {
        match table.kind_at(addr) {
            AddrKind::Identity32 => {
                if idx + 1 >= words.len() {
                    break;
                }
                let low = words[idx] as u32;
                let high = words[idx + 1] as u32;
                let raw = RegisterValue::U32((high << 16) | low);
                let def = table.def_at(addr).expect("identity address has a definition");
                let scaled = raw.decode(def.encoding) * def.scale;
                sanity.accept(table, addr, raw, scaled);
                idx += 2;
                addr = addr.wrapping_add(2);
            }
            AddrKind::Identity16 => {
                let raw = RegisterValue::U16(words[idx]);
                let def = table.def_at(addr).expect("identity address has a definition");
                let scaled = raw.decode(def.encoding) * def.scale;
                sanity.accept(table, addr, raw, scaled);
                idx += 1;
                addr = addr.wrapping_add(1);
            }
            // Second word of a 32-bit register already consumed above, or
            // filler the batching included: skip without recording it as
            // an unexpected address.
            AddrKind::SecondWord32 { .. } | AddrKind::Unmapped => {
                idx += 1;
                addr = addr.wrapping_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{et112_dynamic_registers, RegisterTable};
    use std::time::Instant;

    fn entry(start: u16, count: u16) -> InFlightEntry {
        InFlightEntry {
            token: 1,
            start,
            count,
            sent_at: Instant::now(),
        }
    }

    #[test]
    fn decodes_mid_endian_32bit_value_into_scaled_cell() {
        let mut table = RegisterTable::new(et112_dynamic_registers());
        let sanity = SanityFilter::new();
        // Voltage 230.1V at scale 0.1 -> raw 2301 -> low=2301, high=0.
        apply_response(&mut table, &sanity, &entry(0, 2), &[2301, 0]);
        assert_eq!(table.read_scaled(0), 230.1);
        assert_eq!(sanity.bogus_count(), 0);
    }

    #[test]
    fn happy_path_batch_of_sixteen_words() {
        let mut table = RegisterTable::new(et112_dynamic_registers());
        let sanity = SanityFilter::new();
        // addr0 (32bit) = 2301 (230.1V), addr2 (32bit) = 532 (0.532A)
        apply_response(&mut table, &sanity, &entry(0, 4), &[2301, 0, 532, 0]);
        assert_eq!(table.read_scaled(0), 230.1);
        assert_eq!(table.read_scaled(2), 0.532);
    }

    #[test]
    fn sanity_rejection_leaves_prior_value_in_place() {
        let mut table = RegisterTable::new(et112_dynamic_registers());
        let sanity = SanityFilter::new();
        apply_response(&mut table, &sanity, &entry(0, 2), &[2301, 0]);
        // Implausible value: far outside the 205-265V plausibility band.
        apply_response(&mut table, &sanity, &entry(0, 2), &[0x423F, 0x000F]);
        assert_eq!(table.read_scaled(0), 230.1);
        assert_eq!(sanity.bogus_count(), 1);
    }
}
