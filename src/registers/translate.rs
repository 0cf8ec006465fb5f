// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Optional register translation layer: re-presents a backend
//! register table as a different meter model by mapping and transforming
//! source registers into destination registers on demand.
//!
//! The translator performs no I/O of its own; it only reads the backend
//! table (through the same mutex the engine already serialises cache
//! access with) and computes destination values on the fly.

use std::sync::{Arc, Mutex};

use super::model::{Encoding, RegisterDef, RegisterTable, RegisterValue, Width};

/// Something the downstream cache servers can read/write register
/// words from — either the backend table directly, or a [`Translator`]
/// sitting in front of it.
pub trait CacheSource: Send + Sync {
    /// Serve the downstream read path: see
    /// [`RegisterTable::read_words`](super::model::RegisterTable::read_words).
    fn read_words(&self, start: u16, count: u16) -> Vec<u16>;

    /// Serve a downstream FC6 write-through. Returns `true` if a register
    /// is defined at `address` and the local cell was updated.
    fn write_single(&self, address: u16, value: u16) -> bool;
}

/// A [`CacheSource`] that can also report its operational status, which
/// the downstream cache servers consult before replying to a read.
pub trait CacheBackend: CacheSource {
    fn is_operational(&self) -> bool;
}

impl CacheSource for Arc<Mutex<RegisterTable>> {
    fn read_words(&self, start: u16, count: u16) -> Vec<u16> {
        self.lock().expect("register table mutex poisoned").read_words(start, count)
    }

    fn write_single(&self, address: u16, value: u16) -> bool {
        let mut table = self.lock().expect("register table mutex poisoned");
        if table.def_at(address).is_none() {
            return false;
        }
        table.write_raw(address, RegisterValue::U16(value));
        true
    }
}

/// Maps a destination register table onto a backend table.
pub struct Translator {
    destination: Mutex<RegisterTable>,
    backend: Arc<Mutex<RegisterTable>>,
    /// Reports operational status of the backend this translator
    /// re-presents. The translation layer has no fetched-set of its own,
    /// so rather than guess at a separate notion of translated
    /// completeness it defers entirely to the backend's own health
    /// supervisor.
    operational: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Translator {
    pub fn new(
        destination_defs: Vec<RegisterDef>,
        backend: Arc<Mutex<RegisterTable>>,
        operational: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Self {
        Self {
            destination: Mutex::new(RegisterTable::new(destination_defs)),
            backend,
            operational,
        }
    }

    /// Resolve one destination register to a raw value by fetching,
    /// scaling, and transforming the backend register it maps to.
    fn compute_value(&self, def: &RegisterDef) -> RegisterValue {
        let zero = match def.width {
            Width::W16 => RegisterValue::U16(0),
            Width::W32 => RegisterValue::U32(0),
        };
        let Some(backend_address) = def.backend_address else {
            return zero;
        };
        let backend = self.backend.lock().expect("backend register table mutex poisoned");
        let Some(backend_def) = backend.def_at(backend_address) else {
            return zero;
        };
        let Some(cell) = backend.cell(backend_address) else {
            return zero;
        };
        let mut scaled = cell.raw.decode(backend_def.encoding) * backend_def.scale;
        if let Some(transform) = &def.transform {
            scaled = transform(&backend, scaled);
        }
        drop(backend);
        encode_value(def, scaled)
    }

    /// Recompute every destination cell from the backend, then serve the
    /// read through the (now up to date) destination table.
    fn refresh_destination(&self) {
        let addresses: Vec<u16> = {
            let destination = self.destination.lock().expect("destination mutex poisoned");
            destination.definitions().iter().map(|d| d.address).collect()
        };
        for address in addresses {
            let value = {
                let destination = self.destination.lock().expect("destination mutex poisoned");
                let def = destination.def_at(address).expect("address came from definitions()").clone();
                self.compute_value(&def)
            };
            let mut destination = self.destination.lock().expect("destination mutex poisoned");
            destination.write_raw(address, value);
        }
    }
}

fn encode_value(def: &RegisterDef, scaled: f32) -> RegisterValue {
    let pre_scale = if def.scale != 0.0 { scaled / def.scale } else { scaled };
    match def.encoding {
        Encoding::I16 => RegisterValue::U16(pre_scale.round() as i16 as u16),
        Encoding::U16 => RegisterValue::U16(pre_scale.round() as u16),
        Encoding::I32 => RegisterValue::U32((pre_scale.round() as i32) as u32),
        Encoding::U32 => RegisterValue::U32(pre_scale.round() as u32),
        Encoding::F32 => RegisterValue::U32(pre_scale.to_bits()),
    }
}

impl CacheSource for Translator {
    fn read_words(&self, start: u16, count: u16) -> Vec<u16> {
        self.refresh_destination();
        let mut destination = self.destination.lock().expect("destination mutex poisoned");
        destination.read_words(start, count)
    }

    fn write_single(&self, _address: u16, _value: u16) -> bool {
        // A write to a translated destination has no well-defined
        // backend counterpart, so it is rejected rather than silently
        // accepted.
        false
    }
}

impl CacheBackend for Translator {
    fn is_operational(&self) -> bool {
        (self.operational)()
    }
}
