// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Typed register definitions and the mutable cells they back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Storage width of a register: one or two 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W16,
    W32,
}

impl Width {
    /// Number of 16-bit words this width occupies on the wire.
    pub fn words(self) -> u16 {
        match self {
            Width::W16 => 1,
            Width::W32 => 2,
        }
    }
}

/// How the raw bits of a register cell are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl Encoding {
    fn width(self) -> Width {
        match self {
            Encoding::I16 | Encoding::U16 => Width::W16,
            Encoding::I32 | Encoding::U32 | Encoding::F32 => Width::W32,
        }
    }
}

/// Engineering unit tag used for formatting and the sanity filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
    Amp,
    Watt,
    VoltAmp,
    Var,
    KilowattHour,
    KilovarHour,
    Hertz,
    PowerFactor,
    None,
}

impl Unit {
    /// The canonical suffix used when formatting a scaled value, e.g.
    /// `"230.1 V"`.
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Amp => "A",
            Unit::Watt => "W",
            Unit::VoltAmp => "VA",
            Unit::Var => "var",
            Unit::KilowattHour => "kWh",
            Unit::KilovarHour => "kVArh",
            Unit::Hertz => "Hz",
            Unit::PowerFactor => "PF",
            Unit::None => "",
        }
    }
}

/// Whether a register is polled every cycle or only until first success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Dynamic,
    Static,
}

/// A pure function applied to a translated value after scaling. Receives
/// the backend register table (read-only, so sibling cells such as
/// import/export energy can be combined) and the scaled source value.
pub type TransformFn = Arc<dyn Fn(&RegisterTable, f32) -> f32 + Send + Sync>;

/// Immutable definition of one register, created at engine construction
/// and held for the engine's lifetime.
#[derive(Clone)]
pub struct RegisterDef {
    pub address: u16,
    pub width: Width,
    pub encoding: Encoding,
    pub scale: f32,
    pub unit: Unit,
    pub description: &'static str,
    pub class: RegisterClass,
    /// Translation attribute: the source register in the backend
    /// table this destination register is derived from. `None` for a
    /// plain (non-translated) register.
    pub backend_address: Option<u16>,
    /// Translation attribute: an optional pure transform applied
    /// after scaling.
    pub transform: Option<TransformFn>,
}

impl std::fmt::Debug for RegisterDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterDef")
            .field("address", &self.address)
            .field("width", &self.width)
            .field("encoding", &self.encoding)
            .field("scale", &self.scale)
            .field("unit", &self.unit)
            .field("description", &self.description)
            .field("class", &self.class)
            .field("backend_address", &self.backend_address)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl RegisterDef {
    pub fn new(
        address: u16,
        encoding: Encoding,
        scale: f32,
        unit: Unit,
        description: &'static str,
        class: RegisterClass,
    ) -> Self {
        Self {
            address,
            width: encoding.width(),
            encoding,
            scale,
            unit,
            description,
            class,
            backend_address: None,
            transform: None,
        }
    }

    /// Metric name derived from the description: lower-cased, parentheses
    /// and sign markers stripped, spaces replaced with underscores.
    pub fn metric_name(&self) -> String {
        self.description
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | '+' | '-'))
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect()
    }
}

/// Raw stored value of a register cell, sized to the register's width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterValue {
    U16(u16),
    U32(u32),
}

impl RegisterValue {
    pub fn width(self) -> Width {
        match self {
            RegisterValue::U16(_) => Width::W16,
            RegisterValue::U32(_) => Width::W32,
        }
    }

    /// Decode into an engineering value according to `encoding`, before
    /// scaling.
    pub(crate) fn decode(self, encoding: Encoding) -> f32 {
        match (self, encoding) {
            (RegisterValue::U16(raw), Encoding::I16) => raw as i16 as f32,
            (RegisterValue::U16(raw), Encoding::U16) => raw as f32,
            (RegisterValue::U32(raw), Encoding::I32) => raw as i32 as f32,
            (RegisterValue::U32(raw), Encoding::U32) => raw as f32,
            (RegisterValue::U32(raw), Encoding::F32) => f32::from_bits(raw),
            // Width mismatch between the stored cell and the register's
            // declared encoding cannot happen by construction (invariant 1);
            // fall back to zero rather than panic.
            _ => 0.0,
        }
    }
}

/// Mutable state for one register address: last accepted value plus its
/// watermarks.
#[derive(Debug, Clone)]
pub struct RegisterCell {
    pub raw: RegisterValue,
    pub high: f32,
    pub low: f32,
    /// Set once a value has actually been observed on the wire; used by
    /// the static-register completion tracking and by the sanity
    /// filter's "uninitialised" exception.
    pub fetched: bool,
}

impl RegisterCell {
    fn zeroed(width: Width) -> Self {
        Self {
            raw: match width {
                Width::W16 => RegisterValue::U16(0),
                Width::W32 => RegisterValue::U32(0),
            },
            high: f32::NEG_INFINITY,
            low: f32::INFINITY,
            fetched: false,
        }
    }
}

/// Resolved meaning of an address within a [`RegisterTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    /// Identity address of a 16-bit register.
    Identity16,
    /// Identity address of a 32-bit register.
    Identity32,
    /// Second word of the 32-bit register whose identity address is
    /// `parent`.
    SecondWord32 { parent: u16 },
    /// No register is defined at this address.
    Unmapped,
}

/// A table of register definitions and the cells that back them.
///
/// Definitions are immutable for the table's lifetime (invariant: created
/// once at construction). Cells are mutated in place and never removed.
pub struct RegisterTable {
    defs: Vec<RegisterDef>,
    index_by_address: HashMap<u16, usize>,
    cells: HashMap<u16, RegisterCell>,
    unexpected: HashSet<u16>,
}

impl RegisterTable {
    /// Build a table from a set of definitions. Definitions are sorted by
    /// address; `defs` must not contain overlapping address ranges
    /// (invariant 1), which is asserted in debug builds by
    /// [`RegisterTable::check_disjoint`].
    pub fn new(mut defs: Vec<RegisterDef>) -> Self {
        defs.sort_by_key(|d| d.address);
        debug_assert!(
            Self::check_disjoint(&defs),
            "register definitions must not overlap"
        );

        let mut index_by_address = HashMap::with_capacity(defs.len());
        let mut cells = HashMap::with_capacity(defs.len());
        for (idx, def) in defs.iter().enumerate() {
            index_by_address.insert(def.address, idx);
            cells.insert(def.address, RegisterCell::zeroed(def.width));
        }

        Self {
            defs,
            index_by_address,
            cells,
            unexpected: HashSet::new(),
        }
    }

    /// `true` iff every definition's address+width range is disjoint from
    /// every other (invariant 1). `defs` must already be sorted by address.
    fn check_disjoint(defs: &[RegisterDef]) -> bool {
        let mut end = None;
        for def in defs {
            if let Some(prev_end) = end {
                if def.address < prev_end {
                    return false;
                }
            }
            end = Some(def.address + def.width.words());
        }
        true
    }

    pub fn definitions(&self) -> &[RegisterDef] {
        &self.defs
    }

    pub fn def_at(&self, address: u16) -> Option<&RegisterDef> {
        self.index_by_address.get(&address).map(|&idx| &self.defs[idx])
    }

    /// Resolve what `address` means within this table.
    pub fn kind_at(&self, address: u16) -> AddrKind {
        if let Some(def) = self.def_at(address) {
            return match def.width {
                Width::W16 => AddrKind::Identity16,
                Width::W32 => AddrKind::Identity32,
            };
        }
        if address > 0 {
            if let Some(def) = self.def_at(address - 1) {
                if def.width == Width::W32 {
                    return AddrKind::SecondWord32 { parent: address - 1 };
                }
            }
        }
        AddrKind::Unmapped
    }

    /// Addresses of every register in this table, in class order.
    pub fn addresses_in_class(&self, class: RegisterClass) -> Vec<u16> {
        self.defs
            .iter()
            .filter(|d| d.class == class)
            .map(|d| d.address)
            .collect()
    }

    pub fn mark_fetched(&mut self, address: u16) {
        if let Some(cell) = self.cells.get_mut(&address) {
            cell.fetched = true;
        }
    }

    pub fn is_fetched(&self, address: u16) -> bool {
        self.cells.get(&address).map(|c| c.fetched).unwrap_or(false)
    }

    /// Read the raw stored half-word or full 32-bit value at `address`.
    /// Reads of unmapped addresses return zero and record the address in
    /// the unexpected-read set.
    pub fn read_raw(&mut self, address: u16) -> (Width, u32) {
        match self.kind_at(address) {
            AddrKind::Identity16 => {
                let cell = self.cells.get(&address).expect("cell exists for identity address");
                match cell.raw {
                    RegisterValue::U16(v) => (Width::W16, v as u32),
                    RegisterValue::U32(v) => (Width::W16, v & 0xFFFF),
                }
            }
            AddrKind::Identity32 => {
                let cell = self.cells.get(&address).expect("cell exists for identity address");
                match cell.raw {
                    RegisterValue::U32(v) => (Width::W32, v),
                    RegisterValue::U16(v) => (Width::W32, v as u32),
                }
            }
            AddrKind::SecondWord32 { parent } => {
                let cell = self.cells.get(&parent).expect("cell exists for parent address");
                let high = match cell.raw {
                    RegisterValue::U32(v) => (v >> 16) & 0xFFFF,
                    RegisterValue::U16(v) => v as u32,
                };
                (Width::W16, high)
            }
            AddrKind::Unmapped => {
                self.unexpected.insert(address);
                (Width::W16, 0)
            }
        }
    }

    /// Read the scaled engineering value at the identity address of a
    /// register. Per invariant 2, scale and encoding apply only when
    /// reading the identity address; calling this on the second word of a
    /// 32-bit register or an unmapped address yields `0.0` and records an
    /// unexpected read in the latter case.
    pub fn read_scaled(&mut self, address: u16) -> f32 {
        match self.kind_at(address) {
            AddrKind::Identity16 | AddrKind::Identity32 => {
                let def = self.def_at(address).expect("identity address has a definition");
                let encoding = def.encoding;
                let scale = def.scale;
                let cell = self.cells.get(&address).expect("cell exists");
                cell.raw.decode(encoding) * scale
            }
            AddrKind::SecondWord32 { .. } => 0.0,
            AddrKind::Unmapped => {
                self.unexpected.insert(address);
                0.0
            }
        }
    }

    /// Write accepted raw bits into the cell at `address`. Only called by
    /// the sanity filter after a proposed value passes the
    /// plausibility check, or by a downstream FC6 write-through.
    pub fn write_raw(&mut self, address: u16, value: RegisterValue) {
        if let Some(cell) = self.cells.get_mut(&address) {
            cell.raw = value;
            cell.fetched = true;
        }
    }

    pub fn cell(&self, address: u16) -> Option<&RegisterCell> {
        self.cells.get(&address)
    }

    pub fn update_watermarks(&mut self, address: u16, scaled: f32) {
        if let Some(cell) = self.cells.get_mut(&address) {
            cell.high = cell.high.max(scaled);
            cell.low = cell.low.min(scaled);
        }
    }

    pub fn unexpected_addresses(&self) -> &HashSet<u16> {
        &self.unexpected
    }

    /// The downstream read path: serialise `count` 16-bit words
    /// starting at `start`. A 32-bit register emits its two words in
    /// mid-endian order (low word first, then high word); if `count`
    /// straddles a 32-bit register only its first (low) word is emitted.
    pub fn read_words(&mut self, start: u16, count: u16) -> Vec<u16> {
        let mut out = Vec::with_capacity(count as usize);
        let mut addr = start;
        while out.len() < count as usize {
            match self.kind_at(addr) {
                AddrKind::Identity16 => {
                    let (_, bits) = self.read_raw(addr);
                    out.push(bits as u16);
                    addr = addr.wrapping_add(1);
                }
                AddrKind::Identity32 => {
                    let cell = self.cells.get(&addr).expect("cell exists");
                    let full = match cell.raw {
                        RegisterValue::U32(v) => v,
                        RegisterValue::U16(v) => v as u32,
                    };
                    let low = (full & 0xFFFF) as u16;
                    let high = ((full >> 16) & 0xFFFF) as u16;
                    out.push(low);
                    addr = addr.wrapping_add(1);
                    if out.len() < count as usize {
                        out.push(high);
                        addr = addr.wrapping_add(1);
                    }
                }
                AddrKind::SecondWord32 { parent } => {
                    let (_, bits) = self.read_raw_second_word(parent);
                    out.push(bits);
                    addr = addr.wrapping_add(1);
                }
                AddrKind::Unmapped => {
                    self.unexpected.insert(addr);
                    out.push(0);
                    addr = addr.wrapping_add(1);
                }
            }
        }
        out
    }

    fn read_raw_second_word(&mut self, parent: u16) -> (Width, u16) {
        let cell = self.cells.get(&parent).expect("cell exists for parent");
        let high = match cell.raw {
            RegisterValue::U32(v) => ((v >> 16) & 0xFFFF) as u16,
            RegisterValue::U16(v) => v,
        };
        (Width::W16, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> RegisterTable {
        RegisterTable::new(vec![
            RegisterDef::new(0, Encoding::I32, 0.1, Unit::Volt, "Voltage", RegisterClass::Dynamic),
            RegisterDef::new(14, Encoding::I16, 0.001, Unit::PowerFactor, "Power factor", RegisterClass::Dynamic),
            RegisterDef::new(15, Encoding::I16, 0.1, Unit::Hertz, "Frequency", RegisterClass::Dynamic),
        ])
    }

    #[test]
    fn addresses_disjoint_for_real_catalogue() {
        let dyn_regs = crate::registers::et112_dynamic_registers();
        assert!(RegisterTable::check_disjoint(&{
            let mut d = dyn_regs.clone();
            d.sort_by_key(|r| r.address);
            d
        }));
    }

    #[test]
    fn write_then_read_scaled_applies_scale() {
        let mut table = sample_table();
        table.write_raw(0, RegisterValue::U32(2301));
        assert_eq!(table.read_scaled(0), 230.1);
    }

    #[test]
    fn read_words_prefix_consistent() {
        let mut table = sample_table();
        table.write_raw(0, RegisterValue::U32(0x0001_0002)); // high=1, low=2
        table.write_raw(14, RegisterValue::U16(7));
        table.write_raw(15, RegisterValue::U16(500));

        let full = table.read_words(0, 4);
        let prefix = table.read_words(0, 2);
        assert_eq!(&full[..2], &prefix[..]);
        // mid-endian: low word first
        assert_eq!(full[0], 2);
        assert_eq!(full[1], 1);
        assert_eq!(full[2], 7);
        assert_eq!(full[3], 500);
    }

    #[test]
    fn straddling_32bit_register_emits_only_first_word() {
        let mut table = sample_table();
        table.write_raw(0, RegisterValue::U32(0x0001_0002));
        let words = table.read_words(0, 1);
        assert_eq!(words, vec![2]);
    }

    #[test]
    fn unmapped_read_records_unexpected_address() {
        let mut table = sample_table();
        let (_, bits) = table.read_raw(999);
        assert_eq!(bits, 0);
        assert!(table.unexpected_addresses().contains(&999));
    }

    #[test]
    fn metric_name_strips_punctuation_and_spaces() {
        let def = RegisterDef::new(0, Encoding::I32, 0.1, Unit::Watt, "Active Power (Import)", RegisterClass::Dynamic);
        assert_eq!(def.metric_name(), "active_power_import");
    }
}
