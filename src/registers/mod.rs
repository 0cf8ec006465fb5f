// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register model, sanity filtering, and the optional translation layer.
//!
//! This is the register-model core: typed register definitions, the mutable
//! cells they back, the per-unit plausibility filter that guards writes
//! into those cells, and the stateless layer that can re-present one
//! register table as a different meter model.

mod catalogue;
mod model;
mod sanity;
mod translate;

pub use catalogue::{baud_rate_kbps, et112_dynamic_registers, et112_static_registers};
pub use model::{
    AddrKind, Encoding, RegisterCell, RegisterClass, RegisterDef, RegisterTable, RegisterValue,
    TransformFn, Unit, Width,
};
pub use sanity::SanityFilter;
pub use translate::{CacheBackend, CacheSource, Translator};
