// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The ET112 register catalogue.

use super::model::{Encoding, RegisterClass, RegisterDef, Unit};

/// Mandatory dynamic registers, polled every cycle.
pub fn et112_dynamic_registers() -> Vec<RegisterDef> {
    use RegisterClass::Dynamic;
    vec![
        RegisterDef::new(0, Encoding::I32, 0.1, Unit::Volt, "Voltage", Dynamic),
        RegisterDef::new(2, Encoding::I32, 0.001, Unit::Amp, "Current", Dynamic),
        RegisterDef::new(4, Encoding::I32, 0.1, Unit::Watt, "Active power", Dynamic),
        RegisterDef::new(6, Encoding::I32, 0.1, Unit::VoltAmp, "Apparent power", Dynamic),
        RegisterDef::new(8, Encoding::I32, 0.1, Unit::Var, "Reactive power", Dynamic),
        RegisterDef::new(10, Encoding::I32, 0.1, Unit::Watt, "Demand", Dynamic),
        RegisterDef::new(12, Encoding::I32, 0.1, Unit::Watt, "Demand peak", Dynamic),
        RegisterDef::new(14, Encoding::I16, 0.001, Unit::PowerFactor, "Power factor", Dynamic),
        RegisterDef::new(15, Encoding::I16, 0.1, Unit::Hertz, "Frequency", Dynamic),
        RegisterDef::new(16, Encoding::I32, 0.1, Unit::KilowattHour, "Import energy", Dynamic),
        RegisterDef::new(18, Encoding::I32, 0.1, Unit::KilovarHour, "Import reactive energy", Dynamic),
        RegisterDef::new(20, Encoding::I32, 0.1, Unit::KilowattHour, "Partial import", Dynamic),
        RegisterDef::new(22, Encoding::I32, 0.1, Unit::KilovarHour, "Partial reactive import", Dynamic),
        RegisterDef::new(32, Encoding::I32, 0.1, Unit::KilowattHour, "Export energy", Dynamic),
        RegisterDef::new(34, Encoding::I32, 0.1, Unit::KilovarHour, "Export reactive energy", Dynamic),
    ]
}

/// Static registers: polled until first success, then cached for the
/// process lifetime.
pub fn et112_static_registers() -> Vec<RegisterDef> {
    use RegisterClass::Static;
    let mut regs = vec![
        RegisterDef::new(11, Encoding::I16, 1.0, Unit::None, "Identification code", Static),
        RegisterDef::new(770, Encoding::U16, 1.0, Unit::None, "Version", Static),
        RegisterDef::new(771, Encoding::U16, 1.0, Unit::None, "Revision", Static),
        RegisterDef::new(4112, Encoding::U32, 1.0, Unit::None, "Demand integration time", Static),
        RegisterDef::new(4355, Encoding::I16, 1.0, Unit::None, "Measurement mode", Static),
        RegisterDef::new(8193, Encoding::U16, 1.0, Unit::None, "RS-485 baud-rate code", Static),
    ];
    for addr in 20480..=20486u16 {
        regs.push(RegisterDef::new(addr, Encoding::U16, 1.0, Unit::None, "Serial number word", Static));
    }
    regs
}

/// Maps the ET112's baud-rate code (register 8193, values 1..5) to the
/// line rate in kbps.
pub fn baud_rate_kbps(code: u16) -> Option<f32> {
    match code {
        1 => Some(9.6),
        2 => Some(19.2),
        3 => Some(38.4),
        4 => Some(57.6),
        5 => Some(115.2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_catalogue_has_expected_addresses() {
        let addrs: Vec<u16> = et112_dynamic_registers().iter().map(|d| d.address).collect();
        assert_eq!(
            addrs,
            vec![0, 2, 4, 6, 8, 10, 12, 14, 15, 16, 18, 20, 22, 32, 34]
        );
    }

    #[test]
    fn static_catalogue_includes_serial_number_words() {
        let addrs: Vec<u16> = et112_static_registers().iter().map(|d| d.address).collect();
        for addr in 20480..=20486u16 {
            assert!(addrs.contains(&addr));
        }
        assert!(addrs.contains(&8193));
    }

    #[test]
    fn baud_code_maps_to_known_rates() {
        assert_eq!(baud_rate_kbps(1), Some(9.6));
        assert_eq!(baud_rate_kbps(5), Some(115.2));
        assert_eq!(baud_rate_kbps(0), None);
        assert_eq!(baud_rate_kbps(6), None);
    }
}
