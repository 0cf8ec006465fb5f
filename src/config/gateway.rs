// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Gateway configuration
//!
//! This module defines the structure the engine consumes from the external
//! configuration store. Link
//! bring-up itself — opening the serial port, setting RS-485 direction —
//! is out of scope for the core; this module only carries the settings
//! that bring-up needs plus the ones the engine reads directly
//! (`poll_interval_ms`, `client_is_rtu`).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Serial framing, parsed from a string such as `"8N1"` or `"8E1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialFraming {
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Default for SerialFraming {
    fn default() -> Self {
        Self {
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl SerialFraming {
    /// Parse a framing string of the form `<data_bits><parity><stop_bits>`,
    /// e.g. `"8N1"`, `"8E1"`, `"7O2"`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return Err(ConfigError::Invalid(format!(
                "invalid serial framing '{s}', expected e.g. '8N1'"
            )));
        }
        let data_bits = chars[0]
            .to_digit(10)
            .ok_or_else(|| ConfigError::Invalid(format!("invalid data bits in '{s}'")))?
            as u8;
        let parity = match chars[1].to_ascii_uppercase() {
            'N' => Parity::None,
            'E' => Parity::Even,
            'O' => Parity::Odd,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "invalid parity '{other}' in '{s}'"
                )))
            }
        };
        let stop_bits = chars[2]
            .to_digit(10)
            .ok_or_else(|| ConfigError::Invalid(format!("invalid stop bits in '{s}'")))?
            as u8;
        Ok(Self {
            data_bits,
            parity,
            stop_bits,
        })
    }

    fn data_bits(self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn parity(self) -> tokio_serial::Parity {
        match self.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }

    fn stop_bits(self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// Open a serial port for either the upstream or a downstream RTU link.
/// Link bring-up proper (choosing RS-485 direction control, retrying a
/// busy device) is handled by the caller before this is invoked; this is the
/// narrow contract of actually handing `tokio_modbus` a byte stream.
pub fn open_serial(device: &str, baud: u32, framing: SerialFraming) -> std::io::Result<tokio_serial::SerialStream> {
    let builder = tokio_serial::new(device, baud)
        .data_bits(framing.data_bits())
        .parity(framing.parity())
        .stop_bits(framing.stop_bits());
    tokio_serial::SerialStream::open(&builder)
}

/// Configuration for the Modbus cache gateway component.
///
/// Every field has a documented default; see [`GatewayConfig::default`].
///
/// # Example
///
/// ```
/// use et112_cache_gateway::config::GatewayConfig;
///
/// let config = GatewayConfig {
///     client_is_rtu: false,
///     target_ip: "192.168.1.50".to_string(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Minimum inter-poll spacing, in milliseconds.
    pub poll_interval_ms: u64,

    /// Selects the upstream transport: `true` for RTU (serial), `false`
    /// for Modbus/TCP.
    pub client_is_rtu: bool,

    /// Upstream Modbus/TCP endpoint address. Used when `client_is_rtu` is
    /// `false`.
    pub target_ip: String,

    /// Upstream Modbus/TCP endpoint port.
    pub tcp_port: u16,

    /// Serial device path for the upstream RTU link. Used when
    /// `client_is_rtu` is `true`. Link bring-up (opening the port) is
    /// external to the engine; this is merely the setting it is given.
    pub upstream_serial_device: String,

    /// Upstream RTU baud rate, in bits per second.
    pub upstream_baud: u32,

    /// Upstream RTU framing, e.g. `"8N1"`.
    pub upstream_framing: String,

    /// Downstream Modbus/TCP listener port.
    pub server_tcp_port: u16,

    /// Network address the downstream TCP listener binds to.
    pub server_tcp_address: String,

    /// Serial device path for the downstream RTU link.
    pub downstream_serial_device: String,

    /// Downstream RTU baud rate, in bits per second.
    pub downstream_baud: u32,

    /// Downstream RTU framing, e.g. `"8N1"`.
    pub downstream_framing: String,

    /// Optional GPIO line number driving the downstream RS-485
    /// transceiver's RTS/DE pin. `None` when flow control is handled by
    /// the UART itself or externally.
    pub downstream_rts_pin: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            client_is_rtu: false,
            target_ip: "127.0.0.1".to_string(),
            tcp_port: 502,
            upstream_serial_device: "/dev/ttyUSB0".to_string(),
            upstream_baud: 9_600,
            upstream_framing: "8N1".to_string(),
            server_tcp_port: 502,
            server_tcp_address: "0.0.0.0".to_string(),
            downstream_serial_device: "/dev/ttyUSB1".to_string(),
            downstream_baud: 9_600,
            downstream_framing: "8N1".to_string(),
            downstream_rts_pin: None,
        }
    }
}

impl GatewayConfig {
    /// Validate field combinations that `serde` alone cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        SerialFraming::parse(&self.upstream_framing)?;
        SerialFraming::parse(&self.downstream_framing)?;
        if self.tcp_port == 0 || self.server_tcp_port == 0 {
            return Err(ConfigError::Invalid(
                "TCP ports must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.poll_interval_ms, 500);
        assert!(!cfg.client_is_rtu);
        assert_eq!(cfg.tcp_port, 502);
        assert_eq!(cfg.server_tcp_port, 502);
        assert_eq!(cfg.upstream_baud, 9_600);
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn parses_framing_strings() {
        let f = SerialFraming::parse("8N1").unwrap();
        assert_eq!(f.data_bits, 8);
        assert_eq!(f.parity, Parity::None);
        assert_eq!(f.stop_bits, 1);

        let f = SerialFraming::parse("7E2").unwrap();
        assert_eq!(f.parity, Parity::Even);
        assert_eq!(f.stop_bits, 2);
    }

    #[test]
    fn rejects_malformed_framing() {
        assert!(SerialFraming::parse("8N").is_err());
        assert!(SerialFraming::parse("8X1").is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut cfg = GatewayConfig::default();
        cfg.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
