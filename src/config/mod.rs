// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration handling for the gateway.
//!
//! Provides functionality for loading, validating, and overriding the
//! settings the engine consumes, following the shape of the
//! `rust_photoacoustic` configuration layer: a `serde`-derived struct
//! loaded from YAML, with `Default` supplying every value named in the
//! external interface's configuration table.

mod gateway;

pub use gateway::{open_serial, GatewayConfig, Parity, SerialFraming};

use std::path::Path;

use crate::error::ConfigError;

/// Top-level application configuration.
///
/// Currently a thin wrapper around [`GatewayConfig`]; kept as its own
/// struct (rather than using `GatewayConfig` directly everywhere) so
/// additional top-level sections can be added later without changing the
/// engine's construction signature.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
}

impl Config {
    /// Load configuration from a YAML file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.gateway.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of a loaded (or default)
    /// configuration. Only `Some` values override the existing field.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        poll_interval_ms: Option<u64>,
        client_is_rtu: Option<bool>,
        target_ip: Option<String>,
        tcp_port: Option<u16>,
        server_tcp_port: Option<u16>,
    ) {
        if let Some(v) = poll_interval_ms {
            self.gateway.poll_interval_ms = v;
        }
        if let Some(v) = client_is_rtu {
            self.gateway.client_is_rtu = v;
        }
        if let Some(v) = target_ip {
            self.gateway.target_ip = v;
        }
        if let Some(v) = tcp_port {
            self.gateway.tcp_port = v;
        }
        if let Some(v) = server_tcp_port {
            self.gateway.server_tcp_port = v;
        }
    }
}

/// Print a human-readable description of every configuration key to
/// stdout, for the `--show-config-schema` CLI flag.
///
/// This crate has no outer HTTP API to document (unlike a typical
/// Rocket/OpenAPI surface), so rather than pull in `schemars`/`jsonschema`
/// for a single internal config struct, the schema is a small hand
/// written table.
pub fn print_config_schema() {
    println!("gateway.poll_interval_ms: u64 (default 500) — minimum inter-poll spacing, ms");
    println!("gateway.client_is_rtu: bool (default false) — upstream transport selector");
    println!("gateway.target_ip: string (default 127.0.0.1) — upstream Modbus/TCP host");
    println!("gateway.tcp_port: u16 (default 502) — upstream Modbus/TCP port");
    println!("gateway.upstream_serial_device: string — upstream RTU serial device path");
    println!("gateway.upstream_baud: u32 (default 9600) — upstream RTU baud rate");
    println!("gateway.upstream_framing: string (default 8N1) — upstream RTU framing");
    println!("gateway.server_tcp_port: u16 (default 502) — downstream Modbus/TCP listener port");
    println!("gateway.server_tcp_address: string (default 0.0.0.0) — downstream Modbus/TCP bind address");
    println!("gateway.downstream_serial_device: string — downstream RTU serial device path");
    println!("gateway.downstream_baud: u32 (default 9600) — downstream RTU baud rate");
    println!("gateway.downstream_framing: string (default 8N1) — downstream RTU framing");
    println!("gateway.downstream_rts_pin: optional u32 — GPIO line for RS-485 RTS toggle");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "gateway:\n  poll_interval_ms: 250\n  client_is_rtu: true\n"
        )
        .unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.gateway.poll_interval_ms, 250);
        assert!(config.gateway.client_is_rtu);
        // Fields absent from the file fall back to GatewayConfig::default().
        assert_eq!(config.gateway.tcp_port, 502);
    }

    #[test]
    fn rejects_missing_file() {
        assert!(Config::from_file("/nonexistent/path.yaml").is_err());
    }

    #[test]
    fn apply_args_only_overrides_some_fields() {
        let mut config = Config::default();
        config.apply_args(Some(1000), None, None, Some(1502), None);
        assert_eq!(config.gateway.poll_interval_ms, 1000);
        assert_eq!(config.gateway.tcp_port, 1502);
        assert!(!config.gateway.client_is_rtu);
    }
}
