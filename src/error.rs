// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy for the cache engine.
//!
//! These are kinds, not a single catch-all error: the taxonomy mirrors the
//! categories the engine must distinguish for telemetry and retry
//! decisions (transport vs. protocol vs. sanity rejection vs. stale
//! in-flight eviction). None of them is fatal to the process; the engine
//! logs, counts, and retries on the next poll tick instead of aborting.

use thiserror::Error;

/// Errors surfaced while the gateway engine talks to the upstream meter
/// or serves a downstream request.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Timeout, CRC mismatch, or TCP drop while talking to the upstream.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Modbus exception response, unit-id mismatch, or malformed frame.
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// A register address outside the known catalogue was requested.
    #[error("unexpected register address {0}")]
    UnexpectedAddress(u16),

    /// A downstream write targeted an address with no matching register.
    #[error("no register defined at address {0}")]
    UnknownRegister(u16),

    /// A proposed value was rejected by the sanity filter.
    #[error("sanity rejection at address {0}")]
    SanityRejected(u16),

    /// The in-flight entry for a token was purged (age or FIFO) before a
    /// response arrived.
    #[error("in-flight token {0} evicted before a response arrived")]
    InFlightEvicted(u32),

    /// The engine is not operational; downstream reads return no response
    /// rather than this error, but it is used internally for logging.
    #[error("engine is not operational")]
    NonOperational,
}

/// Errors raised while loading or validating [`crate::config::GatewayConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
