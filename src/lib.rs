// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # ET112 Cache Gateway
//!
//! A caching Modbus gateway interposed between a single Carlo-Gavazzi
//! ET112 energy meter and one or more consumers (notably a Victron
//! CerboGX). It simultaneously acts as three Modbus personalities that
//! share one register cache: an upstream client (RTU or TCP) that polls
//! the meter, a downstream RTU server, and a downstream TCP server, both
//! replying from cache.
//!
//! ## Main Components
//!
//! - **registers**: Typed register definitions, mutable cells, the
//!   watermark/sanity filter, and the optional translation layer.
//! - **engine**: The cache engine proper — in-flight table, poll
//!   scheduler, upstream codec, request dispatcher, health supervisor,
//!   and snapshot service.
//! - **server**: The downstream RTU and TCP cache servers sharing one
//!   `tokio_modbus::server::Service` implementation.
//! - **config**: Configuration loading and validation.
//! - **daemon**: Process lifecycle — wires the engine and both
//!   downstream servers together and manages graceful shutdown.

/// Build and version information for the `--show-version` CLI flag.
pub mod build_info;

/// Configuration handling: the settings the engine consumes from the
/// external configuration store.
pub mod config;

/// Daemon process lifecycle: launches the poller, response handler, and
/// both downstream cache servers, and coordinates graceful shutdown.
pub mod daemon;

/// The Modbus cache engine: register model cache, in-flight table, poll
/// scheduler, upstream codec, request dispatcher, health supervisor, and
/// snapshot service.
pub mod engine;

/// Error taxonomy for configuration loading and the cache engine.
pub mod error;

/// Register definitions, mutable cells, the sanity filter, and the
/// optional translation layer.
pub mod registers;

/// Downstream Modbus RTU and TCP cache servers.
pub mod server;
