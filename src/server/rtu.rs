// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Downstream cache server — Modbus RTU.
//!
//! Serial masters get the same three function codes as the TCP
//! personality; only the transport differs. A serial link
//! is point-to-point, so unlike the TCP personality there is exactly one connection, and
//! the per-connection task pattern the TCP personality uses is just the single serve loop.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use log::{error, info};
use tokio::task::JoinHandle;
use tokio_modbus::server::rtu::Server;

use super::service::CacheService;
use crate::config::{open_serial, SerialFraming};
use crate::registers::CacheBackend;

/// Open the downstream RTU serial device and serve `backend` forever.
/// Returns a join handle the caller can abort on shutdown.
pub async fn serve_rtu(
    device: &str,
    baud: u32,
    framing: SerialFraming,
    backend: Arc<dyn CacheBackend>,
) -> Result<JoinHandle<()>> {
    let port = open_serial(device, baud, framing)
        .with_context(|| format!("failed to open downstream RTU serial device {device}"))?;
    info!("downstream Modbus RTU cache server listening on {device} at {baud} baud");

    let service = CacheService::new(backend);
    let server = Server::new(port);

    Ok(tokio::spawn(async move {
        if let Err(err) = server.serve_forever(service).await {
            error!("downstream RTU cache server terminated: {err}");
        }
    }))
}
