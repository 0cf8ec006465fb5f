// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Downstream cache server — Modbus/TCP.
//!
//! MBAP framing, no CRC. Each accepted connection runs its own task and
//! is serialised internally, but connections run in parallel with each
//! other and with the poller.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use log::{error, info};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

use super::service::CacheService;
use crate::registers::CacheBackend;

/// Bind the downstream Modbus/TCP listener and serve `backend` forever.
/// Returns a join handle the caller can abort on shutdown.
pub async fn serve_tcp(address: &str, port: u16, backend: Arc<dyn CacheBackend>) -> Result<JoinHandle<()>> {
    let socket_addr: SocketAddr = format!("{address}:{port}")
        .parse()
        .with_context(|| format!("invalid downstream TCP bind address {address}:{port}"))?;
    let listener = TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("failed to bind downstream TCP listener on {socket_addr}"))?;
    info!("downstream Modbus/TCP cache server listening on {socket_addr}");

    let server = Server::new(listener);
    let service = CacheService::new(backend);

    let on_connected = move |stream, socket_addr| {
        let service = service.clone();
        async move { accept_tcp_connection(stream, socket_addr, move |_socket_addr| Ok(Some(service.clone()))) }
    };
    let on_process_error = |err| error!("downstream TCP cache server connection error: {err}");

    Ok(tokio::spawn(async move {
        if let Err(err) = server.serve(&on_connected, on_process_error).await {
            error!("downstream TCP cache server terminated: {err}");
        }
    }))
}
