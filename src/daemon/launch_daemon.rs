// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon process lifecycle: wires the upstream dispatcher and
//! [`GatewayEngine`] together, spawns the poller and response-handler
//! tasks, and launches both downstream cache servers
//! against the shared cache.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use log::{error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_modbus::prelude::*;

use crate::config::{open_serial, GatewayConfig, SerialFraming};
use crate::engine::codec::UPSTREAM_SLAVE_ID;
use crate::engine::dispatcher::{Dispatcher, TransportKind, UpstreamResponse};
use crate::engine::{response_channel, spawn_engine_tasks, GatewayEngine};
use crate::registers::CacheBackend;
use crate::server::{serve_rtu, serve_tcp};

/// Owns every task the gateway spawns — the poller, the response
/// handler, and the two downstream cache servers — and coordinates their
/// shutdown.
pub struct Daemon {
    tasks: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Daemon {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build the upstream dispatcher and engine, spawn the poller and
    /// response-handler tasks, and start both downstream cache servers.
    ///
    /// A downstream cache server that fails to bind (e.g. no RTU serial
    /// device present) is logged and skipped rather than treated as
    /// fatal: the other personality and the upstream link keep serving
    /// the cache, matching the "nothing in the core is fatal" rule
    /// (nothing in the core is meant to be fatal). The upstream link itself is required; without it
    /// the cache would never populate, so a failure there aborts launch.
    pub async fn launch(&mut self, config: GatewayConfig) -> Result<()> {
        let (sender, receiver) = response_channel();
        let dispatcher = build_dispatcher(&config, sender).await?;
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let engine = Arc::new(GatewayEngine::new(poll_interval, dispatcher));

        let (poller, response_handler) =
            spawn_engine_tasks(engine.clone(), receiver, self.shutdown.clone());
        self.tasks.push(poller);
        self.tasks.push(response_handler);

        let backend: Arc<dyn CacheBackend> = engine.clone();

        match serve_tcp(&config.server_tcp_address, config.server_tcp_port, backend.clone()).await {
            Ok(handle) => self.tasks.push(handle),
            Err(err) => warn!("downstream TCP cache server not started: {err}"),
        }

        match SerialFraming::parse(&config.downstream_framing) {
            Ok(framing) => {
                match serve_rtu(&config.downstream_serial_device, config.downstream_baud, framing, backend).await {
                    Ok(handle) => self.tasks.push(handle),
                    Err(err) => warn!("downstream RTU cache server not started: {err}"),
                }
            }
            Err(err) => warn!("invalid downstream RTU framing '{}': {err}", config.downstream_framing),
        }

        Ok(())
    }

    /// Signal every spawned task to stop. The poller checks the shared
    /// flag cooperatively between ticks (it never blocks mid-tick); the
    /// response handler and both downstream servers spend most of their
    /// time suspended in I/O with nothing to poll, so they are aborted
    /// directly instead, matching their upstream's own `JoinHandle`-abort
    /// shutdown pattern.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Await every spawned task, tolerating the cancellation that
    /// [`Daemon::shutdown`] just triggered.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_cancelled() => {}
                Ok(Err(err)) => error!("daemon task panicked: {err}"),
                Err(_) => warn!("daemon task did not shut down within the timeout"),
            }
        }
        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the upstream dispatcher from `config.client_is_rtu`: a Modbus
/// RTU client over a serial device, or a Modbus/TCP client to
/// `target_ip:tcp_port`.
async fn build_dispatcher(config: &GatewayConfig, responses: mpsc::Sender<UpstreamResponse>) -> Result<Dispatcher> {
    if config.client_is_rtu {
        let framing = SerialFraming::parse(&config.upstream_framing)?;
        let port = open_serial(&config.upstream_serial_device, config.upstream_baud, framing).with_context(|| {
            format!(
                "failed to open upstream RTU serial device {}",
                config.upstream_serial_device
            )
        })?;
        let ctx = tokio_modbus::client::rtu::attach_slave(port, Slave(UPSTREAM_SLAVE_ID));
        Ok(Dispatcher::new(ctx, TransportKind::Rtu, responses))
    } else {
        let socket_addr: SocketAddr = format!("{}:{}", config.target_ip, config.tcp_port)
            .parse()
            .with_context(|| format!("invalid upstream address {}:{}", config.target_ip, config.tcp_port))?;
        let ctx = tokio_modbus::client::tcp::connect_slave(socket_addr, Slave(UPSTREAM_SLAVE_ID))
            .await
            .with_context(|| format!("failed to connect upstream Modbus/TCP at {socket_addr}"))?;
        Ok(Dispatcher::new(ctx, TransportKind::Tcp, responses))
    }
}
