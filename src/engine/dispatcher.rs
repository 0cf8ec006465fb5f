// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Upstream request dispatcher: picks the configured transport,
//! enforces per-transport queue depth, and delivers results to the
//! response handler over a channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::error::GatewayError;

/// Queue-depth cap for the Modbus/TCP upstream transport.
pub const TCP_QUEUE_DEPTH: usize = 6;
/// Queue-depth cap for the Modbus RTU upstream transport.
pub const RTU_QUEUE_DEPTH: usize = 10;
/// Per-request timeout applied only to the RTU transport.
pub const RTU_TIMEOUT: Duration = Duration::from_secs(1);

/// Which upstream link the dispatcher drives. The `tokio-modbus` client
/// type is the same either way; only the queue depth cap and timeout
/// policy differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Rtu,
    Tcp,
}

impl TransportKind {
    fn queue_depth_cap(self) -> usize {
        match self {
            TransportKind::Rtu => RTU_QUEUE_DEPTH,
            TransportKind::Tcp => TCP_QUEUE_DEPTH,
        }
    }
}

/// The outcome of one dispatched upstream request, tagged by what kind
/// of request it was so the response handler knows whether to apply the
/// result through the codec (reads) or just retire the token (writes;
/// per the documented no-rollback behaviour, a write failure is logged
/// only, never walked back into the cell the downstream already saw).
pub enum UpstreamOutcome {
    Read(Result<Vec<u16>, GatewayError>),
    Write(Result<(), GatewayError>),
}

/// A completed upstream request, delivered to the response-handler task.
pub struct UpstreamResponse {
    pub token: u32,
    pub outcome: UpstreamOutcome,
}

/// Dispatches upstream reads and downstream write-throughs over a single
/// upstream `tokio-modbus` client context, shared across the tasks it
/// spawns via a `tokio::sync::Mutex` (calls borrow the context mutably).
pub struct Dispatcher {
    ctx: Arc<AsyncMutex<Context>>,
    kind: TransportKind,
    outstanding: Arc<AtomicUsize>,
    responses: mpsc::Sender<UpstreamResponse>,
}

impl Dispatcher {
    pub fn new(ctx: Context, kind: TransportKind, responses: mpsc::Sender<UpstreamResponse>) -> Self {
        Self {
            ctx: Arc::new(AsyncMutex::new(ctx)),
            kind,
            outstanding: Arc::new(AtomicUsize::new(0)),
            responses,
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Current number of upstream calls this dispatcher has in flight.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Reserve one outstanding-request slot against the transport's
    /// queue-depth cap. Returns `false` without reserving anything if the
    /// cap is already reached; shared by `dispatch_read` and
    /// `dispatch_write` since the queue-depth gate applies to every
    /// dispatched request, reads and writes alike.
    fn try_reserve_slot(&self) -> bool {
        if self.outstanding.load(Ordering::Relaxed) >= self.kind.queue_depth_cap() {
            return false;
        }
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Dispatch a read holding-registers request for `token`. Spawns a
    /// task that awaits the client call and reports `(token, result)` on
    /// the response channel. Returns `false` without spawning anything if
    /// the transport's queue-depth cap is already reached; the scheduler
    /// will re-offer the same run next tick.
    pub fn dispatch_read(&self, token: u32, start: u16, count: u16) -> bool {
        if !self.try_reserve_slot() {
            return false;
        }

        let ctx = self.ctx.clone();
        let responses = self.responses.clone();
        let outstanding = self.outstanding.clone();
        let kind = self.kind;

        tokio::spawn(async move {
            let call = async {
                let mut ctx = ctx.lock().await;
                ctx.read_holding_registers(start, count).await
            };
            let outcome = if kind == TransportKind::Rtu {
                match tokio::time::timeout(RTU_TIMEOUT, call).await {
                    Ok(r) => r,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "upstream RTU read timed out",
                    )),
                }
            } else {
                call.await
            };

            let result = match outcome {
                Ok(Ok(words)) => Ok(words),
                Ok(Err(exception)) => Err(GatewayError::Protocol(exception.to_string())),
                Err(io_err) => Err(GatewayError::Transport(io_err.to_string())),
            };

            outstanding.fetch_sub(1, Ordering::Relaxed);
            let response = UpstreamResponse {
                token,
                outcome: UpstreamOutcome::Read(result),
            };
            if responses.send(response).await.is_err() {
                warn!("response handler channel closed; dropping upstream result for token {token}");
            }
        });
        true
    }

    /// Dispatch the upstream half of a downstream FC6 write-through for
    /// `token`, gated by the same queue-depth cap and RTU timeout as
    /// `dispatch_read`. The downstream echo response does not wait on
    /// this; a later failure here is logged only and reported on the
    /// response channel so the token is retired, per the documented
    /// no-rollback behaviour. Returns `false` without spawning anything
    /// if the transport's queue-depth cap is already reached; the caller
    /// is responsible for retiring the token it already recorded.
    pub fn dispatch_write(&self, token: u32, address: u16, value: u16) -> bool {
        if !self.try_reserve_slot() {
            return false;
        }

        let ctx = self.ctx.clone();
        let responses = self.responses.clone();
        let outstanding = self.outstanding.clone();
        let kind = self.kind;

        tokio::spawn(async move {
            let call = async {
                let mut ctx = ctx.lock().await;
                ctx.write_single_register(address, value).await
            };
            let outcome = if kind == TransportKind::Rtu {
                match tokio::time::timeout(RTU_TIMEOUT, call).await {
                    Ok(r) => r,
                    Err(_) => Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "upstream RTU write timed out",
                    )),
                }
            } else {
                call.await
            };

            let result = match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(exception)) => {
                    warn!("upstream write-through to {address} rejected: {exception}");
                    Err(GatewayError::Protocol(exception.to_string()))
                }
                Err(io_err) => {
                    warn!("upstream write-through to {address} failed: {io_err}");
                    Err(GatewayError::Transport(io_err.to_string()))
                }
            };

            outstanding.fetch_sub(1, Ordering::Relaxed);
            let response = UpstreamResponse {
                token,
                outcome: UpstreamOutcome::Write(result),
            };
            if responses.send(response).await.is_err() {
                warn!("response handler channel closed; dropping upstream write-through result for token {token}");
            }
        });
        true
    }
}
