// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Black-box integration test: a simulated ET112 meter behind a mock
//! Modbus/TCP server, a real [`Daemon`] polling it, and a real
//! Modbus/TCP client reading the gateway's own downstream cache.

use std::future::{self, Future};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use et112_cache_gateway::config::GatewayConfig;
use et112_cache_gateway::daemon::launch_daemon::Daemon;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_modbus::client::{tcp::connect, Reader};
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};

/// A stand-in ET112 meter: a flat 64k-word table, pre-seeded with
/// plausible values in the real meter's mid-endian layout (low word of
/// a 32-bit quantity first, each word big-endian internally — the same
/// layout `tokio-modbus` already hands back as a `Vec<u16>`).
#[derive(Clone)]
struct SimulatedMeter {
    words: Arc<Mutex<Vec<u16>>>,
}

impl SimulatedMeter {
    fn new() -> Self {
        let mut words = vec![0u16; 65536];
        // Voltage (addr 0-1), scale 0.1 -> 230.1V.
        words[0] = 2301;
        words[1] = 0;
        // Current (addr 2-3), scale 0.001 -> 0.532A.
        words[2] = 532;
        words[3] = 0;
        // Active power (addr 4-5), scale 0.1 -> 122.4W.
        words[4] = 1224;
        words[5] = 0;
        // Identification code (addr 11, static, I16).
        words[11] = 1;
        Self { words: Arc::new(Mutex::new(words)) }
    }
}

impl tokio_modbus::server::Service for SimulatedMeter {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Exception>> + Send>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let words = self.words.clone();
        match req {
            Request::ReadHoldingRegisters(addr, cnt) => {
                Box::pin(async move {
                    let table = words.lock().await;
                    let start = addr as usize;
                    let end = start + cnt as usize;
                    if end > table.len() {
                        return Err(ExceptionCode::IllegalDataAddress);
                    }
                    Ok(Response::ReadHoldingRegisters(table[start..end].to_vec()))
                })
            }
            Request::ReadInputRegisters(addr, cnt) => {
                Box::pin(async move {
                    let table = words.lock().await;
                    let start = addr as usize;
                    let end = start + cnt as usize;
                    if end > table.len() {
                        return Err(ExceptionCode::IllegalDataAddress);
                    }
                    Ok(Response::ReadInputRegisters(table[start..end].to_vec()))
                })
            }
            Request::WriteSingleRegister(addr, value) => {
                Box::pin(async move {
                    let mut table = words.lock().await;
                    table[addr as usize] = value;
                    Ok(Response::WriteSingleRegister(addr, value))
                })
            }
            _ => Box::pin(future::ready(Err(ExceptionCode::IllegalFunction))),
        }
    }
}

async fn spawn_simulated_meter() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;
    let server = Server::new(listener);
    let meter = SimulatedMeter::new();

    tokio::spawn(async move {
        let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
            let meter = meter.clone();
            async move { accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(meter.clone()))) }
        };
        let _ = server.serve(&on_connected, |_| {}).await;
    });

    Ok(local_addr)
}

/// Starts a simulated meter, points a real gateway daemon at it, and
/// reads the gateway's own downstream cache through a genuine Modbus/TCP
/// client once the poller has had a chance to populate it.
#[tokio::test]
async fn cached_reads_reflect_upstream_meter_values() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let meter_addr = spawn_simulated_meter().await?;

    let mut config = GatewayConfig::default();
    config.poll_interval_ms = 50;
    config.client_is_rtu = false;
    config.target_ip = meter_addr.ip().to_string();
    config.tcp_port = meter_addr.port();
    config.server_tcp_address = "127.0.0.1".to_string();
    config.server_tcp_port = 0;
    // Loopback has no serial devices; expect the RTU personality to log
    // a warning and simply not start, which is not fatal to the daemon.
    config.downstream_serial_device = "/dev/null-et112-test".to_string();

    // `serve_tcp` needs a concrete port, so reserve one the way a real
    // deployment would via its configuration file rather than port 0.
    let downstream_port = {
        let probe = TcpListener::bind("127.0.0.1:0").await?;
        probe.local_addr()?.port()
    };
    config.server_tcp_port = downstream_port;

    let mut daemon = Daemon::new();
    daemon.launch(config).await?;

    // Give the poller a few ticks to populate the dynamic registers.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let downstream_addr: SocketAddr = format!("127.0.0.1:{downstream_port}").parse()?;
    let mut ctx = connect(downstream_addr).await?;

    let voltage_words = ctx.read_holding_registers(0, 2).await??;
    let voltage_raw = (voltage_words[1] as u32) << 16 | voltage_words[0] as u32;
    let voltage = voltage_raw as f32 * 0.1;
    assert!((voltage - 230.1).abs() < 0.01, "unexpected voltage: {voltage}");

    let current_words = ctx.read_input_registers(2, 2).await??;
    let current_raw = (current_words[1] as u32) << 16 | current_words[0] as u32;
    let current = current_raw as f32 * 0.001;
    assert!((current - 0.532).abs() < 0.001, "unexpected current: {current}");

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

/// A read that arrives before the cache has completed its first poll
/// cycle must get a prompt "gateway target failed to respond" exception
/// rather than stale zeroed data — and, crucially, must not wedge the
/// connection: a second read right after must still get an answer.
#[tokio::test]
async fn non_operational_read_gets_gateway_exception_and_connection_stays_alive() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let meter_addr = spawn_simulated_meter().await?;

    let mut config = GatewayConfig::default();
    config.poll_interval_ms = 500;
    config.target_ip = meter_addr.ip().to_string();
    config.tcp_port = meter_addr.port();
    config.server_tcp_address = "127.0.0.1".to_string();
    let downstream_port = {
        let probe = TcpListener::bind("127.0.0.1:0").await?;
        probe.local_addr()?.port()
    };
    config.server_tcp_port = downstream_port;

    let mut daemon = Daemon::new();
    daemon.launch(config).await?;

    // Connect immediately, before the cache has had time to complete a
    // full poll cycle.
    let downstream_addr: SocketAddr = format!("127.0.0.1:{downstream_port}").parse()?;
    let mut ctx = connect(downstream_addr).await?;
    let first = tokio::time::timeout(Duration::from_millis(100), ctx.read_holding_registers(0, 2))
        .await
        .expect("non-operational reply must arrive promptly, not hang the connection")?;
    assert_eq!(first.unwrap_err(), ExceptionCode::GatewayTargetDeviceFailedToRespond);

    // The connection must still be alive for a subsequent request.
    let second = tokio::time::timeout(Duration::from_millis(100), ctx.read_holding_registers(0, 2))
        .await
        .expect("serve loop must keep reading frames after a non-operational reply")?;
    assert_eq!(second.unwrap_err(), ExceptionCode::GatewayTargetDeviceFailedToRespond);

    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}
