//! # Daemon Module
//!
//! Wires the three Modbus personalities together: builds the upstream
//! dispatcher and [`crate::engine::GatewayEngine`], spawns the poller and
//! response-handler tasks, and launches the downstream RTU/TCP
//! cache servers. Coordinates graceful shutdown across all of them.
//!
//! ## Usage
//!
//! ```no_run
//! use et112_cache_gateway::{config::GatewayConfig, daemon::launch_daemon::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = GatewayConfig::default();
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;
