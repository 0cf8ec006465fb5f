// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Downstream cache servers: both personalities accept FC3/FC4/FC6
//! for unit id 1 and serve exclusively from the shared register cache,
//! never blocking on the upstream. `service` holds
//! the shared `tokio_modbus::server::Service` implementation; `rtu` and
//! `tcp` only differ in transport bring-up.

mod rtu;
mod service;
mod tcp;

pub use rtu::serve_rtu;
pub use service::CacheService;
pub use tcp::serve_tcp;
