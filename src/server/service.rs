// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-photoacoustic project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! The `tokio_modbus::server::Service` shared between the RTU and TCP
//! cache servers: both personalities serve the same three
//! function codes from the same [`CacheBackend`], so only the transport
//! bring-up differs between `server::rtu` and `server::tcp`.

use std::future;
use std::pin::Pin;
use std::sync::Arc;

use log::warn;
use tokio_modbus::prelude::*;
use tokio_modbus::server::Service;

use crate::registers::CacheBackend;

/// Serves FC3/FC4/FC6 from a shared [`CacheBackend`].
///
/// Cloning is cheap (`Arc` clone) since both the RTU and TCP listeners
/// hand out one of these per accepted connection.
#[derive(Clone)]
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
}

impl CacheService {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    fn handle_read(
        &self,
        addr: u16,
        cnt: u16,
        holding: bool,
    ) -> Pin<Box<dyn future::Future<Output = Result<Response, ExceptionCode>> + Send>> {
        if !self.backend.is_operational() {
            // A future that never resolved here used to wedge the
            // serve loop (it awaits `call`'s future before reading the
            // next frame), permanently killing the RTU server's single
            // forever-loop the first time it was hit cold. Return the
            // Modbus exception reserved for exactly this situation
            // instead, so the loop keeps serving subsequent requests.
            return Box::pin(future::ready(Err(ExceptionCode::GatewayTargetDeviceFailedToRespond)));
        }
        let words = self.backend.read_words(addr, cnt);
        let response = if holding {
            Response::ReadHoldingRegisters(words)
        } else {
            Response::ReadInputRegisters(words)
        };
        Box::pin(future::ready(Ok(response)))
    }

    fn handle_write(
        &self,
        addr: u16,
        value: u16,
    ) -> Pin<Box<dyn future::Future<Output = Result<Response, ExceptionCode>> + Send>> {
        if self.backend.write_single(addr, value) {
            Box::pin(future::ready(Ok(Response::WriteSingleRegister(addr, value))))
        } else {
            warn!("downstream write to undefined or 32-bit register {addr} rejected");
            Box::pin(future::ready(Err(ExceptionCode::IllegalDataAddress)))
        }
    }
}

impl Service for CacheService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn future::Future<Output = Result<Self::Response, Self::Exception>> + Send>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        match req {
            Request::ReadHoldingRegisters(addr, cnt) => self.handle_read(addr, cnt, true),
            Request::ReadInputRegisters(addr, cnt) => self.handle_read(addr, cnt, false),
            Request::WriteSingleRegister(addr, value) => self.handle_write(addr, value),
            other => {
                // Only FC3/FC4/FC6 are meaningful to this gateway.
                // Returning an exception (rather than a future that
                // never resolves) keeps the serve loop free to read the
                // next frame instead of hanging the connection (TCP) or
                // the whole server (RTU) forever.
                warn!("unsupported downstream request {other:?}, returning illegal-function exception");
                Box::pin(future::ready(Err(ExceptionCode::IllegalFunction)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{et112_dynamic_registers, RegisterTable};
    use std::sync::Mutex;

    struct FixedBackend {
        table: Mutex<RegisterTable>,
        operational: bool,
    }

    impl crate::registers::CacheSource for FixedBackend {
        fn read_words(&self, start: u16, count: u16) -> Vec<u16> {
            self.table.lock().unwrap().read_words(start, count)
        }

        fn write_single(&self, address: u16, value: u16) -> bool {
            let mut table = self.table.lock().unwrap();
            if table.kind_at(address) != crate::registers::AddrKind::Identity16 {
                return false;
            }
            table.write_raw(address, crate::registers::RegisterValue::U16(value));
            true
        }
    }

    impl CacheBackend for FixedBackend {
        fn is_operational(&self) -> bool {
            self.operational
        }
    }

    fn service(operational: bool) -> CacheService {
        let backend = FixedBackend {
            table: Mutex::new(RegisterTable::new(et112_dynamic_registers())),
            operational,
        };
        CacheService::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn non_operational_read_returns_gateway_exception_without_blocking() {
        let svc = service(false);
        let fut = svc.call(Request::ReadHoldingRegisters(0, 2));
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(50), fut)
            .await
            .expect("must resolve promptly so the serve loop can read the next frame");
        assert_eq!(outcome.unwrap_err(), ExceptionCode::GatewayTargetDeviceFailedToRespond);
    }

    #[tokio::test]
    async fn operational_read_returns_cached_words() {
        let svc = service(true);
        let response = svc.call(Request::ReadInputRegisters(0, 2)).await.unwrap();
        match response {
            Response::ReadInputRegisters(words) => assert_eq!(words.len(), 2),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_to_32bit_register_is_rejected() {
        let svc = service(true);
        let result = svc.call(Request::WriteSingleRegister(0, 42)).await;
        assert_eq!(result.unwrap_err(), ExceptionCode::IllegalDataAddress);
    }

    #[tokio::test]
    async fn unsupported_function_code_returns_illegal_function_without_blocking() {
        let svc = service(true);
        let fut = svc.call(Request::WriteMultipleRegisters(0, vec![1, 2].into()));
        let outcome = tokio::time::timeout(std::time::Duration::from_millis(50), fut)
            .await
            .expect("must resolve promptly so the serve loop can read the next frame");
        assert_eq!(outcome.unwrap_err(), ExceptionCode::IllegalFunction);
    }
}
