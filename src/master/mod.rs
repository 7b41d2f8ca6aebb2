// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking Modbus RTU master.
//!
//! The master is not reentrant and does not lock anything itself: every
//! call assumes the caller holds the bus exclusively, normally through a
//! [`Session`](crate::session::Session).

use std::time::Duration;

use crate::codec::rtu::{REQUEST_FRAME_LEN, client};
use crate::error::{Error, Result};
use crate::frame::*;
use crate::transport::Transport;

mod hint;
mod ping;

pub use self::hint::HintCache;
pub use self::ping::PING_FALLBACK;

/// Register level access to the slaves on the bus.
///
/// Device drivers only need this, which keeps them independent of the
/// concrete transport.
pub trait RegisterBus {
    /// Read `count` registers with function `0x03` or `0x04`.
    fn read_registers(
        &mut self,
        slave: SlaveId,
        function: FunctionCode,
        start: Address,
        count: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>>;

    /// Write one holding register with function `0x06`.
    fn write_register(
        &mut self,
        slave: SlaveId,
        start: Address,
        value: Word,
        timeout: Duration,
    ) -> Result<()>;
}

/// Modbus RTU master on top of a half-duplex [`Transport`].
#[derive(Debug)]
pub struct Master<T> {
    transport: T,
    initialized: bool,
    hints: HintCache,
}

impl<T: Transport> Master<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            initialized: false,
            hints: HintCache::default(),
        }
    }

    /// Open the transport and park the line in receive mode.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.transport.open()?;
        self.transport.set_transmit(false)?;
        self.initialized = true;
        log::debug!("Modbus master initialized");
        Ok(())
    }

    /// Close the transport. The hint cache survives.
    pub fn deinit(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        self.transport.close()?;
        log::debug!("Modbus master deinitialized");
        Ok(())
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub const fn hints(&self) -> &HintCache {
        &self.hints
    }

    /// Read holding registers (`0x03`).
    pub fn read_holding(
        &mut self,
        slave: SlaveId,
        start: Address,
        count: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        self.read(slave, FunctionCode::ReadHoldingRegisters, start, count, timeout)
    }

    /// Read input registers (`0x04`).
    pub fn read_input(
        &mut self,
        slave: SlaveId,
        start: Address,
        count: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        self.read(slave, FunctionCode::ReadInputRegisters, start, count, timeout)
    }

    /// Read registers with either read function.
    pub fn read(
        &mut self,
        slave: SlaveId,
        function: FunctionCode,
        start: Address,
        count: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        let request = Request::read(function, start, count)?;
        let frame = client::encode_request(slave, request)?;
        let response = self.transact(&frame, request.response_len(), timeout)?;
        client::parse_read_response(&response, slave, function, count)
    }

    /// Write a single holding register (`0x06`).
    pub fn write_single(
        &mut self,
        slave: SlaveId,
        start: Address,
        value: Word,
        timeout: Duration,
    ) -> Result<()> {
        let request = client::build_write_single(slave, start, value)?;
        let response = self.transact(&request, request.len(), timeout)?;
        client::parse_write_single_response(&response, &request)
    }

    fn transact(
        &mut self,
        request: &[u8; REQUEST_FRAME_LEN],
        response_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        self.transport.set_transmit(true)?;
        let sent = self.transport.send(request, timeout);
        // Release the driver even if sending failed, otherwise the
        // transceiver keeps the bus occupied.
        let released = self.transport.set_transmit(false);
        if let Err(err) = sent {
            log::warn!("Failed to send request to slave {}: {err}", request[0]);
            return Err(err.into());
        }
        released?;
        match self.transport.receive(response_len, timeout) {
            Ok(response) if !response.is_empty() => Ok(response),
            Ok(_) => Err(Error::Timeout),
            Err(err) => {
                log::debug!("No response from slave {}: {err}", request[0]);
                Err(Error::Timeout)
            }
        }
    }
}

impl<T: Transport> RegisterBus for Master<T> {
    fn read_registers(
        &mut self,
        slave: SlaveId,
        function: FunctionCode,
        start: Address,
        count: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        self.read(slave, function, start, count, timeout)
    }

    fn write_register(
        &mut self,
        slave: SlaveId,
        start: Address,
        value: Word,
        timeout: Duration,
    ) -> Result<()> {
        self.write_single(slave, start, value, timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::mock::MockTransport;

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn master() -> (Master<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        let mut master = Master::new(transport.clone());
        master.init().unwrap();
        (master, transport)
    }

    #[test]
    fn read_holding_registers() {
        let (mut master, transport) = master();
        transport.bus().set(0x01, FunctionCode::ReadHoldingRegisters, 0x0000, 0x1234);
        transport.bus().set(0x01, FunctionCode::ReadHoldingRegisters, 0x0001, 0xABCD);
        assert_eq!(
            master.read_holding(0x01, 0x0000, 2, TIMEOUT).unwrap(),
            vec![0x1234, 0xABCD]
        );
        assert_eq!(
            transport.bus().sent[0],
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]
        );
    }

    #[test]
    fn read_input_registers() {
        let (mut master, transport) = master();
        transport.bus().set(0x0A, FunctionCode::ReadInputRegisters, 0x0001, 235);
        assert_eq!(master.read_input(0x0A, 0x0001, 1, TIMEOUT).unwrap(), vec![235]);
        assert!(master.read_holding(0x0A, 0x0001, 1, TIMEOUT).is_err());
    }

    #[test]
    fn toggle_direction_around_each_request() {
        let (mut master, transport) = master();
        transport.bus().set(0x01, FunctionCode::ReadHoldingRegisters, 0, 1);
        master.read_holding(0x01, 0, 1, TIMEOUT).unwrap();
        let _ = master.read_holding(0x02, 0, 1, TIMEOUT);
        // init parks the line, then assert/release per transaction
        assert_eq!(transport.bus().transmit_log, vec![false, true, false, true, false]);
        assert_eq!(transport.bus().sends_without_transmit, 0);
    }

    #[test]
    fn no_response_is_a_timeout() {
        let (mut master, _transport) = master();
        assert_eq!(
            master.read_holding(0x07, 0, 1, TIMEOUT).err(),
            Some(Error::Timeout)
        );
    }

    #[test]
    fn send_failure_aborts_with_transport_error() {
        let (mut master, transport) = master();
        transport.bus().set(0x01, FunctionCode::ReadHoldingRegisters, 0, 1);
        transport.bus().fail_send = true;
        assert_eq!(
            master.read_holding(0x01, 0, 1, TIMEOUT).err(),
            Some(Error::Transport(io::ErrorKind::BrokenPipe))
        );
        assert_eq!(transport.bus().transmit_log.last(), Some(&false));
        assert_eq!(transport.bus().received, 0);
    }

    #[test]
    fn validation_failures_are_not_retried() {
        let (mut master, transport) = master();
        transport.bus().set(0x01, FunctionCode::ReadHoldingRegisters, 0, 1);
        transport.bus().corrupt_responses = true;
        assert!(matches!(
            master.read_holding(0x01, 0, 1, TIMEOUT),
            Err(Error::CrcMismatch { .. })
        ));
        assert_eq!(transport.bus().sent.len(), 1);
    }

    #[test]
    fn surface_not_initialized() {
        let transport = MockTransport::default();
        let mut master = Master::new(transport.clone());
        assert_eq!(
            master.read_input(0x01, 0, 1, TIMEOUT).err(),
            Some(Error::NotInitialized)
        );
        assert_eq!(
            master.write_single(0x01, 0, 1, TIMEOUT).err(),
            Some(Error::NotInitialized)
        );
        assert!(transport.bus().sent.is_empty());
    }

    #[test]
    fn reject_invalid_arguments_before_sending() {
        let (mut master, transport) = master();
        assert_eq!(
            master.read_holding(0x00, 0, 1, TIMEOUT).err(),
            Some(Error::InvalidArgument)
        );
        assert_eq!(
            master.read_holding(0x01, 0, 0, TIMEOUT).err(),
            Some(Error::InvalidArgument)
        );
        assert!(transport.bus().sent.is_empty());
    }

    #[test]
    fn write_single_register() {
        let (mut master, transport) = master();
        transport.bus().set(0x12, FunctionCode::ReadHoldingRegisters, 0x2222, 0);
        master.write_single(0x12, 0x2222, 0xABCD, TIMEOUT).unwrap();
        assert_eq!(
            transport.bus().get(0x12, FunctionCode::ReadHoldingRegisters, 0x2222),
            Some(0xABCD)
        );
        assert_eq!(
            transport.bus().sent[0],
            vec![0x12, 0x06, 0x22, 0x22, 0xAB, 0xCD, 0x9F, 0xBE]
        );
    }

    #[test]
    fn init_and_deinit_are_idempotent() {
        let transport = MockTransport::default();
        let mut master = Master::new(transport.clone());
        master.init().unwrap();
        master.init().unwrap();
        assert_eq!(transport.bus().opened, 1);
        master.deinit().unwrap();
        master.deinit().unwrap();
        assert_eq!(transport.bus().closed, 1);
        assert!(!master.is_initialized());
    }
}
