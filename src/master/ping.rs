// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cheap liveness check of a slave whose register layout is unknown.

use std::time::Duration;

use super::Master;
use crate::error::{Error, Result};
use crate::frame::*;
use crate::transport::Transport;

/// Candidates tried when no hint exists or the hinted ones failed.
pub const PING_FALLBACK: [(FunctionCode, Address); 4] = [
    (FunctionCode::ReadHoldingRegisters, 0x0000),
    (FunctionCode::ReadInputRegisters, 0x0000),
    (FunctionCode::ReadInputRegisters, 0x0001),
    (FunctionCode::ReadHoldingRegisters, 0x0001),
];

impl<T: Transport> Master<T> {
    /// Check whether `slave` answers and return the function code it answered to.
    ///
    /// Each attempt reads a single register and waits at most `timeout`. A
    /// hinted function code from an earlier success is tried first at
    /// registers `0x0000` and `0x0001`, then the fixed [`PING_FALLBACK`]
    /// sequence. If the master turns out to be uninitialized it is
    /// re-initialized once per call.
    pub fn ping(&mut self, slave: SlaveId, timeout: Duration) -> Result<u8> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&slave) {
            return Err(Error::InvalidArgument);
        }
        let mut may_reinit = true;
        if let Some(function) = self.hints.get(slave) {
            let hinted = [(function, 0x0000), (function, 0x0001)];
            match self.try_candidates(slave, &hinted, timeout, &mut may_reinit) {
                Ok(function) => return Ok(function.value()),
                Err(err) => log::debug!("Hinted ping of slave {slave} failed: {err}"),
            }
        }
        self.try_candidates(slave, &PING_FALLBACK, timeout, &mut may_reinit)
            .map(FunctionCode::value)
    }

    /// Read one register per candidate until a slave answers.
    ///
    /// The first success is remembered as hint. Exhaustion yields the last
    /// error observed.
    pub(crate) fn try_candidates(
        &mut self,
        slave: SlaveId,
        candidates: &[(FunctionCode, Address)],
        timeout: Duration,
        may_reinit: &mut bool,
    ) -> Result<FunctionCode> {
        let mut last_err = Error::Timeout;
        for &(function, register) in candidates {
            let mut result = self.read(slave, function, register, 1, timeout);
            if result == Err(Error::NotInitialized) && std::mem::take(may_reinit) {
                log::warn!("Master not initialized while pinging slave {slave}, re-initializing");
                result = self
                    .init()
                    .and_then(|()| self.read(slave, function, register, 1, timeout));
            }
            match result {
                Ok(_) => {
                    log::debug!(
                        "Slave {slave} answered function 0x{:0>2X} at 0x{register:0>4X}",
                        function.value()
                    );
                    self.hints.set(slave, function);
                    return Ok(function);
                }
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const TIMEOUT: Duration = Duration::from_millis(10);

    const H: u8 = 0x03;
    const I: u8 = 0x04;

    fn master() -> (Master<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        let mut master = Master::new(transport.clone());
        master.init().unwrap();
        (master, transport)
    }

    #[test]
    fn fallback_sequence_without_hint() {
        let (mut master, transport) = master();
        assert_eq!(master.ping(0x05, TIMEOUT).err(), Some(Error::Timeout));
        assert_eq!(
            transport.bus().sent_requests(),
            vec![(0x05, H, 0x0000), (0x05, I, 0x0000), (0x05, I, 0x0001), (0x05, H, 0x0001)]
        );
        assert_eq!(master.hints().get(0x05), None);
    }

    #[test]
    fn hinted_function_is_tried_first() {
        let (mut master, transport) = master();
        transport.bus().set(0x05, FunctionCode::ReadInputRegisters, 0x0001, 250);
        assert_eq!(master.ping(0x05, TIMEOUT).unwrap(), 0x04);
        assert_eq!(
            master.hints().get(0x05),
            Some(FunctionCode::ReadInputRegisters)
        );

        transport.bus().sent.clear();
        assert_eq!(master.ping(0x05, TIMEOUT).unwrap(), 0x04);
        assert_eq!(
            transport.bus().sent_requests(),
            vec![(0x05, I, 0x0000), (0x05, I, 0x0001)]
        );
    }

    #[test]
    fn fall_back_when_hint_is_stale() {
        let (mut master, transport) = master();
        transport.bus().set(0x09, FunctionCode::ReadInputRegisters, 0x0000, 1);
        assert_eq!(master.ping(0x09, TIMEOUT).unwrap(), 0x04);

        transport.bus().clear();
        transport.bus().set(0x09, FunctionCode::ReadHoldingRegisters, 0x0001, 1);
        transport.bus().sent.clear();
        assert_eq!(master.ping(0x09, TIMEOUT).unwrap(), 0x03);
        assert_eq!(
            transport.bus().sent_requests(),
            vec![
                (0x09, I, 0x0000),
                (0x09, I, 0x0001),
                (0x09, H, 0x0000),
                (0x09, I, 0x0000),
                (0x09, I, 0x0001),
                (0x09, H, 0x0001)
            ]
        );
        assert_eq!(
            master.hints().get(0x09),
            Some(FunctionCode::ReadHoldingRegisters)
        );
    }

    #[test]
    fn reinitialize_once_when_not_initialized() {
        let transport = MockTransport::default();
        transport.bus().set(0x02, FunctionCode::ReadHoldingRegisters, 0x0000, 7);
        let mut master = Master::new(transport.clone());
        assert_eq!(master.ping(0x02, TIMEOUT).unwrap(), 0x03);
        assert!(master.is_initialized());
        assert_eq!(transport.bus().opened, 1);
        assert_eq!(transport.bus().sent_requests(), vec![(0x02, H, 0x0000)]);
    }

    #[test]
    fn reinitialize_failure_is_not_repeated() {
        let transport = MockTransport::default();
        transport.bus().fail_open = true;
        let mut master = Master::new(transport.clone());
        assert_eq!(master.ping(0x02, TIMEOUT).err(), Some(Error::NotInitialized));
        assert_eq!(transport.bus().open_attempts, 1);
        assert!(transport.bus().sent.is_empty());
    }

    #[test]
    fn return_last_error() {
        let (mut master, transport) = master();
        transport.bus().set(0x03, FunctionCode::ReadHoldingRegisters, 0x0001, 1);
        transport.bus().corrupt_responses = true;
        assert!(matches!(
            master.ping(0x03, TIMEOUT),
            Err(Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn reject_broadcast_address() {
        let (mut master, _) = master();
        assert_eq!(master.ping(0, TIMEOUT).err(), Some(Error::InvalidArgument));
    }
}
