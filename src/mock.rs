// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory bus with simulated slaves for the unit tests.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::{Mutex, MutexGuard};

use crate::codec::rtu::client::encode_read_response;
use crate::frame::*;
use crate::transport::Transport;

#[derive(Debug, Default)]
pub(crate) struct SimBus {
    registers: HashMap<(SlaveId, u8, Address), Word>,
    pending: Option<Vec<u8>>,
    transmitting: bool,
    pub sent: Vec<Vec<u8>>,
    pub transmit_log: Vec<bool>,
    pub sends_without_transmit: usize,
    pub received: usize,
    pub opened: usize,
    pub open_attempts: usize,
    pub closed: usize,
    pub fail_send: bool,
    pub fail_open: bool,
    pub corrupt_responses: bool,
}

impl SimBus {
    /// Let `slave` answer `function` at `register` with `value`.
    pub fn set(&mut self, slave: SlaveId, function: FunctionCode, register: Address, value: Word) {
        self.registers
            .insert((slave, function.value(), register), value);
    }

    pub fn get(&self, slave: SlaveId, function: FunctionCode, register: Address) -> Option<Word> {
        self.registers
            .get(&(slave, function.value(), register))
            .copied()
    }

    pub fn clear(&mut self) {
        self.registers.clear();
    }

    /// `(slave, function, start)` of every request sent so far.
    pub fn sent_requests(&self) -> Vec<(SlaveId, u8, Address)> {
        self.sent
            .iter()
            .map(|frame| (frame[0], frame[1], BigEndian::read_u16(&frame[2..4])))
            .collect()
    }

    fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let slave = frame[0];
        let function = FunctionCode::new(frame[1]);
        let start = BigEndian::read_u16(&frame[2..4]);
        let payload = BigEndian::read_u16(&frame[4..6]);
        match function {
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                let words = (0..payload)
                    .map(|i| self.get(slave, function, start.wrapping_add(i)))
                    .collect::<Option<Vec<_>>>()?;
                Some(encode_read_response(slave, function, &words))
            }
            FunctionCode::WriteSingleRegister => {
                self.get(slave, FunctionCode::ReadHoldingRegisters, start)?;
                self.set(slave, FunctionCode::ReadHoldingRegisters, start, payload);
                Some(frame.to_vec())
            }
            _ => None,
        }
    }
}

/// Cloneable handle; all clones share the same [`SimBus`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport(Arc<Mutex<SimBus>>);

impl MockTransport {
    pub fn bus(&self) -> MutexGuard<'_, SimBus> {
        self.0.lock()
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> io::Result<()> {
        let mut bus = self.bus();
        bus.open_attempts += 1;
        if bus.fail_open {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such UART"));
        }
        bus.opened += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.bus().closed += 1;
        Ok(())
    }

    fn set_transmit(&mut self, enabled: bool) -> io::Result<()> {
        let mut bus = self.bus();
        bus.transmitting = enabled;
        bus.transmit_log.push(enabled);
        Ok(())
    }

    fn send(&mut self, frame: &[u8], _timeout: Duration) -> io::Result<()> {
        let mut bus = self.bus();
        if bus.fail_send {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "line down"));
        }
        if !bus.transmitting {
            bus.sends_without_transmit += 1;
        }
        bus.sent.push(frame.to_vec());
        let mut response = bus.respond(frame);
        if bus.corrupt_responses {
            if let Some(last) = response.as_mut().and_then(|r| r.last_mut()) {
                *last ^= 0x01;
            }
        }
        bus.pending = response;
        Ok(())
    }

    fn receive(&mut self, max_len: usize, _timeout: Duration) -> io::Result<Vec<u8>> {
        let mut bus = self.bus();
        bus.received += 1;
        match bus.pending.take() {
            Some(mut response) => {
                response.truncate(max_len);
                Ok(response)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "no response")),
        }
    }
}
