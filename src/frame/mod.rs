// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use crate::error::{Error, Result};

/// Slave ID
pub type SlaveId = u8;

/// Lowest unicast slave address.
pub const MIN_SLAVE_ID: SlaveId = 1;

/// Highest unicast slave address.
pub const MAX_SLAVE_ID: SlaveId = 247;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process.
pub type Quantity = u16;

/// Maximum number of registers a single read request may ask for.
pub const MAX_READ_QUANTITY: Quantity = 125;

/// A Modbus function code.
///
/// It is represented by an unsigned 8 bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// Modbus Function Code: `03` (`0x03`).
    ReadHoldingRegisters,

    /// Modbus Function Code: `04` (`0x04`).
    ReadInputRegisters,

    /// Modbus Function Code: `06` (`0x06`).
    WriteSingleRegister,

    /// Modbus Function Code: `16` (`0x10`).
    WriteMultipleRegisters,

    /// Custom Modbus Function Code.
    Custom(u8),
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        match value {
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x06 => Self::WriteSingleRegister,
            0x10 => Self::WriteMultipleRegisters,
            code => FunctionCode::Custom(code),
        }
    }

    /// Get the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleRegisters => 0x10,
            Self::Custom(code) => code,
        }
    }
}

impl From<u8> for FunctionCode {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// A single register transaction issued by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    ReadHoldingRegisters(Address, Quantity),
    ReadInputRegisters(Address, Quantity),
    WriteSingleRegister(Address, Word),
}

impl Request {
    /// Create a register read for either `0x03` or `0x04`.
    pub fn read(function: FunctionCode, start: Address, count: Quantity) -> Result<Self> {
        match function {
            FunctionCode::ReadHoldingRegisters => Ok(Self::ReadHoldingRegisters(start, count)),
            FunctionCode::ReadInputRegisters => Ok(Self::ReadInputRegisters(start, count)),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Number of bytes of the complete RTU response frame.
    #[must_use]
    pub const fn response_len(&self) -> usize {
        match *self {
            Self::ReadHoldingRegisters(_, count) | Self::ReadInputRegisters(_, count) => {
                5 + count as usize * 2
            }
            Self::WriteSingleRegister(_, _) => 8,
        }
    }
}

impl From<Request> for FunctionCode {
    fn from(r: Request) -> Self {
        use Request as R;

        match r {
            R::ReadHoldingRegisters(_, _) => Self::ReadHoldingRegisters,
            R::ReadInputRegisters(_, _) => Self::ReadInputRegisters,
            R::WriteSingleRegister(_, _) => Self::WriteSingleRegister,
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
    Acknowledge = 0x05,
    ServerDeviceBusy = 0x06,
    MemoryParityError = 0x08,
    GatewayPathUnavailable = 0x0A,
    GatewayTargetDevice = 0x0B,
}

impl Exception {
    const fn get_name(self) -> &'static str {
        match self {
            Self::IllegalFunction => "Illegal function",
            Self::IllegalDataAddress => "Illegal data address",
            Self::IllegalDataValue => "Illegal data value",
            Self::ServerDeviceFailure => "Server device failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server device busy",
            Self::MemoryParityError => "Memory parity error",
            Self::GatewayPathUnavailable => "Gateway path unavailable",
            Self::GatewayTargetDevice => "Gateway target device failed to respond",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

/// A server (slave) exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: Exception,
}

impl From<ExceptionResponse> for Error {
    fn from(ex: ExceptionResponse) -> Self {
        let ExceptionResponse {
            function,
            exception,
        } = ex;
        Error::Exception {
            function,
            exception,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn function_code_into_u8() {
        let x: u8 = FunctionCode::WriteMultipleRegisters.value();
        assert_eq!(x, 16);
        let x: u8 = FunctionCode::Custom(0xBB).value();
        assert_eq!(x, 0xBB);
    }

    #[test]
    fn function_code_from_u8() {
        assert_eq!(FunctionCode::new(3), FunctionCode::ReadHoldingRegisters);
        assert_eq!(FunctionCode::new(4), FunctionCode::ReadInputRegisters);
        assert_eq!(FunctionCode::new(0xBB), FunctionCode::Custom(0xBB));
    }

    #[test]
    fn function_code_from_request() {
        use Request::*;
        let requests = &[
            (ReadInputRegisters(0, 1), 0x04),
            (ReadHoldingRegisters(0, 1), 0x03),
            (WriteSingleRegister(0, 0), 0x06),
        ];
        for (req, expected) in requests {
            let code: u8 = FunctionCode::from(*req).value();
            assert_eq!(*expected, code);
        }
    }

    #[test]
    fn read_request_only_for_read_functions() {
        assert_eq!(
            Request::read(FunctionCode::ReadInputRegisters, 1, 2).unwrap(),
            Request::ReadInputRegisters(1, 2)
        );
        assert_eq!(
            Request::read(FunctionCode::WriteSingleRegister, 1, 2).err(),
            Some(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_response_len() {
        assert_eq!(Request::ReadHoldingRegisters(0, 1).response_len(), 7);
        assert_eq!(Request::ReadInputRegisters(0, 125).response_len(), 255);
        assert_eq!(Request::WriteSingleRegister(0x12, 0x33).response_len(), 8);
    }
}
