// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;

use crate::frame::{Exception, FunctionCode, SlaveId};
use crate::registry::SensorType;

/// fieldbus-core Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Invalid slave address, register count or function code
    #[error("Invalid argument")]
    InvalidArgument,
    /// The transport failed to send a request
    #[error("Transport error: {0}")]
    Transport(io::ErrorKind),
    /// No (or an empty) response arrived in time
    #[error("Timeout")]
    Timeout,
    /// Length Mismatch
    #[error("Length mismatch: expected = {expected}, actual = {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// Invalid CRC
    #[error("Invalid CRC: expected = 0x{expected:0>4X}, actual = 0x{actual:0>4X}")]
    CrcMismatch { expected: u16, actual: u16 },
    /// The response came from another slave
    #[error("Address mismatch: expected = {expected}, actual = {actual}")]
    AddressMismatch { expected: SlaveId, actual: SlaveId },
    /// The response carries another function code
    #[error("Function mismatch: expected = 0x{expected:0>2X}, actual = 0x{actual:0>2X}")]
    FunctionMismatch { expected: u8, actual: u8 },
    /// Invalid byte count
    #[error("Invalid byte count: expected = {expected}, actual = {actual}")]
    ByteCountMismatch { expected: u8, actual: u8 },
    /// A write response does not echo the request
    #[error("Write response does not echo the request")]
    EchoMismatch,
    /// The slave answered with an exception response
    #[error("Exception response for function 0x{:0>2X}: {exception}", .function.value())]
    Exception {
        function: FunctionCode,
        exception: Exception,
    },
    /// The master has not been initialized
    #[error("Master not initialized")]
    NotInitialized,
    /// The calling thread does not hold a bus session
    #[error("No bus session held by the calling thread")]
    NoSession,
    /// The master is already borrowed by the calling thread
    #[error("Master is busy")]
    Busy,
}

impl Error {
    /// `true` for the failures detected while validating a response.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Transport(_)
                | Self::LengthMismatch { .. }
                | Self::CrcMismatch { .. }
                | Self::AddressMismatch { .. }
                | Self::FunctionMismatch { .. }
                | Self::ByteCountMismatch { .. }
                | Self::EchoMismatch
                | Self::Exception { .. }
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.kind())
    }
}

/// Failure to turn a configured sensor into measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No driver exists for this sensor type
    #[error("Sensor type {0:?} is not supported")]
    Unsupported(SensorType),
    /// The device answered but lacks what the configuration asks for
    #[error("Channel {channel} is configured as {sensor_type:?} but the device has no such capability")]
    Misconfigured {
        channel: u16,
        sensor_type: SensorType,
    },
    /// The bus transaction failed
    #[error(transparent)]
    Bus(#[from] Error),
}

/// Failure to load the bus configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// Slave addresses must be within `1..=247`
    #[error("Channel {channel}: invalid slave address {address}")]
    InvalidAddress { channel: u16, address: u8 },
}

pub type Result<T> = core::result::Result<T, Error>;
