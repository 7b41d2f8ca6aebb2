// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::frame::*;
use core::convert::TryFrom;

pub mod rtu;

impl TryFrom<u8> for Exception {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        use crate::frame::Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            _ => {
                return Err(code);
            }
        };
        Ok(ex)
    }
}

impl TryFrom<&[u8]> for ExceptionResponse {
    type Error = ();

    fn try_from(bytes: &[u8]) -> Result<Self, ()> {
        let [fn_err_code, code, ..] = *bytes else {
            return Err(());
        };
        if fn_err_code < 0x80 {
            return Err(());
        }
        let function = (fn_err_code - 0x80).into();
        let exception = Exception::try_from(code).map_err(|_| ())?;
        Ok(ExceptionResponse {
            function,
            exception,
        })
    }
}
