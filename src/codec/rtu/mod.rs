// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU

use crate::error::{Error, Result};
use crate::frame::*;
use byteorder::{ByteOrder, LittleEndian};

pub mod client;

/// Size of every request frame this master emits.
pub const REQUEST_FRAME_LEN: usize = 8;

/// Length of an exception response: slave, function, code and CRC.
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// Calculate the CRC (Cyclic Redundancy Check) sum.
///
/// The result goes on the wire low byte first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for x in data {
        crc ^= u16::from(*x);
        for _ in 0..8 {
            // if we followed clippy's suggestion to move out the crc >>= 1, the condition may not be met any more
            // the recommended action therefore makes no sense and it is better to allow this lint
            #[allow(clippy::branches_sharing_code)]
            if (crc & 0x0001) != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the CRC of `buf[..len]` at `buf[len..len + 2]`.
pub(crate) fn write_crc(buf: &mut [u8], len: usize) {
    let crc = crc16(&buf[..len]);
    LittleEndian::write_u16(&mut buf[len..len + 2], crc);
}

/// Verify the trailing CRC of a complete ADU.
pub fn verify_crc(adu: &[u8]) -> Result<()> {
    if adu.len() < 3 {
        return Err(Error::LengthMismatch {
            expected: 3,
            actual: adu.len(),
        });
    }
    let (body, crc_buf) = adu.split_at(adu.len() - 2);
    let expected = LittleEndian::read_u16(crc_buf);
    let actual = crc16(body);
    if expected != actual {
        return Err(Error::CrcMismatch { expected, actual });
    }
    Ok(())
}

/// Decode an exception frame answering `function` from `slave`.
///
/// Returns `None` unless the frame is a CRC-valid exception response from
/// the expected slave for the expected function.
pub fn decode_exception(
    adu: &[u8],
    slave: SlaveId,
    function: FunctionCode,
) -> Option<ExceptionResponse> {
    if adu.len() != EXCEPTION_FRAME_LEN || verify_crc(adu).is_err() || adu[0] != slave {
        return None;
    }
    let rsp = ExceptionResponse::try_from(&adu[1..3]).ok()?;
    (rsp.function == function).then_some(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_crc16() {
        let msg = &[0x01, 0x03, 0x08, 0x2B, 0x00, 0x02];
        assert_eq!(crc16(msg), 0x63B6);

        let msg = &[0x01, 0x03, 0x04, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(crc16(msg), 0xF9FB);

        let msg = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(crc16(msg), 0x0A84);
    }

    #[test]
    fn crc_trailer_is_low_byte_first() {
        let buf = &mut [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        write_crc(buf, 6);
        assert_eq!(&buf[6..], &[0x84, 0x0A]);
        assert!(verify_crc(buf).is_ok());
    }

    #[test]
    fn detect_invalid_crc() {
        let buf = &[0x12, 0x06, 0x22, 0x22, 0xAB, 0xCD, 0x5F, 0xBE];
        assert_eq!(
            verify_crc(buf).err(),
            Some(Error::CrcMismatch {
                expected: 0xBE5F,
                actual: 0xBE9F
            })
        );
        assert!(verify_crc(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn decode_exception_frame() {
        let buf = &mut [0x0A, 0x84, 0x02, 0x00, 0x00];
        write_crc(buf, 3);
        let ex = decode_exception(buf, 0x0A, FunctionCode::ReadInputRegisters).unwrap();
        assert_eq!(ex.exception, Exception::IllegalDataAddress);

        assert!(decode_exception(buf, 0x0B, FunctionCode::ReadInputRegisters).is_none());
        assert!(decode_exception(buf, 0x0A, FunctionCode::ReadHoldingRegisters).is_none());
        buf[4] ^= 0x01;
        assert!(decode_exception(buf, 0x0A, FunctionCode::ReadInputRegisters).is_none());
    }
}
