// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU client (master) specific functions.
use super::*;
use byteorder::BigEndian;

fn check_slave(slave: SlaveId) -> Result<()> {
    if (MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&slave) {
        Ok(())
    } else {
        Err(Error::InvalidArgument)
    }
}

/// Encode an RTU request.
pub fn encode_request(slave: SlaveId, req: Request) -> Result<[u8; REQUEST_FRAME_LEN]> {
    check_slave(slave)?;
    let (start, payload) = match req {
        Request::ReadHoldingRegisters(start, count) | Request::ReadInputRegisters(start, count) => {
            if count == 0 || count > MAX_READ_QUANTITY {
                return Err(Error::InvalidArgument);
            }
            (start, count)
        }
        Request::WriteSingleRegister(start, value) => (start, value),
    };
    let mut buf = [0; REQUEST_FRAME_LEN];
    buf[0] = slave;
    buf[1] = FunctionCode::from(req).value();
    BigEndian::write_u16(&mut buf[2..4], start);
    BigEndian::write_u16(&mut buf[4..6], payload);
    write_crc(&mut buf, 6);
    Ok(buf)
}

/// Build a `0x03` or `0x04` request.
pub fn build_read_request(
    slave: SlaveId,
    function: FunctionCode,
    start: Address,
    count: Quantity,
) -> Result<[u8; REQUEST_FRAME_LEN]> {
    encode_request(slave, Request::read(function, start, count)?)
}

/// Build a `0x06` request.
pub fn build_write_single(
    slave: SlaveId,
    start: Address,
    value: Word,
) -> Result<[u8; REQUEST_FRAME_LEN]> {
    encode_request(slave, Request::WriteSingleRegister(start, value))
}

/// Decode the registers of a read response.
///
/// The checks run in a fixed order and the first failing one is returned:
/// length, CRC, slave address, function code, byte count.
pub fn parse_read_response(
    adu: &[u8],
    slave: SlaveId,
    function: FunctionCode,
    count: Quantity,
) -> Result<Vec<Word>> {
    if count == 0 || count > MAX_READ_QUANTITY {
        return Err(Error::InvalidArgument);
    }
    let expected = 5 + count as usize * 2;
    if adu.len() != expected {
        if let Some(ex) = decode_exception(adu, slave, function) {
            return Err(ex.into());
        }
        return Err(Error::LengthMismatch {
            expected,
            actual: adu.len(),
        });
    }
    verify_crc(adu)?;
    if adu[0] != slave {
        return Err(Error::AddressMismatch {
            expected: slave,
            actual: adu[0],
        });
    }
    if adu[1] != function.value() {
        return Err(Error::FunctionMismatch {
            expected: function.value(),
            actual: adu[1],
        });
    }
    let byte_count = (count * 2) as u8;
    if adu[2] != byte_count {
        return Err(Error::ByteCountMismatch {
            expected: byte_count,
            actual: adu[2],
        });
    }
    Ok(adu[3..expected - 2]
        .chunks_exact(2)
        .map(BigEndian::read_u16)
        .collect())
}

/// Validate the echo of a write single register request.
pub fn parse_write_single_response(adu: &[u8], request: &[u8; REQUEST_FRAME_LEN]) -> Result<()> {
    let slave = request[0];
    let function = FunctionCode::new(request[1]);
    if adu.len() != REQUEST_FRAME_LEN {
        if let Some(ex) = decode_exception(adu, slave, function) {
            return Err(ex.into());
        }
        return Err(Error::LengthMismatch {
            expected: REQUEST_FRAME_LEN,
            actual: adu.len(),
        });
    }
    verify_crc(adu)?;
    if adu[0] != slave {
        return Err(Error::AddressMismatch {
            expected: slave,
            actual: adu[0],
        });
    }
    if adu[1] != request[1] {
        return Err(Error::FunctionMismatch {
            expected: request[1],
            actual: adu[1],
        });
    }
    if adu[2..6] != request[2..6] {
        return Err(Error::EchoMismatch);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn encode_read_response(slave: SlaveId, function: FunctionCode, words: &[Word]) -> Vec<u8> {
    let mut buf = vec![0; 5 + words.len() * 2];
    buf[0] = slave;
    buf[1] = function.value();
    buf[2] = (words.len() * 2) as u8;
    for (i, w) in words.iter().enumerate() {
        BigEndian::write_u16(&mut buf[3 + i * 2..], *w);
    }
    let len = buf.len() - 2;
    write_crc(&mut buf, len);
    buf
}
