// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The half-duplex serial line underneath the master.

use std::io;
use std::time::Duration;

/// A half-duplex RS-485 line with an out-of-band driver enable (DE/RE) signal.
///
/// Implementations wrap the UART and the direction-control GPIO of the
/// target. The master drives the direction signal itself: it asserts it
/// before [`send`](Transport::send) and releases it afterwards, so
/// implementations must not toggle it on their own.
pub trait Transport: Send {
    /// Claim the UART and bring the line up.
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Release the UART.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Drive (`true`) or release (`false`) the transmitter.
    fn set_transmit(&mut self, enabled: bool) -> io::Result<()>;

    /// Write a complete frame and wait until it left the shift register.
    fn send(&mut self, frame: &[u8], timeout: Duration) -> io::Result<()>;

    /// Read up to `max_len` bytes, waiting at most `timeout`.
    ///
    /// Returning an empty buffer is treated like a timeout.
    fn receive(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> io::Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn set_transmit(&mut self, enabled: bool) -> io::Result<()> {
        (**self).set_transmit(enabled)
    }

    fn send(&mut self, frame: &[u8], timeout: Duration) -> io::Result<()> {
        (**self).send(frame, timeout)
    }

    fn receive(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        (**self).receive(max_len, timeout)
    }
}
