// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drivers for the third-party RS-485 instruments found on the bus.

use std::fmt;

use crate::error::{Error, Result};
use crate::frame::{Address, FunctionCode, SlaveId};
use crate::master::RegisterBus;
use crate::registry::{SensorSubtype, SensorType};

mod energy;
mod thermo_hygro;

pub use self::energy::*;
pub use self::thermo_hygro::*;

/// Values read from one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverValues {
    ThermoHygro(ThermoHygroValues),
    Energy(EnergyValues),
}

/// Common surface of all device drivers.
pub trait Driver: fmt::Debug + Send {
    /// Short identifier reported by probing, e.g. `"XY_MD02"`.
    fn name(&self) -> &'static str;

    /// Whether sensors configured as `sensor_type` are read by this driver.
    fn handles(&self, sensor_type: SensorType) -> bool;

    /// How a device recognized by this driver gets registered.
    fn identity(&self) -> (SensorType, SensorSubtype);

    /// Check whether a device of this kind answers at `slave`.
    ///
    /// Returns the function code it answered to.
    fn probe(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Option<u8>;

    fn read_values(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Result<DriverValues>;
}

/// Read a single register, trying each function code in turn.
///
/// Returns the first function code that succeeded together with the value,
/// or the last error.
pub(crate) fn read_one_of(
    bus: &mut dyn RegisterBus,
    slave: SlaveId,
    functions: &[FunctionCode],
    register: Address,
    timeout: std::time::Duration,
) -> Result<(FunctionCode, u16)> {
    let mut last_err = Error::Timeout;
    for &function in functions {
        match bus.read_registers(slave, function, register, 1, timeout) {
            Ok(words) => {
                if let Some(word) = words.first() {
                    return Ok((function, *word));
                }
            }
            Err(err) => {
                log::debug!(
                    "Slave {slave}: function 0x{:0>2X} at 0x{register:0>4X} failed: {err}",
                    function.value()
                );
                last_err = err;
            }
        }
    }
    Err(last_err)
}
