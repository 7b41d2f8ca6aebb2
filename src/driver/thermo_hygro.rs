// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! XY-MD02 style temperature / humidity transmitter.

use std::time::Duration;

use super::*;

/// Temperature in tenths of °C, signed.
pub const REG_TEMPERATURE: Address = 0x0001;

/// Relative humidity in tenths of %RH. Not every model has it.
pub const REG_HUMIDITY: Address = 0x0002;

const PROBE_ORDER: [FunctionCode; 2] = [
    FunctionCode::ReadInputRegisters,
    FunctionCode::ReadHoldingRegisters,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermoHygroValues {
    pub temperature_c: f32,
    /// `None` if the device does not answer the humidity register.
    pub humidity_pct: Option<f32>,
}

impl ThermoHygroValues {
    #[must_use]
    pub const fn has_humidity(&self) -> bool {
        self.humidity_pct.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ThermoHygroDriver {
    timeout: Duration,
}

impl ThermoHygroDriver {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Read the temperature and, if available, the humidity.
    pub fn read(&self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Result<ThermoHygroValues> {
        let (function, raw) = read_one_of(bus, slave, &PROBE_ORDER, REG_TEMPERATURE, self.timeout)?;
        let temperature_c = f32::from(raw as i16) / 10.0;
        let humidity_pct = match bus.read_registers(slave, function, REG_HUMIDITY, 1, self.timeout) {
            Ok(words) => words.first().map(|raw| f32::from(*raw) / 10.0),
            Err(err) => {
                log::debug!("Slave {slave} has no humidity register: {err}");
                None
            }
        };
        Ok(ThermoHygroValues {
            temperature_c,
            humidity_pct,
        })
    }
}

impl Driver for ThermoHygroDriver {
    fn name(&self) -> &'static str {
        "XY_MD02"
    }

    fn handles(&self, sensor_type: SensorType) -> bool {
        matches!(
            sensor_type,
            SensorType::ThermoHygro | SensorType::Temperature | SensorType::Humidity
        )
    }

    fn identity(&self) -> (SensorType, SensorSubtype) {
        (SensorType::ThermoHygro, SensorSubtype::None)
    }

    fn probe(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Option<u8> {
        read_one_of(bus, slave, &PROBE_ORDER, REG_TEMPERATURE, self.timeout)
            .ok()
            .map(|(function, _)| function.value())
    }

    fn read_values(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Result<DriverValues> {
        self.read(bus, slave).map(DriverValues::ThermoHygro)
    }
}
