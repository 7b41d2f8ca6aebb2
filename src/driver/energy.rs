// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSY-MK-333 style energy meter.
//!
//! The meter's firmware variants expose the same values either as holding
//! or as input registers, so the function code is detected per slave and
//! pinned once a read succeeded.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use super::*;
use crate::frame::{MAX_SLAVE_ID, MIN_SLAVE_ID, Word};

/// Which read function the meter's registers are served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionSelect {
    /// Detect per slave, input registers first.
    #[default]
    Auto,
    Holding,
    Input,
}

impl FunctionSelect {
    const fn candidates(self) -> &'static [FunctionCode] {
        match self {
            Self::Auto => &[
                FunctionCode::ReadInputRegisters,
                FunctionCode::ReadHoldingRegisters,
            ],
            Self::Holding => &[FunctionCode::ReadHoldingRegisters],
            Self::Input => &[FunctionCode::ReadInputRegisters],
        }
    }
}

/// Register layout of the meter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnergyRegisterMap {
    pub function: FunctionSelect,
    /// Voltage in units of 0.1 V.
    pub voltage: Address,
    /// Current in units of 0.01 A.
    pub current: Address,
    /// Active power in units of 0.1 W.
    pub power: Address,
    /// Active energy in units of 0.01 kWh.
    pub energy: Address,
    /// First of three consecutive phase current registers, 0.01 A each.
    pub phase_currents: Address,
    /// High byte: slave address, low byte: serial line settings.
    pub comm_config: Address,
}

impl Default for EnergyRegisterMap {
    fn default() -> Self {
        Self {
            function: FunctionSelect::Auto,
            voltage: 0x0000,
            current: 0x0001,
            power: 0x0002,
            energy: 0x0003,
            phase_currents: 0x0103,
            comm_config: 0x0004,
        }
    }
}

impl EnergyRegisterMap {
    const fn basic(&self) -> [Address; 4] {
        [self.voltage, self.current, self.power, self.energy]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyValues {
    pub voltage_v: f32,
    pub current_a: f32,
    pub power_w: f32,
    pub energy_kwh: f32,
    /// RMS current of each phase in A.
    pub phase_currents_a: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct EnergyMeterDriver {
    map: EnergyRegisterMap,
    timeout: Duration,
    pinned: HashMap<SlaveId, FunctionCode>,
}

impl EnergyMeterDriver {
    #[must_use]
    pub fn new(map: EnergyRegisterMap, timeout: Duration) -> Self {
        Self {
            map,
            timeout,
            pinned: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn map(&self) -> &EnergyRegisterMap {
        &self.map
    }

    /// The function code detected for `slave`, if any.
    #[must_use]
    pub fn pinned_function(&self, slave: SlaveId) -> Option<FunctionCode> {
        self.pinned.get(&slave).copied()
    }

    fn function_for(&self, slave: SlaveId) -> FunctionCode {
        self.pinned_function(slave)
            .unwrap_or(self.map.function.candidates()[0])
    }

    /// Read the phase currents, voltage, current, power and energy.
    ///
    /// The phase current block is read first and pins the function code
    /// for the remaining registers.
    pub fn read(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Result<EnergyValues> {
        let phase_currents_a = self.read_phase_currents(bus, slave)?;
        let function = self.function_for(slave);
        let mut raw = [0u16; 4];
        for (value, register) in raw.iter_mut().zip(self.map.basic()) {
            *value = read_word(bus, slave, function, register, self.timeout)?;
        }
        let [voltage, current, power, energy] = raw;
        Ok(EnergyValues {
            voltage_v: f32::from(voltage) / 10.0,
            current_a: f32::from(current) / 100.0,
            power_w: f32::from(power) / 10.0,
            energy_kwh: f32::from(energy) / 100.0,
            phase_currents_a,
        })
    }

    /// Read the RMS currents of the three phases in A.
    ///
    /// Unused phases of a single phase installation read as zero.
    pub fn read_phase_currents(
        &mut self,
        bus: &mut dyn RegisterBus,
        slave: SlaveId,
    ) -> Result<[f32; 3]> {
        const HOLDING_FIRST: [FunctionCode; 2] = [
            FunctionCode::ReadHoldingRegisters,
            FunctionCode::ReadInputRegisters,
        ];
        let pinned;
        let candidates: &[FunctionCode] = match (self.pinned_function(slave), self.map.function) {
            (Some(function), _) => {
                pinned = [function];
                &pinned
            }
            (None, FunctionSelect::Auto) => &HOLDING_FIRST,
            (None, select) => select.candidates(),
        };
        let mut last_err = Error::Timeout;
        for &function in candidates {
            match bus.read_registers(slave, function, self.map.phase_currents, 3, self.timeout) {
                Ok(words) if words.len() == 3 => {
                    self.pinned.insert(slave, function);
                    return Ok([
                        f32::from(words[0]) / 100.0,
                        f32::from(words[1]) / 100.0,
                        f32::from(words[2]) / 100.0,
                    ]);
                }
                Ok(_) => last_err = Error::ByteCountMismatch { expected: 6, actual: 0 },
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }

    /// Assign a new slave address to the meter currently answering at `old`.
    ///
    /// The address shares one holding register with the serial settings;
    /// only its high byte is replaced. The meter keeps answering at `old`
    /// until it has been power cycled.
    pub fn change_address(
        &self,
        bus: &mut dyn RegisterBus,
        old: SlaveId,
        new: SlaveId,
    ) -> Result<()> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&new) {
            return Err(Error::InvalidArgument);
        }
        let register = self.map.comm_config;
        let current = read_word(
            bus,
            old,
            FunctionCode::ReadHoldingRegisters,
            register,
            self.timeout,
        )?;
        let updated = merge_address(current, new);
        bus.write_register(old, register, updated, self.timeout)?;
        log::info!("Energy meter {old} will answer at {new} after a power cycle");
        Ok(())
    }
}

fn read_word(
    bus: &mut dyn RegisterBus,
    slave: SlaveId,
    function: FunctionCode,
    register: Address,
    timeout: Duration,
) -> Result<Word> {
    bus.read_registers(slave, function, register, 1, timeout)?
        .first()
        .copied()
        .ok_or(Error::ByteCountMismatch {
            expected: 2,
            actual: 0,
        })
}

const fn merge_address(comm_config: Word, address: SlaveId) -> Word {
    ((address as Word) << 8) | (comm_config & 0x00FF)
}

impl Driver for EnergyMeterDriver {
    fn name(&self) -> &'static str {
        "JSY_MK_333"
    }

    fn handles(&self, sensor_type: SensorType) -> bool {
        sensor_type == SensorType::Energy
    }

    fn identity(&self) -> (SensorType, SensorSubtype) {
        // The number of connected phases cannot be detected.
        (SensorType::Energy, SensorSubtype::None)
    }

    fn probe(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Option<u8> {
        for &function in self.map.function.candidates() {
            let answered = self
                .map
                .basic()
                .into_iter()
                .any(|register| read_word(bus, slave, function, register, self.timeout).is_ok());
            if answered {
                self.pinned.insert(slave, function);
                return Some(function.value());
            }
        }
        None
    }

    fn read_values(&mut self, bus: &mut dyn RegisterBus, slave: SlaveId) -> Result<DriverValues> {
        self.read(bus, slave).map(DriverValues::Energy)
    }
}
