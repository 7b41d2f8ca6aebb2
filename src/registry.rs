// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configured sensors, their drivers and the measurements they produce.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::BusConfig;
use crate::driver::{Driver, DriverValues, EnergyMeterDriver, ThermoHygroDriver};
use crate::error::{DispatchError, Error, Result};
use crate::frame::{MAX_SLAVE_ID, MIN_SLAVE_ID, SlaveId};
use crate::session::Arbiter;
use crate::transport::Transport;

/// Kind of device connected to a channel.
///
/// Configuration files may use the Portuguese names as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    #[serde(alias = "energia")]
    Energy,
    #[serde(alias = "termohigrometro", alias = "termo-higrometro")]
    ThermoHygro,
    #[serde(alias = "temperatura")]
    Temperature,
    #[serde(alias = "umidade")]
    Humidity,
    #[serde(alias = "pressao")]
    Pressure,
    #[serde(alias = "vazao", alias = "fluxo")]
    Flow,
    Gps,
    #[serde(alias = "luz")]
    Light,
    Gas,
    #[serde(alias = "outro", alias = "outros")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorSubtype {
    #[default]
    None,
    #[serde(alias = "monofasico")]
    SinglePhase,
    #[serde(alias = "trifasico")]
    ThreePhase,
}

impl SensorSubtype {
    /// Number of phases a consumer should evaluate.
    ///
    /// Unknown installations are treated as three phase.
    #[must_use]
    pub const fn phase_count(self) -> usize {
        match self {
            Self::SinglePhase => 1,
            Self::None | Self::ThreePhase => 3,
        }
    }
}

/// A configured sensor. Channels identify entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SensorEntry {
    pub channel: u16,
    pub address: SlaveId,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    #[serde(default)]
    pub subtype: SensorSubtype,
}

/// The entry configured for `channel`.
#[must_use]
pub fn find_channel(entries: &[SensorEntry], channel: u16) -> Option<&SensorEntry> {
    entries.iter().find(|entry| entry.channel == channel)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MeasurementKind {
    /// Temperature in °C
    TempC,
    /// Relative humidity in %
    HumPct,
    /// RMS current of one phase in A
    CurrentRms,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub channel: u16,
    pub kind: MeasurementKind,
    pub value: f32,
}

impl Measurement {
    #[must_use]
    pub const fn new(channel: u16, kind: MeasurementKind, value: f32) -> Self {
        Self {
            channel,
            kind,
            value,
        }
    }
}

/// A device recognized at a previously unknown address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: SlaveId,
    pub driver: &'static str,
    /// The function code the device answered to.
    pub function: u8,
    pub sensor_type: SensorType,
    pub subtype: SensorSubtype,
}

/// Maps sensor entries to drivers and runs them on the shared bus.
#[derive(Debug)]
pub struct Registry<T> {
    arbiter: Arc<Arbiter<T>>,
    /// Probing priority: the first driver recognizing a device wins.
    drivers: Vec<Box<dyn Driver>>,
    max_wait: Duration,
    ping_timeout: Duration,
    errors: HashMap<u16, u32>,
}

impl<T: Transport> Registry<T> {
    /// Create a registry with the built-in drivers, temperature/humidity
    /// transmitter first.
    pub fn new(arbiter: Arc<Arbiter<T>>, config: &BusConfig) -> Self {
        let request_timeout = config.timeouts.request();
        let drivers: Vec<Box<dyn Driver>> = vec![
            Box::new(ThermoHygroDriver::new(request_timeout)),
            Box::new(EnergyMeterDriver::new(
                config.energy_map.clone(),
                request_timeout,
            )),
        ];
        Self::with_drivers(arbiter, config, drivers)
    }

    /// Create a registry with the given drivers in probing order.
    pub fn with_drivers(
        arbiter: Arc<Arbiter<T>>,
        config: &BusConfig,
        drivers: Vec<Box<dyn Driver>>,
    ) -> Self {
        Self {
            max_wait: arbiter.config().max_wait(),
            arbiter,
            drivers,
            ping_timeout: config.timeouts.ping(),
            errors: HashMap::new(),
        }
    }

    #[must_use]
    pub fn arbiter(&self) -> &Arc<Arbiter<T>> {
        &self.arbiter
    }

    /// Failed reads of `channel` since this registry was created.
    #[must_use]
    pub fn error_count(&self, channel: u16) -> u32 {
        self.errors.get(&channel).copied().unwrap_or(0)
    }

    /// Read one sensor and convert the values into measurements.
    pub fn dispatch_read(
        &mut self,
        entry: &SensorEntry,
    ) -> core::result::Result<Vec<Measurement>, DispatchError> {
        let Some(driver) = self
            .drivers
            .iter_mut()
            .find(|driver| driver.handles(entry.sensor_type))
        else {
            return Err(DispatchError::Unsupported(entry.sensor_type));
        };
        let values = self.arbiter.with_session(self.max_wait, |master| {
            driver.read_values(master, entry.address)
        })?;
        measurements(entry, values)
    }

    /// Read all entries in order.
    ///
    /// Failing entries are logged, counted per channel and skipped.
    pub fn poll_all(&mut self, entries: &[SensorEntry]) -> Vec<Measurement> {
        // One outer session for the whole cycle; the reads nest into it.
        let arbiter = Arc::clone(&self.arbiter);
        let _session = arbiter
            .session(self.max_wait)
            .map_err(|err| log::warn!("Polling without a bus session: {err}"))
            .ok();
        let mut measurements = Vec::new();
        for entry in entries {
            match self.dispatch_read(entry) {
                Ok(read) => measurements.extend(read),
                Err(err) => {
                    *self.errors.entry(entry.channel).or_default() += 1;
                    log::warn!(
                        "Channel {} ({:?} at {}): {err}",
                        entry.channel,
                        entry.sensor_type,
                        entry.address
                    );
                }
            }
        }
        measurements
    }

    /// Find out which kind of device answers at `address`.
    ///
    /// Drivers are asked in registration order. `Ok(None)` means that no
    /// driver recognized a device; an error means the bus could not be
    /// used at all.
    pub fn probe_unknown(&mut self, address: SlaveId) -> Result<Option<ProbeResult>> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&address) {
            return Err(Error::InvalidArgument);
        }
        let session = self.arbiter.session(self.max_wait)?;
        for driver in &mut self.drivers {
            let probed = session.master(|master| Ok(driver.probe(master, address)))?;
            let Some(function) = probed else {
                continue;
            };
            let (sensor_type, subtype) = driver.identity();
            log::info!(
                "Found {} at address {address} (function 0x{function:0>2X})",
                driver.name()
            );
            return Ok(Some(ProbeResult {
                address,
                driver: driver.name(),
                function,
                sensor_type,
                subtype,
            }));
        }
        Ok(None)
    }

    /// Scan `addresses` for the first energy meter.
    pub fn find_energy_address(
        &mut self,
        addresses: RangeInclusive<SlaveId>,
    ) -> Result<Option<SlaveId>> {
        let Some(energy) = self
            .drivers
            .iter_mut()
            .find(|driver| driver.handles(SensorType::Energy))
        else {
            return Ok(None);
        };
        let session = self.arbiter.session(self.max_wait)?;
        let valid = MIN_SLAVE_ID..=MAX_SLAVE_ID;
        for address in addresses.filter(|address| valid.contains(address)) {
            if session
                .master(|master| Ok(energy.probe(master, address)))?
                .is_some()
            {
                return Ok(Some(address));
            }
        }
        Ok(None)
    }

    /// Check whether any device answers at `address`.
    pub fn ping(&self, address: SlaveId) -> Result<u8> {
        self.arbiter
            .with_session(self.max_wait, |master| master.ping(address, self.ping_timeout))
    }
}

fn measurements(
    entry: &SensorEntry,
    values: DriverValues,
) -> core::result::Result<Vec<Measurement>, DispatchError> {
    let SensorEntry {
        channel,
        sensor_type,
        ..
    } = *entry;
    match values {
        DriverValues::Energy(values) => Ok(values
            .phase_currents_a
            .into_iter()
            .map(|value| Measurement::new(channel, MeasurementKind::CurrentRms, value))
            .collect()),
        DriverValues::ThermoHygro(values) => {
            if sensor_type == SensorType::Humidity && !values.has_humidity() {
                return Err(DispatchError::Misconfigured {
                    channel,
                    sensor_type,
                });
            }
            let mut measurements = Vec::with_capacity(2);
            if sensor_type != SensorType::Humidity {
                measurements.push(Measurement::new(
                    channel,
                    MeasurementKind::TempC,
                    values.temperature_c,
                ));
            }
            if let Some(humidity) = values.humidity_pct {
                if sensor_type != SensorType::Temperature {
                    measurements.push(Measurement::new(
                        channel,
                        MeasurementKind::HumPct,
                        humidity,
                    ));
                }
            }
            Ok(measurements)
        }
    }
}
