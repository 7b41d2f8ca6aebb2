// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus configuration.
//!
//! ```json
//! {
//!   "session": { "policy": "per-session", "silence_level": "warn", "max_wait_ms": 500 },
//!   "timeouts": { "request_ms": 200, "ping_ms": 150 },
//!   "energy_map": { "function": "auto" },
//!   "sensors": [
//!     { "channel": 1, "address": 1, "type": "thermohygro" },
//!     { "channel": 3, "address": 10, "type": "energy", "subtype": "three-phase" }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::driver::EnergyRegisterMap;
use crate::error::ConfigError;
use crate::frame::{MAX_SLAVE_ID, MIN_SLAVE_ID};
use crate::registry::SensorEntry;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Response timeout of regular requests.
    pub request_ms: u64,
    /// Response timeout of each ping attempt.
    pub ping_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_ms: 200,
            ping_ms: 150,
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    #[must_use]
    pub const fn ping(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub session: SessionConfig,
    pub timeouts: Timeouts,
    pub energy_map: EnergyRegisterMap,
    pub sensors: Vec<SensorEntry>,
}

impl BusConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading bus configuration from {}", path.display());
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Reject sensors with a broadcast or reserved slave address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self
            .sensors
            .iter()
            .find(|entry| !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&entry.address))
        {
            Some(entry) => Err(ConfigError::InvalidAddress {
                channel: entry.channel,
                address: entry.address,
            }),
            None => Ok(()),
        }
    }
}

/// Source of the configured sensors, consulted once per poll cycle.
pub trait ConfigProvider {
    fn load_sensor_entries(&self) -> Result<Vec<SensorEntry>, ConfigError>;
}

impl ConfigProvider for BusConfig {
    fn load_sensor_entries(&self) -> Result<Vec<SensorEntry>, ConfigError> {
        self.validate()?;
        Ok(self.sensors.clone())
    }
}

/// Re-reads a JSON file on every call, so edits apply to the next cycle.
#[derive(Debug, Clone)]
pub struct JsonFile<P> {
    path: P,
}

impl<P: AsRef<Path>> JsonFile<P> {
    pub const fn new(path: P) -> Self {
        Self { path }
    }
}

impl<P: AsRef<Path>> ConfigProvider for JsonFile<P> {
    fn load_sensor_entries(&self) -> Result<Vec<SensorEntry>, ConfigError> {
        BusConfig::from_path(&self.path).map(|config| config.sensors)
    }
}
