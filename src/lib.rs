// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![doc = include_str!("../README.md")]

mod codec;
mod error;
mod frame;

pub mod config;
pub mod driver;
pub mod master;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod mock;

pub use codec::rtu;
pub use error::*;
pub use frame::*;

pub use self::master::{Master, RegisterBus};
pub use self::registry::{Measurement, MeasurementKind, Registry, SensorEntry};
pub use self::session::{Arbiter, Session};
pub use self::transport::Transport;
