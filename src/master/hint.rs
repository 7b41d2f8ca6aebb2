// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::frame::{FunctionCode, MAX_SLAVE_ID, SlaveId};

/// Per-address memory of the function code a slave last answered to.
///
/// Indexed directly by the slave address; `0` means "no hint".
#[derive(Debug, Clone)]
pub struct HintCache {
    codes: [u8; MAX_SLAVE_ID as usize + 1],
}

impl Default for HintCache {
    fn default() -> Self {
        Self {
            codes: [0; MAX_SLAVE_ID as usize + 1],
        }
    }
}

impl HintCache {
    #[must_use]
    pub fn get(&self, slave: SlaveId) -> Option<FunctionCode> {
        match self.codes.get(slave as usize) {
            Some(0) | None => None,
            Some(code) => Some(FunctionCode::new(*code)),
        }
    }

    pub fn set(&mut self, slave: SlaveId, function: FunctionCode) {
        if let Some(code) = self.codes.get_mut(slave as usize) {
            *code = function.value();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hint_per_address() {
        let mut hints = HintCache::default();
        assert_eq!(hints.get(5), None);
        hints.set(5, FunctionCode::ReadInputRegisters);
        hints.set(5, FunctionCode::ReadHoldingRegisters);
        assert_eq!(hints.get(5), Some(FunctionCode::ReadHoldingRegisters));
        assert_eq!(hints.get(6), None);
    }

    #[test]
    fn ignore_out_of_range_addresses() {
        let mut hints = HintCache::default();
        hints.set(250, FunctionCode::ReadInputRegisters);
        assert_eq!(hints.get(250), None);
    }
}
