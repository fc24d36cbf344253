// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bind endpoint handlers to host attribute callbacks.
// Author: Lukas Bower

use cohesix_attrfs::{AttrError, BinAttr, TextAttr};

use crate::unit::UnitHandle;
use crate::{cbi, ro_msr, text};

/// Text attribute for the endpoint at `index` of the shared table.
pub struct TextNode {
    unit: UnitHandle,
    index: usize,
}

impl TextNode {
    /// Bind endpoint `index` on `unit`.
    pub fn new(unit: UnitHandle, index: usize) -> Self {
        Self { unit, index }
    }

    fn endpoint(&self) -> Result<&crate::endpoint::Endpoint, AttrError> {
        self.unit
            .table()
            .get(self.index)
            .ok_or_else(|| AttrError::NotFound(format!("endpoint #{}", self.index)))
    }
}

impl TextAttr for TextNode {
    fn show(&self) -> Result<String, AttrError> {
        Ok(text::show(&self.unit, self.endpoint()?)?)
    }

    fn store(&self, input: &str) -> Result<usize, AttrError> {
        Ok(text::store(&self.unit, self.endpoint()?, input)?)
    }
}

/// Binary attribute serving `cbi`.
pub struct CbiNode(pub UnitHandle);

impl BinAttr for CbiNode {
    fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>, AttrError> {
        Ok(cbi::read(&self.0, offset, size)?)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, AttrError> {
        Ok(cbi::write(&self.0, offset, data)?)
    }
}

/// Binary attribute serving `ro_msr`.
pub struct RoMsrNode(pub UnitHandle);

impl BinAttr for RoMsrNode {
    fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>, AttrError> {
        Ok(ro_msr::read(&self.0, offset, size)?)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, AttrError> {
        Ok(ro_msr::write(&self.0, offset, data)?)
    }
}
