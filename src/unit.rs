// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Capability binding a CPU id to the shared endpoint table.
// Author: Lukas Bower

use std::fmt;
use std::sync::Arc;

use crate::access::{AccessFault, RegisterAccess};
use crate::catalog::RegisterAddress;
use crate::endpoint::EndpointTable;

/// Process-wide state built once at start-up and never mutated.
pub struct Exposition {
    table: EndpointTable,
    access: Arc<dyn RegisterAccess>,
}

impl Exposition {
    /// Pair an endpoint table with the primitive used to reach registers.
    pub fn new(table: EndpointTable, access: Arc<dyn RegisterAccess>) -> Self {
        Self { table, access }
    }

    /// Shared endpoint table.
    pub fn table(&self) -> &EndpointTable {
        &self.table
    }
}

impl fmt::Debug for Exposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exposition")
            .field("endpoints", &self.table.len())
            .finish_non_exhaustive()
    }
}

/// What every handler call receives: which CPU, and what it exposes.
#[derive(Clone, Debug)]
pub struct UnitHandle {
    cpu: u32,
    shared: Arc<Exposition>,
}

impl UnitHandle {
    /// Bind `cpu` to the shared exposition.
    pub fn new(cpu: u32, shared: Arc<Exposition>) -> Self {
        Self { cpu, shared }
    }

    /// CPU this handle addresses.
    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Shared endpoint table.
    pub fn table(&self) -> &EndpointTable {
        self.shared.table()
    }

    pub(crate) fn read(&self, addr: RegisterAddress) -> Result<u64, AccessFault> {
        self.shared.access.read(self.cpu, addr)
    }

    pub(crate) fn write(&self, addr: RegisterAddress, value: u64) -> Result<(), AccessFault> {
        self.shared.access.write(self.cpu, addr, value)
    }
}
