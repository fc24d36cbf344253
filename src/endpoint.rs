// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Build the named endpoint table exposed under each msr directory.
// Author: Lukas Bower

use cohesix_attrfs::Mode;

use crate::catalog::{RegisterAddress, RegisterSet};
use crate::error::{MsrError, Result};

/// Directory created beneath every CPU device node.
pub const DIR_NAME: &str = "msr";
/// Bulk read-write binary endpoint.
pub const CBI_NAME: &str = "cbi";
/// Bulk read-only binary endpoint.
pub const RO_MSR_NAME: &str = "ro_msr";
/// Suffix distinguishing read-only text endpoints.
pub const READ_ONLY_SUFFIX: char = 'r';

/// Whether an endpoint accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Readable and writable register.
    ReadWrite,
    /// Readable only.
    ReadOnly,
}

impl AccessMode {
    /// Permission bits the host renders for this mode.
    pub fn mode(self) -> Mode {
        match self {
            Self::ReadWrite => Mode::RW,
            Self::ReadOnly => Mode::RO,
        }
    }
}

/// A named text endpoint bound to one register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Register behind the endpoint.
    pub address: RegisterAddress,
    /// Access mode.
    pub mode: AccessMode,
    /// Leaf name in the msr directory.
    pub name: String,
}

impl Endpoint {
    fn new(address: RegisterAddress, mode: AccessMode) -> Self {
        let name = match mode {
            AccessMode::ReadWrite => format!("{address:x}"),
            AccessMode::ReadOnly => format!("{address:x}{READ_ONLY_SUFFIX}"),
        };
        Self {
            address,
            mode,
            name,
        }
    }

    /// `true` if the endpoint may be stored to.
    pub fn is_writable(&self) -> bool {
        self.mode == AccessMode::ReadWrite
    }
}

/// Wire record of the `cbi` endpoint: address then value, both 64-bit.
///
/// The value is laid out as two 32-bit words, low word first, matching the
/// `rdmsr`/`wrmsr` `eax:edx` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryRecord {
    /// Register address, zero extended.
    pub address: u64,
    /// Register value.
    pub value: u64,
}

impl BinaryRecord {
    /// Size of the address field.
    pub const ADDRESS_SIZE: usize = 8;
    /// Size of the value field.
    pub const VALUE_SIZE: usize = 8;
    /// Size of a whole record.
    pub const SIZE: usize = Self::ADDRESS_SIZE + Self::VALUE_SIZE;

    /// Record for `address` holding `value`.
    pub fn new(address: RegisterAddress, value: u64) -> Self {
        Self {
            address: u64::from(address),
            value,
        }
    }

    /// Value split into its low and high words.
    pub fn words(&self) -> [u32; 2] {
        [self.value as u32, (self.value >> 32) as u32]
    }

    /// Serialise in wire order.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..Self::ADDRESS_SIZE].copy_from_slice(&self.address.to_le_bytes());
        let [lo, hi] = self.words();
        out[Self::ADDRESS_SIZE..Self::ADDRESS_SIZE + 4].copy_from_slice(&lo.to_le_bytes());
        out[Self::ADDRESS_SIZE + 4..].copy_from_slice(&hi.to_le_bytes());
        out
    }

    /// Parse a record from wire order.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut address = [0u8; 8];
        let mut value = [0u8; 8];
        address.copy_from_slice(&bytes[..Self::ADDRESS_SIZE]);
        value.copy_from_slice(&bytes[Self::ADDRESS_SIZE..]);
        Self {
            address: u64::from_le_bytes(address),
            value: u64::from_le_bytes(value),
        }
    }
}

/// Endpoints and sizing shared by every CPU subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTable {
    set: RegisterSet,
    endpoints: Vec<Endpoint>,
}

impl EndpointTable {
    /// Build the table for `set`: writable endpoints first, then read-only.
    pub fn build(set: RegisterSet) -> Result<Self> {
        let total = set.len();
        let mut endpoints = Vec::new();
        endpoints
            .try_reserve_exact(total)
            .map_err(|_| MsrError::OutOfMemory(total))?;
        endpoints.extend(
            set.writable()
                .iter()
                .map(|&a| Endpoint::new(a, AccessMode::ReadWrite)),
        );
        endpoints.extend(
            set.read_only()
                .iter()
                .map(|&a| Endpoint::new(a, AccessMode::ReadOnly)),
        );
        Ok(Self { set, endpoints })
    }

    /// Register set the table was built from.
    pub fn set(&self) -> &RegisterSet {
        &self.set
    }

    /// All endpoints in combined order.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Endpoint at combined `index`.
    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints.get(index)
    }

    /// Endpoint by leaf name.
    pub fn by_name(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// `true` if there is nothing to expose.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Number of writable registers, the record index bound for `cbi` writes.
    pub fn writable_count(&self) -> usize {
        self.set.writable().len()
    }

    /// Byte size of the `cbi` endpoint.
    pub fn cbi_size(&self) -> u64 {
        (self.endpoints.len() * BinaryRecord::SIZE) as u64
    }

    /// Whether the `ro_msr` endpoint is registered.
    pub fn has_read_only(&self) -> bool {
        !self.set.read_only().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_and_modes() {
        let set = RegisterSet::new(vec![0x10, 0x1A0], vec![0x10, 0xe7]).unwrap();
        let table = EndpointTable::build(set).unwrap();
        let names: Vec<_> = table.endpoints().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["10", "1a0", "10r", "e7r"]);
        assert!(table.by_name("1a0").unwrap().is_writable());
        assert!(!table.by_name("10r").unwrap().is_writable());
        assert_eq!(table.by_name("e7r").unwrap().mode.mode(), Mode::RO);
        assert_eq!(table.cbi_size(), 64);
    }

    #[test]
    fn full_lists_build_unique_names() {
        let set = RegisterSet::new((0..64).collect(), (0x100..0x140).collect()).unwrap();
        let table = EndpointTable::build(set).unwrap();
        assert_eq!(table.len(), 128);
        let unique: HashSet<_> = table.endpoints().iter().map(|e| &e.name).collect();
        assert_eq!(unique.len(), 128);
    }

    #[test]
    fn empty_read_only_list() {
        let table = EndpointTable::build(RegisterSet::new(vec![0x10], vec![]).unwrap()).unwrap();
        assert!(!table.has_read_only());
        assert_eq!(table.writable_count(), 1);
    }

    #[test]
    fn record_layout() {
        let rec = BinaryRecord::new(0x1a0, 0x1122_3344_5566_7788);
        let bytes = rec.to_bytes();
        assert_eq!(&bytes[..8], &0x1a0u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x5566_7788u32.to_le_bytes());
        assert_eq!(&bytes[12..], &0x1122_3344u32.to_le_bytes());
        assert_eq!(BinaryRecord::from_bytes(&bytes), rec);
    }
}
