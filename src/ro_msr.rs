// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Address indexed read-only access to the read-only register list.
// Author: Lukas Bower

//! The `ro_msr` binary endpoint.
//!
//! Behaves like `/dev/cpu/<N>/msr` restricted to the read-only list: the file
//! offset is the register address itself and transfers come in 8-byte quanta.
//! Every quantum re-reads the same register; the address never advances.

use cohesix_attrfs::fs::PAGE_SIZE;
use log::warn;

use crate::error::{MsrError, Result};
use crate::unit::UnitHandle;

/// Transfer granule.
pub const QUANTUM: usize = std::mem::size_of::<u64>();

/// Read the register at address `offs`, once per 8 bytes of `size`.
///
/// At most [`PAGE_SIZE`] bytes are produced per call. A primitive failure
/// ends the transfer early; whatever was read is returned, or the
/// primitive's own error if nothing was.
pub fn read(unit: &UnitHandle, offs: u64, size: usize) -> Result<Vec<u8>> {
    if size % QUANTUM != 0 {
        return Err(MsrError::InvalidArgument(format!(
            "ro_msr transfers must be a multiple of {QUANTUM} bytes, got {size}"
        )));
    }
    let set = unit.table().set();
    let Some(position) = set.read_only_position(offs) else {
        return Err(MsrError::Io(format!(
            "{offs:#x} is not a read-only register"
        )));
    };
    let addr = set.read_only()[position];

    let size = size.min(PAGE_SIZE);
    let mut out = Vec::with_capacity(size);
    while out.len() < size {
        match unit.read(addr) {
            Ok(value) => out.extend_from_slice(&value.to_le_bytes()),
            Err(fault) => {
                warn!(
                    "ro_msr: reading MSR {:#x} on cpu {} failed after {} bytes: {}",
                    addr,
                    unit.cpu(),
                    out.len(),
                    fault.code
                );
                if out.is_empty() {
                    return Err(MsrError::Primitive {
                        cpu: unit.cpu(),
                        addr,
                        fault,
                    });
                }
                break;
            }
        }
    }
    Ok(out)
}

/// Writes are not supported on the read-only endpoint.
pub fn write(_unit: &UnitHandle, offs: u64, _buf: &[u8]) -> Result<usize> {
    Err(MsrError::Io(format!("ro_msr is read-only (offset {offs:#x})")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessFault, MemRegisters, RegisterAccess};
    use crate::catalog::RegisterSet;
    use crate::endpoint::EndpointTable;
    use crate::unit::Exposition;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn unit(regs: Arc<MemRegisters>) -> UnitHandle {
        let set = RegisterSet::new(vec![0x10], vec![0xe7, 0xe8]).unwrap();
        let table = EndpointTable::build(set).unwrap();
        UnitHandle::new(1, Arc::new(Exposition::new(table, regs)))
    }

    #[test]
    fn reads_register_at_offset() {
        let regs = Arc::new(MemRegisters::new());
        regs.set(1, 0xe8, 0x55);
        let unit = unit(regs);
        assert_eq!(read(&unit, 0xe8, 8).unwrap(), 0x55u64.to_le_bytes());
    }

    #[test]
    fn repeats_the_same_register() {
        let regs = Arc::new(MemRegisters::new());
        regs.set(1, 0xe7, 9);
        let unit = unit(regs.clone());
        let bytes = read(&unit, 0xe7, 24).unwrap();
        assert_eq!(bytes.len(), 24);
        for chunk in bytes.chunks(8) {
            assert_eq!(chunk, 9u64.to_le_bytes());
        }
        assert_eq!(regs.read_count(), 3);
    }

    #[test]
    fn rejects_unaligned_size() {
        let unit = unit(Arc::new(MemRegisters::new()));
        let err = read(&unit, 0xe7, 12).unwrap_err();
        assert_eq!(err.errno(), libc::EINVAL);
    }

    #[test]
    fn rejects_unlisted_address() {
        let unit = unit(Arc::new(MemRegisters::new()));
        // Writable registers are not reachable through ro_msr either.
        for offs in [0x10, 0x0, 0xe9] {
            assert_eq!(read(&unit, offs, 8).unwrap_err().errno(), libc::EIO);
        }
    }

    #[test]
    fn zero_sized_read() {
        let unit = unit(Arc::new(MemRegisters::new()));
        assert!(read(&unit, 0xe7, 0).unwrap().is_empty());
    }

    #[test]
    fn failure_without_data_is_reported() {
        let regs = Arc::new(MemRegisters::new());
        regs.fail_reads(1, 0xe7);
        let unit = unit(regs);
        let err = read(&unit, 0xe7, 16).unwrap_err();
        assert!(matches!(err, MsrError::Primitive { addr: 0xe7, .. }));
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn huge_count_is_capped_at_one_page() {
        let regs = Arc::new(MemRegisters::new());
        regs.set(1, 0xe7, 3);
        let unit = unit(regs.clone());
        let bytes = read(&unit, 0xe7, usize::MAX & !(QUANTUM - 1)).unwrap();
        assert_eq!(bytes.len(), PAGE_SIZE);
        assert_eq!(regs.read_count(), PAGE_SIZE / QUANTUM);
    }

    struct Flaky(AtomicUsize);

    impl RegisterAccess for Flaky {
        fn read(&self, _cpu: u32, _addr: u32) -> std::result::Result<u64, AccessFault> {
            match self.0.fetch_sub(1, Ordering::SeqCst) {
                0 => Err(AccessFault::GENERAL_PROTECTION),
                _ => Ok(0x42),
            }
        }

        fn write(&self, _cpu: u32, _addr: u32, _value: u64) -> std::result::Result<(), AccessFault> {
            Ok(())
        }
    }

    #[test]
    fn short_read_after_failure() {
        let set = RegisterSet::new(vec![], vec![0xe7]).unwrap();
        let table = EndpointTable::build(set).unwrap();
        let flaky = Arc::new(Flaky(AtomicUsize::new(2)));
        let unit = UnitHandle::new(0, Arc::new(Exposition::new(table, flaky)));
        let bytes = read(&unit, 0xe7, 32).unwrap();
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn writes_always_fail() {
        let unit = unit(Arc::new(MemRegisters::new()));
        assert_eq!(write(&unit, 0xe7, &[0; 8]).unwrap_err().errno(), libc::EIO);
    }
}
