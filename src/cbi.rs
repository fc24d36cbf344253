// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Record oriented bulk access to the combined register list.
// Author: Lukas Bower

//! The `cbi` binary endpoint.
//!
//! The file is a packed array of [`BinaryRecord`]s, one per register in
//! `writable ++ read_only` order. Reads may start anywhere and span records;
//! each record touched triggers one register read. Writes must hit exactly
//! the value field of a single writable record.

use log::warn;

use crate::endpoint::BinaryRecord;
use crate::error::{MsrError, Result};
use crate::unit::UnitHandle;

const RECORD: u64 = BinaryRecord::SIZE as u64;

/// Read `size` bytes of the record array starting at byte `offs`.
///
/// A failing register read aborts the whole request; bytes gathered from
/// earlier records are discarded.
pub fn read(unit: &UnitHandle, offs: u64, size: usize) -> Result<Vec<u8>> {
    let set = unit.table().set();
    let total = set.len() as u64;
    let mut mi = offs / RECORD;
    let mut output = (offs % RECORD) as usize;
    let mut remaining = size;
    let mut out = Vec::with_capacity(size.min(set.len() * BinaryRecord::SIZE));

    while remaining > 0 && mi < total {
        let Some(addr) = usize::try_from(mi).ok().and_then(|i| set.address_at(i)) else {
            break;
        };
        let value = unit.read(addr).map_err(|fault| {
            warn!(
                "cbi: reading MSR {:#x} (record {}) on cpu {} failed: {}",
                addr,
                mi,
                unit.cpu(),
                fault.code
            );
            MsrError::DeviceUnavailable {
                cpu: unit.cpu(),
                addr,
                fault,
            }
        })?;
        let record = BinaryRecord::new(addr, value).to_bytes();
        let take = (BinaryRecord::SIZE - output).min(remaining);
        out.extend_from_slice(&record[output..output + take]);
        remaining -= take;
        mi += 1;
        output = 0;
    }

    Ok(out)
}

/// Write one register value through its record's value field.
pub fn write(unit: &UnitHandle, offs: u64, buf: &[u8]) -> Result<usize> {
    let mi = offs / RECORD;
    let output = (offs % RECORD) as usize;
    if output != BinaryRecord::ADDRESS_SIZE || buf.len() != BinaryRecord::VALUE_SIZE {
        return Err(MsrError::InvalidArgument(format!(
            "cbi writes must be {} bytes at a value field, got {} bytes at offset {}",
            BinaryRecord::VALUE_SIZE,
            buf.len(),
            offs
        )));
    }
    let writable = unit.table().set().writable();
    let index = usize::try_from(mi).unwrap_or(usize::MAX);
    let Some(&addr) = writable.get(index) else {
        return Err(MsrError::PermissionDenied { index });
    };

    let mut value = [0u8; BinaryRecord::VALUE_SIZE];
    value.copy_from_slice(buf);
    let value = u64::from_le_bytes(value);
    match unit.write(addr, value) {
        Ok(()) => Ok(buf.len()),
        Err(fault) => {
            warn!(
                "cbi: writing {:#x} to MSR {:#x} on cpu {} failed: {}",
                value,
                addr,
                unit.cpu(),
                fault.code
            );
            Err(MsrError::Io(format!(
                "write of MSR {addr:#x} on cpu {} failed with {}",
                unit.cpu(),
                fault.code
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::MemRegisters;
    use crate::catalog::RegisterSet;
    use crate::endpoint::EndpointTable;
    use crate::unit::Exposition;
    use std::sync::Arc;

    fn unit(regs: Arc<MemRegisters>) -> UnitHandle {
        let set = RegisterSet::new(vec![0x10, 0x11], vec![0x20]).unwrap();
        let table = EndpointTable::build(set).unwrap();
        UnitHandle::new(0, Arc::new(Exposition::new(table, regs)))
    }

    fn record(bytes: &[u8]) -> BinaryRecord {
        BinaryRecord::from_bytes(bytes.try_into().unwrap())
    }

    #[test]
    fn reads_whole_records_in_order() {
        let regs = Arc::new(MemRegisters::new());
        regs.set(0, 0x10, 1);
        regs.set(0, 0x11, 2);
        regs.set(0, 0x20, 3);
        let unit = unit(regs);
        let bytes = read(&unit, 0, 48).unwrap();
        assert_eq!(bytes.len(), 48);
        assert_eq!(record(&bytes[..16]), BinaryRecord::new(0x10, 1));
        assert_eq!(record(&bytes[16..32]), BinaryRecord::new(0x11, 2));
        assert_eq!(record(&bytes[32..]), BinaryRecord::new(0x20, 3));
    }

    #[test]
    fn unaligned_read_spans_records() {
        let regs = Arc::new(MemRegisters::new());
        regs.set(0, 0x10, 0xaaaa);
        regs.set(0, 0x11, 0xbbbb);
        let unit = unit(regs);
        let bytes = read(&unit, 8, 16).unwrap();
        assert_eq!(&bytes[..8], &0xaaaau64.to_le_bytes());
        assert_eq!(&bytes[8..], &0x11u64.to_le_bytes());
    }

    #[test]
    fn read_stops_at_end() {
        let unit = unit(Arc::new(MemRegisters::new()));
        assert_eq!(read(&unit, 40, 100).unwrap().len(), 8);
        assert!(read(&unit, 48, 16).unwrap().is_empty());
        assert!(read(&unit, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn read_failure_discards_partial_data() {
        let regs = Arc::new(MemRegisters::new());
        regs.fail_reads(0, 0x11);
        let unit = unit(regs);
        let err = read(&unit, 0, 48).unwrap_err();
        assert!(matches!(err, MsrError::DeviceUnavailable { addr: 0x11, .. }));
        assert!(read(&unit, 0, 16).is_ok());
    }

    #[test]
    fn write_value_field_of_writable_record() {
        let regs = Arc::new(MemRegisters::new());
        let unit = unit(regs.clone());
        assert_eq!(write(&unit, 24, &7u64.to_le_bytes()).unwrap(), 8);
        assert_eq!(regs.get(0, 0x11), 7);
    }

    #[test]
    fn write_alignment_rules() {
        let unit = unit(Arc::new(MemRegisters::new()));
        for (offs, len) in [(0, 8), (16, 8), (9, 8), (8, 4), (8, 16)] {
            let buf = vec![0u8; len];
            assert!(
                matches!(write(&unit, offs, &buf), Err(MsrError::InvalidArgument(_))),
                "offs {offs} len {len}"
            );
        }
    }

    #[test]
    fn write_to_read_only_record_is_denied() {
        let regs = Arc::new(MemRegisters::new());
        let unit = unit(regs.clone());
        let err = write(&unit, 40, &[1; 8]).unwrap_err();
        assert_eq!(err, MsrError::PermissionDenied { index: 2 });
        assert_eq!(err.errno(), libc::EPERM);
        assert!(matches!(
            write(&unit, 1000 * 16 + 8, &[1; 8]),
            Err(MsrError::PermissionDenied { .. })
        ));
        assert_eq!(regs.write_count(), 0);
    }

    #[test]
    fn write_failure_is_io_error() {
        let regs = Arc::new(MemRegisters::new());
        regs.fail_writes(0, 0x10);
        let unit = unit(regs);
        let err = write(&unit, 8, &[0; 8]).unwrap_err();
        assert_eq!(err.errno(), libc::EIO);
    }
}
