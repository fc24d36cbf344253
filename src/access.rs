// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CPU-affine register primitives used by the endpoint handlers.
// Author: Lukas Bower

//! Register access primitives.
//!
//! Handlers never touch hardware themselves; every access goes through a
//! [`RegisterAccess`] implementation which performs the read or write on the
//! addressed CPU and reports failures as an errno-style [`AccessFault`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::catalog::RegisterAddress;

/// Failure reported by a register primitive.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("primitive error {code}")]
pub struct AccessFault {
    /// Positive errno describing the failure.
    pub code: i32,
}

impl AccessFault {
    /// Fault raised when the register faults on access (`#GP`).
    pub const GENERAL_PROTECTION: AccessFault = AccessFault { code: libc::EIO };
}

/// Cross-CPU safe register read/write.
pub trait RegisterAccess: Send + Sync {
    /// Read the 64-bit value of `addr` on `cpu`.
    fn read(&self, cpu: u32, addr: RegisterAddress) -> Result<u64, AccessFault>;
    /// Write `value` to `addr` on `cpu`.
    fn write(&self, cpu: u32, addr: RegisterAddress, value: u64) -> Result<(), AccessFault>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum Op {
    Read,
    Write,
}

/// In-memory register file with simple store/load semantics.
///
/// Unwritten registers read as zero. Individual registers can be made to
/// fault on read or write.
#[derive(Default)]
pub struct MemRegisters {
    values: Mutex<HashMap<(u32, RegisterAddress), u64>>,
    faults: Mutex<HashSet<(u32, RegisterAddress, Op)>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemRegisters {
    /// Create an empty register file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a register value.
    pub fn set(&self, cpu: u32, addr: RegisterAddress, value: u64) {
        locked(&self.values).insert((cpu, addr), value);
    }

    /// Current value of a register, bypassing fault injection.
    pub fn get(&self, cpu: u32, addr: RegisterAddress) -> u64 {
        locked(&self.values).get(&(cpu, addr)).copied().unwrap_or(0)
    }

    /// Make reads of `addr` on `cpu` fault.
    pub fn fail_reads(&self, cpu: u32, addr: RegisterAddress) {
        locked(&self.faults).insert((cpu, addr, Op::Read));
    }

    /// Make writes of `addr` on `cpu` fault.
    pub fn fail_writes(&self, cpu: u32, addr: RegisterAddress) {
        locked(&self.faults).insert((cpu, addr, Op::Write));
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        locked(&self.faults).clear();
    }

    /// Number of successful reads served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful writes served.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn faulted(&self, cpu: u32, addr: RegisterAddress, op: Op) -> bool {
        locked(&self.faults).contains(&(cpu, addr, op))
    }
}

impl RegisterAccess for MemRegisters {
    fn read(&self, cpu: u32, addr: RegisterAddress) -> Result<u64, AccessFault> {
        if self.faulted(cpu, addr, Op::Read) {
            return Err(AccessFault::GENERAL_PROTECTION);
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(cpu, addr))
    }

    fn write(&self, cpu: u32, addr: RegisterAddress, value: u64) -> Result<(), AccessFault> {
        if self.faulted(cpu, addr, Op::Write) {
            return Err(AccessFault::GENERAL_PROTECTION);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set(cpu, addr, value);
        Ok(())
    }
}

/// Register access through the Linux `msr` driver (`/dev/cpu/<N>/msr`).
///
/// The driver pins the access to the CPU named in the path and uses the file
/// offset as the register address. Requires `CAP_SYS_RAWIO`.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct DevCpuMsr {
    root: std::path::PathBuf,
}

#[cfg(unix)]
impl Default for DevCpuMsr {
    fn default() -> Self {
        Self::new("/dev/cpu")
    }
}

#[cfg(unix)]
impl DevCpuMsr {
    /// Use device nodes below `root` instead of `/dev/cpu`.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn node(&self, cpu: u32) -> std::path::PathBuf {
        self.root.join(cpu.to_string()).join("msr")
    }
}

#[cfg(unix)]
fn fault_from(err: std::io::Error) -> AccessFault {
    AccessFault {
        code: err.raw_os_error().unwrap_or(libc::EIO),
    }
}

#[cfg(unix)]
impl RegisterAccess for DevCpuMsr {
    fn read(&self, cpu: u32, addr: RegisterAddress) -> Result<u64, AccessFault> {
        use std::os::unix::fs::FileExt;

        let file = std::fs::File::open(self.node(cpu)).map_err(fault_from)?;
        let mut buf = [0u8; 8];
        file.read_exact_at(&mut buf, u64::from(addr))
            .map_err(fault_from)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write(&self, cpu: u32, addr: RegisterAddress, value: u64) -> Result<(), AccessFault> {
        use std::os::unix::fs::FileExt;

        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(self.node(cpu))
            .map_err(fault_from)?;
        file.write_all_at(&value.to_le_bytes(), u64::from(addr))
            .map_err(fault_from)
    }
}
