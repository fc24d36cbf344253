// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Configurable per-CPU MSR exposition through an attribute tree.
// Author: Lukas Bower

//! Per-CPU model-specific register exposition.
//
// ─────────────────────────────────────────────────────────────────────────────
// Each online CPU gets an `msr` directory under its device node holding
//
//   <hex-addr>    text, 0666   writable register
//   <hex-addr>r   text, 0444   read-only register
//   cbi           binary, 0666 packed {address, value} records
//   ro_msr        binary, 0444 offset == register address
//
// Which registers appear is decided once at start-up from the catalog entry
// for the running processor family.
// ─────────────────────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod attr;
pub mod catalog;
pub mod cbi;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod ro_msr;
pub mod text;
pub mod unit;

pub use access::{AccessFault, MemRegisters, RegisterAccess};
#[cfg(unix)]
pub use access::DevCpuMsr;
pub use catalog::{Catalog, RegisterAddress, RegisterSet, MAX_REGISTERS};
pub use config::CatalogConfig;
pub use endpoint::{AccessMode, BinaryRecord, Endpoint, EndpointTable};
pub use error::{MsrError, Result};
pub use lifecycle::{msr_path, MsrManager, SlotState};
pub use unit::UnitHandle;
