// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error kinds surfaced by the register exposition subsystem.
// Author: Lukas Bower

use cohesix_attrfs::AttrError;
use thiserror::Error;

use crate::access::AccessFault;
use crate::catalog::RegisterAddress;

/// Errors returned by catalog, builder, handler and lifecycle operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MsrError {
    /// No configured register set matches the identified family.
    #[error("unsupported processor family {0}")]
    UnsupportedFamily(String),
    /// A configured address list is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Endpoint storage could not be allocated.
    #[error("out of memory building {0} endpoints")]
    OutOfMemory(usize),
    /// The register primitive failed while reading.
    #[error("reading MSR {addr:#x} on cpu {cpu} failed: {fault}")]
    DeviceUnavailable {
        /// Processing unit addressed.
        cpu: u32,
        /// Register addressed.
        addr: RegisterAddress,
        /// Primitive failure.
        fault: AccessFault,
    },
    /// Register primitive failure reported with the primitive's own code.
    #[error("MSR {addr:#x} on cpu {cpu}: {fault}")]
    Primitive {
        /// Processing unit addressed.
        cpu: u32,
        /// Register addressed.
        addr: RegisterAddress,
        /// Primitive failure.
        fault: AccessFault,
    },
    /// Malformed text input or misaligned binary transfer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Write aimed at a register outside the writable set.
    #[error("record {index} is not writable")]
    PermissionDenied {
        /// Record index within the combined register list.
        index: usize,
    },
    /// Register write failed or the endpoint does not accept the operation.
    #[error("i/o error: {0}")]
    Io(String),
    /// The processing unit has no backing device node.
    #[error("cpu {0} has no device")]
    NoDevice(u32),
    /// Host refused a registration.
    #[error("host registration failed: {0}")]
    Host(#[from] AttrError),
    /// Lifecycle state lock was poisoned by a panicking thread.
    #[error("lifecycle lock poisoned")]
    LockPoisoned,
}

impl MsrError {
    /// Positive errno equivalent reported to namespace callers.
    pub fn errno(&self) -> i32 {
        match self {
            Self::UnsupportedFamily(_) => libc::EACCES,
            Self::InvalidConfiguration(_) | Self::InvalidArgument(_) => libc::EINVAL,
            Self::OutOfMemory(_) => libc::ENOMEM,
            Self::DeviceUnavailable { .. } => libc::ENXIO,
            Self::Primitive { fault, .. } => fault.code,
            Self::PermissionDenied { .. } => libc::EPERM,
            Self::Io(_) | Self::LockPoisoned => libc::EIO,
            Self::NoDevice(_) => libc::ENODEV,
            Self::Host(err) => err.errno(),
        }
    }
}

impl From<MsrError> for AttrError {
    fn from(err: MsrError) -> Self {
        AttrError::callback(err.errno(), err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, MsrError>;
