// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Attribute-tree host interface and in-memory implementation.
// Author: Lukas Bower

//! Attribute-tree host for Cohesix register endpoints.
//
// ─────────────────────────────────────────────────────────────────────────────
// The host owns the rendered tree. Providers register directories, groups of
// text attributes and binary attributes beneath per-CPU device nodes, and the
// host dispatches reads and writes back to the provider callbacks.
//
// # Public Surface
// * [`AttrHost`] – registration interface used by providers.
// * [`TextAttr`] / [`BinAttr`] – callback traits invoked on dispatch.
// * [`fs::AttrFs`] – in-memory host with path based dispatch.
// ─────────────────────────────────────────────────────────────────────────────

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub mod fs;
pub mod mode;

pub use fs::AttrFs;
pub use mode::{Access, Mode};

/// Errors surfaced by the attribute host and its callbacks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttrError {
    /// No node exists at the requested location.
    #[error("{0} not found")]
    NotFound(String),
    /// A node with the same name already exists under the parent.
    #[error("{0} already exists")]
    Exists(String),
    /// Mode bits forbid the requested access.
    #[error("permission denied on {0}")]
    Permission(String),
    /// The node kind does not support the requested operation.
    #[error("operation not supported on {0}")]
    Unsupported(String),
    /// Binary write started at or past the declared size.
    #[error("offset {offset} beyond size {size}")]
    TooBig {
        /// Requested offset.
        offset: u64,
        /// Declared node size.
        size: u64,
    },
    /// Node allocation failed while registering.
    #[error("out of memory registering {0}")]
    NoMemory(String),
    /// Provider callback failed with an errno-style code.
    #[error("{message} (errno {errno})")]
    Callback {
        /// Positive errno reported to the caller.
        errno: i32,
        /// Diagnostic text.
        message: String,
    },
}

impl AttrError {
    /// Build a callback error from a provider-supplied errno.
    pub fn callback(errno: i32, message: impl Into<String>) -> Self {
        Self::Callback {
            errno,
            message: message.into(),
        }
    }

    /// Positive errno equivalent of this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::Exists(_) => libc::EEXIST,
            Self::Permission(_) => libc::EACCES,
            Self::Unsupported(_) => libc::EIO,
            Self::TooBig { .. } => libc::EFBIG,
            Self::NoMemory(_) => libc::ENOMEM,
            Self::Callback { errno, .. } => *errno,
        }
    }
}

/// Opaque handle to a directory node in the host tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Callbacks behind a text attribute.
pub trait TextAttr: Send + Sync {
    /// Render the attribute contents.
    fn show(&self) -> Result<String, AttrError>;
    /// Consume `text`, returning the byte count reported to the writer.
    fn store(&self, text: &str) -> Result<usize, AttrError>;
}

/// Callbacks behind a binary attribute.
pub trait BinAttr: Send + Sync {
    /// Read up to `size` bytes at `offset`.
    fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>, AttrError>;
    /// Write `data` at `offset`, returning bytes accepted.
    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, AttrError>;
}

/// A text attribute awaiting registration.
#[derive(Clone)]
pub struct TextEntry {
    /// Leaf name.
    pub name: String,
    /// Permission bits.
    pub mode: Mode,
    /// Dispatch target.
    pub ops: Arc<dyn TextAttr>,
}

impl fmt::Debug for TextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextEntry")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// A binary attribute awaiting registration.
#[derive(Clone)]
pub struct BinEntry {
    /// Leaf name.
    pub name: String,
    /// Permission bits.
    pub mode: Mode,
    /// Declared size in bytes; zero means unbounded.
    pub size: u64,
    /// Dispatch target.
    pub ops: Arc<dyn BinAttr>,
}

impl fmt::Debug for BinEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinEntry")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Registration surface offered by the host to attribute providers.
///
/// Removal calls are idempotent: removing something that is not present is
/// silently ignored.
pub trait AttrHost: Send + Sync {
    /// Device directory backing `cpu`, if the CPU is known to the host.
    fn cpu_device(&self, cpu: u32) -> Option<NodeId>;
    /// Create a child directory under `parent`.
    fn create_dir(&self, parent: NodeId, name: &str) -> Result<NodeId, AttrError>;
    /// Remove a directory and anything still beneath it.
    fn remove_dir(&self, dir: NodeId);
    /// Add a group of text attributes; either all are added or none.
    fn create_group(&self, dir: NodeId, attrs: Vec<TextEntry>) -> Result<(), AttrError>;
    /// Remove the named text attributes.
    fn remove_group(&self, dir: NodeId, names: &[String]);
    /// Add one binary attribute.
    fn create_bin_file(&self, dir: NodeId, attr: BinEntry) -> Result<(), AttrError>;
    /// Remove one binary attribute.
    fn remove_bin_file(&self, dir: NodeId, name: &str);
}
