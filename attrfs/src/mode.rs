// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Permission bits and access classes for attribute nodes.
// Author: Lukas Bower

use bitflags::bitflags;

/// Access type for permission checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// Read-only operation
    Read,
    /// Write or mutate operation
    Write,
}

bitflags! {
    /// Unix-style permission bits attached to every attribute node.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Mode: u16 {
        /// Owner may read.
        const USR_READ = 0o400;
        /// Owner may write.
        const USR_WRITE = 0o200;
        /// Group may read.
        const GRP_READ = 0o040;
        /// Group may write.
        const GRP_WRITE = 0o020;
        /// Others may read.
        const OTH_READ = 0o004;
        /// Others may write.
        const OTH_WRITE = 0o002;
        /// Directory traversal for everyone.
        const EXEC_ALL = 0o111;

        /// `S_IRUGO`
        const READ_ALL = Self::USR_READ.bits() | Self::GRP_READ.bits() | Self::OTH_READ.bits();
        /// `S_IWUGO`
        const WRITE_ALL = Self::USR_WRITE.bits() | Self::GRP_WRITE.bits() | Self::OTH_WRITE.bits();
    }
}

impl Mode {
    /// World readable and writable (`0666`).
    pub const RW: Mode = Mode::READ_ALL.union(Mode::WRITE_ALL);
    /// World readable (`0444`).
    pub const RO: Mode = Mode::READ_ALL;
    /// Directory default (`0755`).
    pub const DIR: Mode = Mode::READ_ALL.union(Mode::USR_WRITE).union(Mode::EXEC_ALL);

    /// Determine if the given access is allowed by these bits.
    pub fn allows(self, access: Access) -> bool {
        match access {
            Access::Read => self.intersects(Mode::READ_ALL),
            Access::Write => self.intersects(Mode::WRITE_ALL),
        }
    }

    /// Render as the octal triple shown by `ls -l` style listings.
    pub fn octal(self) -> String {
        format!("{:04o}", self.bits())
    }
}
