// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-family register catalog and processor family identification.
// Author: Lukas Bower

//! Register catalog.
//!
//! Maps processor family keys to the pair of address lists exposed on that
//! family. The mapping is data driven: any number of families may be
//! configured, and a catalog with the single [`GENERIC_FAMILY`] entry resolves
//! without identifying the processor at all.

use std::collections::BTreeMap;

use log::{debug, error};

use crate::error::{MsrError, Result};

/// Hardware register address.
pub type RegisterAddress = u32;

/// Maximum length of each address list.
pub const MAX_REGISTERS: usize = 64;

/// Family key used by single-vector configurations.
pub const GENERIC_FAMILY: &str = "generic";

/// Bits of the CPUID leaf 1 signature that identify a generation.
pub const CPUID_MASK: u32 = 0x000f_fff0;

/// A recognised microarchitecture generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    /// Short family key used in configuration (`hsw`, `skl`, ...).
    pub key: &'static str,
    /// Marketing name.
    pub name: &'static str,
    /// Masked CPUID leaf 1 signature.
    pub signature: u32,
}

/// Built-in generations, matched against the masked CPUID signature.
pub const GENERATIONS: &[Generation] = &[
    Generation { key: "snb", name: "SandyBridge", signature: 0x0002_06d0 },
    Generation { key: "ivb", name: "IvyBridge", signature: 0x0003_06e0 },
    Generation { key: "hsw", name: "Haswell", signature: 0x0003_06f0 },
    Generation { key: "bdw", name: "Broadwell", signature: 0x0004_06f0 },
    Generation { key: "knl", name: "KNL", signature: 0x0005_0670 },
    Generation { key: "skl", name: "Skylake", signature: 0x0005_0650 },
];

/// Identify the generation for a raw CPUID leaf 1 `eax` value.
pub fn identify(signature: u32) -> Option<&'static Generation> {
    GENERATIONS
        .iter()
        .find(|g| signature & CPUID_MASK == g.signature)
}

/// The writable and read-only address lists for one family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSet {
    writable: Vec<RegisterAddress>,
    read_only: Vec<RegisterAddress>,
}

impl RegisterSet {
    /// Build a set, rejecting lists longer than [`MAX_REGISTERS`].
    pub fn new(writable: Vec<RegisterAddress>, read_only: Vec<RegisterAddress>) -> Result<Self> {
        for (label, list) in [("writable", &writable), ("read-only", &read_only)] {
            if list.len() > MAX_REGISTERS {
                return Err(MsrError::InvalidConfiguration(format!(
                    "{} {label} registers configured, at most {MAX_REGISTERS} allowed",
                    list.len()
                )));
            }
        }
        Ok(Self {
            writable,
            read_only,
        })
    }

    /// Registers that accept writes.
    pub fn writable(&self) -> &[RegisterAddress] {
        &self.writable
    }

    /// Registers that may only be read.
    pub fn read_only(&self) -> &[RegisterAddress] {
        &self.read_only
    }

    /// Combined length of both lists.
    pub fn len(&self) -> usize {
        self.writable.len() + self.read_only.len()
    }

    /// `true` when neither list holds a register.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address at `index` of the concatenation `writable ++ read_only`.
    pub fn address_at(&self, index: usize) -> Option<RegisterAddress> {
        if index < self.writable.len() {
            Some(self.writable[index])
        } else {
            self.read_only.get(index - self.writable.len()).copied()
        }
    }

    /// Position of `addr` in the read-only list.
    pub fn read_only_position(&self, addr: u64) -> Option<usize> {
        self.read_only.iter().position(|&a| u64::from(a) == addr)
    }
}

/// Family keyed register configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    families: BTreeMap<String, (Vec<RegisterAddress>, Vec<RegisterAddress>)>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding one [`GENERIC_FAMILY`] entry.
    pub fn single(writable: Vec<RegisterAddress>, read_only: Vec<RegisterAddress>) -> Self {
        let mut catalog = Self::new();
        catalog.insert(GENERIC_FAMILY, writable, read_only);
        catalog
    }

    /// Add or replace the lists for `family`. Lengths are checked on selection.
    pub fn insert(
        &mut self,
        family: &str,
        writable: Vec<RegisterAddress>,
        read_only: Vec<RegisterAddress>,
    ) {
        self.families
            .insert(family.to_owned(), (writable, read_only));
    }

    /// Configured family keys.
    pub fn families(&self) -> impl Iterator<Item = &str> {
        self.families.keys().map(String::as_str)
    }

    /// Resolve the register set for `family`.
    pub fn select(&self, family: &str) -> Result<RegisterSet> {
        let (writable, read_only) = self
            .families
            .get(family)
            .ok_or_else(|| MsrError::UnsupportedFamily(family.to_owned()))?;
        let set = RegisterSet::new(writable.clone(), read_only.clone())?;
        debug!(
            "catalog: family {family} exposes {} writable and {} read-only registers",
            set.writable().len(),
            set.read_only().len()
        );
        Ok(set)
    }

    /// Resolve using a CPUID signature, or the generic entry when the catalog
    /// is single-vector.
    pub fn resolve(&self, signature: Option<u32>) -> Result<RegisterSet> {
        if self.families.len() == 1 && self.families.contains_key(GENERIC_FAMILY) {
            return self.select(GENERIC_FAMILY);
        }
        let Some(signature) = signature else {
            error!("catalog: no CPUID signature available to pick a register set");
            return Err(MsrError::UnsupportedFamily("unknown".into()));
        };
        match identify(signature) {
            Some(generation) if self.families.contains_key(generation.key) => {
                self.select(generation.key)
            }
            Some(generation) => {
                error!(
                    "catalog: no register lists for {} (configured: {})",
                    generation.name,
                    self.families().collect::<Vec<_>>().join(", ")
                );
                Err(MsrError::UnsupportedFamily(generation.key.to_owned()))
            }
            None => {
                error!("catalog: invalid CPUID={signature:#x} detected");
                Err(MsrError::UnsupportedFamily(format!("{signature:#x}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_masks_stepping() {
        assert_eq!(identify(0x0003_06f2).map(|g| g.key), Some("hsw"));
        assert_eq!(identify(0x0005_0654).map(|g| g.key), Some("skl"));
        assert!(identify(0x0009_06ea).is_none());
    }

    #[test]
    fn select_unknown_family() {
        let catalog = Catalog::single(vec![0x10], vec![]);
        assert!(matches!(
            catalog.select("GenX"),
            Err(MsrError::UnsupportedFamily(_))
        ));
    }

    #[test]
    fn select_rejects_oversized_lists() {
        let mut catalog = Catalog::new();
        catalog.insert("big", (0..65).collect(), vec![]);
        let err = catalog.select("big").unwrap_err();
        assert!(matches!(err, MsrError::InvalidConfiguration(_)));
        catalog.insert("edge", (0..64).collect(), (100..164).collect());
        assert_eq!(catalog.select("edge").unwrap().len(), 128);
    }

    #[test]
    fn resolve_single_vector_ignores_signature() {
        let catalog = Catalog::single(vec![0x10], vec![0x20]);
        let set = catalog.resolve(None).unwrap();
        assert_eq!(set.writable(), &[0x10]);
    }

    #[test]
    fn resolve_by_signature() {
        let mut catalog = Catalog::new();
        catalog.insert("hsw", vec![0x199], vec![0x198]);
        catalog.insert("skl", vec![0x1a0], vec![]);
        assert_eq!(catalog.resolve(Some(0x0003_06f2)).unwrap().writable(), &[0x199]);
        assert!(matches!(
            catalog.resolve(Some(0x0004_06f1)),
            Err(MsrError::UnsupportedFamily(_))
        ));
        assert!(catalog.resolve(None).is_err());
    }

    #[test]
    fn unconfigured_generation_names_the_family() {
        let mut catalog = Catalog::new();
        catalog.insert("skl", vec![0x1a0], vec![]);
        catalog.insert("hsw", vec![0x199], vec![]);
        assert_eq!(catalog.families().collect::<Vec<_>>(), ["hsw", "skl"]);
        assert_eq!(
            catalog.resolve(Some(0x0004_06f1)),
            Err(MsrError::UnsupportedFamily("bdw".into()))
        );
    }

    #[test]
    fn concatenated_addressing() {
        let set = RegisterSet::new(vec![0x10, 0x11], vec![0x20]).unwrap();
        assert_eq!(set.address_at(0), Some(0x10));
        assert_eq!(set.address_at(2), Some(0x20));
        assert_eq!(set.address_at(3), None);
        assert_eq!(set.read_only_position(0x20), Some(0));
        assert_eq!(set.read_only_position(0x10), None);
    }
}
