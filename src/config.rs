// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load per-family register lists from JSON or load-time parameters.
// Author: Lukas Bower

//! Catalog configuration.
//!
//! Two input forms feed the same [`Catalog`]:
//!
//! * JSON: `{ "families": { "hsw": { "rw": ["0x199"], "ro": [408] } } }`
//! * parameters: `rw_vec_hsw=0x199,0x1a0` / `ro_vec_hsw=0x198`, with the
//!   un-suffixed `rw_vec=` and `ro_vec=` naming the generic family.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{Catalog, RegisterAddress, GENERIC_FAMILY};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "COH_MSR_CONFIG";

/// Errors raised while ingesting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The JSON document is malformed.
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A parameter entry could not be parsed.
    #[error("bad parameter {0:?}")]
    Param(String),
    /// A register address could not be parsed.
    #[error("bad register address {0:?}")]
    Address(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Number(RegisterAddress),
    Text(String),
}

impl AddressRepr {
    fn resolve(&self) -> Result<RegisterAddress, ConfigError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => parse_address(s),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FamilyRepr {
    #[serde(default)]
    rw: Vec<AddressRepr>,
    #[serde(default)]
    ro: Vec<AddressRepr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigRepr {
    #[serde(default)]
    families: BTreeMap<String, FamilyRepr>,
}

/// Parsed register lists keyed by family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogConfig {
    families: BTreeMap<String, (Vec<RegisterAddress>, Vec<RegisterAddress>)>,
}

/// Parse `0x`-prefixed hex or decimal.
pub fn parse_address(text: &str) -> Result<RegisterAddress, ConfigError> {
    let t = text.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => RegisterAddress::from_str_radix(hex, 16),
        None => t.parse(),
    };
    parsed.map_err(|_| ConfigError::Address(text.to_owned()))
}

impl CatalogConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document.
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let repr: ConfigRepr = serde_json::from_str(data)?;
        let mut cfg = Self::new();
        for (family, lists) in repr.families {
            let rw = lists
                .rw
                .iter()
                .map(AddressRepr::resolve)
                .collect::<Result<Vec<_>, _>>()?;
            let ro = lists
                .ro
                .iter()
                .map(AddressRepr::resolve)
                .collect::<Result<Vec<_>, _>>()?;
            cfg.families.insert(family, (rw, ro));
        }
        Ok(cfg)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let txt = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        debug!("config: loaded {}", path.display());
        Self::from_json(&txt)
    }

    /// Load the file named by [`CONFIG_ENV`], if the variable is set.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)).map(Some),
            None => Ok(None),
        }
    }

    /// Apply one `rw_vec[_family]=a,b,...` or `ro_vec[_family]=...` entry.
    pub fn apply_param(&mut self, param: &str) -> Result<(), ConfigError> {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| ConfigError::Param(param.to_owned()))?;
        let key = key.trim();
        let (writable, family) = if let Some(rest) = key.strip_prefix("rw_vec") {
            (true, rest)
        } else if let Some(rest) = key.strip_prefix("ro_vec") {
            (false, rest)
        } else {
            return Err(ConfigError::Param(param.to_owned()));
        };
        let family = match family {
            "" => GENERIC_FAMILY,
            f => f
                .strip_prefix('_')
                .filter(|f| !f.is_empty())
                .ok_or_else(|| ConfigError::Param(param.to_owned()))?,
        };
        let addrs = value
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(parse_address)
            .collect::<Result<Vec<_>, _>>()?;
        let entry = self.families.entry(family.to_owned()).or_default();
        if writable {
            entry.0 = addrs;
        } else {
            entry.1 = addrs;
        }
        Ok(())
    }

    /// Merge `other` into `self`, replacing families present in both.
    pub fn merge(&mut self, other: CatalogConfig) {
        self.families.extend(other.families);
    }

    /// Number of configured families.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// `true` if nothing is configured.
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Build the catalog. List lengths are validated on selection.
    pub fn into_catalog(self) -> Catalog {
        let mut catalog = Catalog::new();
        for (family, (rw, ro)) in self.families {
            catalog.insert(&family, rw, ro);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MsrError;

    #[test]
    fn json_accepts_numbers_and_hex_strings() {
        let cfg = CatalogConfig::from_json(
            r#"{ "families": { "hsw": { "rw": ["0x199", 416], "ro": ["0x198"] } } }"#,
        )
        .unwrap();
        let set = cfg.into_catalog().select("hsw").unwrap();
        assert_eq!(set.writable(), &[0x199, 0x1a0]);
        assert_eq!(set.read_only(), &[0x198]);
    }

    #[test]
    fn json_rejects_bad_address() {
        let err = CatalogConfig::from_json(r#"{ "families": { "x": { "rw": ["0xzz"] } } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Address(_)));
    }

    #[test]
    fn params_fill_families() {
        let mut cfg = CatalogConfig::new();
        cfg.apply_param("rw_vec_skl=0x1a0,0x199").unwrap();
        cfg.apply_param("ro_vec_skl=0x10").unwrap();
        cfg.apply_param("ro_vec_knl=").unwrap();
        let catalog = cfg.into_catalog();
        let skl = catalog.select("skl").unwrap();
        assert_eq!(skl.writable(), &[0x1a0, 0x199]);
        assert_eq!(skl.read_only(), &[0x10]);
        assert!(catalog.select("knl").unwrap().is_empty());
    }

    #[test]
    fn unsuffixed_params_are_generic() {
        let mut cfg = CatalogConfig::new();
        cfg.apply_param("rw_vec=16").unwrap();
        let catalog = cfg.into_catalog();
        assert_eq!(catalog.resolve(None).unwrap().writable(), &[16]);
    }

    #[test]
    fn malformed_params() {
        let mut cfg = CatalogConfig::new();
        for bad in ["rw_vec_hsw", "xx_vec=1", "rw_vec_=1", "rw_vechsw=1", "ro_vec=q"] {
            assert!(cfg.apply_param(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn oversized_param_list_fails_on_select() {
        let list: Vec<String> = (0..65).map(|i| i.to_string()).collect();
        let mut cfg = CatalogConfig::new();
        cfg.apply_param(&format!("rw_vec_hsw={}", list.join(","))).unwrap();
        assert!(matches!(
            cfg.into_catalog().select("hsw"),
            Err(MsrError::InvalidConfiguration(_))
        ));
    }
}
