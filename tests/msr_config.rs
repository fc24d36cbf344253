// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Configuration ingestion from files, environment and parameters.
// Author: Lukas Bower

use std::fs;
use std::sync::Arc;

use cohesix_attrfs::AttrFs;
use cohesix_msr::config::{CatalogConfig, ConfigError, CONFIG_ENV};
use cohesix_msr::{msr_path, MemRegisters, MsrManager};
use serial_test::serial;
use tempfile::tempdir;

const CONFIG: &str = r#"{
    "families": {
        "bdw": { "rw": ["0x199"], "ro": ["0x198", "0x19c"] },
        "skl": { "rw": ["0x1a0"] }
    }
}"#;

#[test]
#[serial]
fn env_points_at_config_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("msr.json");
    fs::write(&path, CONFIG).unwrap();
    std::env::set_var(CONFIG_ENV, &path);
    let cfg = CatalogConfig::from_env().unwrap().expect("config present");
    std::env::remove_var(CONFIG_ENV);
    assert_eq!(cfg.len(), 2);

    let host = Arc::new(AttrFs::with_cpus(1));
    let _mgr = MsrManager::start(
        &cfg.into_catalog(),
        Some(0x0004_06f1),
        Arc::new(MemRegisters::new()),
        host.clone(),
        [0],
    )
    .expect("start");
    let names: Vec<_> = host
        .list(&msr_path(0))
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["198r", "199", "19cr", "cbi", "ro_msr"]);
}

#[test]
#[serial]
fn env_unset_means_no_config() {
    std::env::remove_var(CONFIG_ENV);
    assert!(CatalogConfig::from_env().unwrap().is_none());
}

#[test]
fn missing_file_is_reported() {
    let dir = tempdir().expect("tempdir");
    let err = CatalogConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn params_override_file_families() {
    let mut cfg = CatalogConfig::from_json(CONFIG).unwrap();
    let mut extra = CatalogConfig::new();
    extra.apply_param("rw_vec_skl=0x1a0,0x1b0").unwrap();
    extra.apply_param("ro_vec_skl=0x1b1").unwrap();
    cfg.merge(extra);
    let skl = cfg.into_catalog().select("skl").unwrap();
    assert_eq!(skl.writable(), &[0x1a0, 0x1b0]);
    assert_eq!(skl.read_only(), &[0x1b1]);
}
