// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-CPU subtree lifecycle driven by online/offline events.
// Author: Lukas Bower

//! Per-CPU lifecycle.
//!
//! Every CPU slot moves `Absent → Creating → Active → Removed` and back to
//! `Active` on the next online event. A failed creation tears down whatever
//! was registered and parks the slot in `Removed`. Start-up is all or
//! nothing: if any CPU fails, every CPU brought up so far is torn down again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use cohesix_attrfs::fs::CPU_ROOT;
use cohesix_attrfs::{AttrHost, BinEntry, NodeId, TextEntry};
use log::{debug, error, info, warn};

use crate::access::RegisterAccess;
use crate::attr::{CbiNode, RoMsrNode, TextNode};
use crate::catalog::Catalog;
use crate::endpoint::{EndpointTable, CBI_NAME, DIR_NAME, RO_MSR_NAME};
use crate::error::{MsrError, Result};
use crate::unit::{Exposition, UnitHandle};

/// Lifecycle state of one CPU slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never brought online.
    Absent,
    /// Registration in progress.
    Creating,
    /// Subtree fully registered.
    Active,
    /// Torn down after offline, shutdown or failed creation.
    Removed,
}

/// Host path of the msr directory for `cpu`.
pub fn msr_path(cpu: u32) -> String {
    format!("{CPU_ROOT}/cpu{cpu}/{DIR_NAME}")
}

/// Registered state for one online CPU.
#[derive(Debug)]
struct Subtree {
    cpu: u32,
    good: bool,
    dir: NodeId,
    text_names: Vec<String>,
}

#[derive(Debug)]
enum Slot {
    Creating,
    Active(Subtree),
    Removed,
}

impl Slot {
    fn state(&self) -> SlotState {
        match self {
            Self::Creating => SlotState::Creating,
            Self::Active(_) => SlotState::Active,
            Self::Removed => SlotState::Removed,
        }
    }
}

/// Owns every per-CPU subtree and reacts to lifecycle events.
pub struct MsrManager {
    shared: Arc<Exposition>,
    host: Arc<dyn AttrHost>,
    slots: Mutex<BTreeMap<u32, Slot>>,
}

impl std::fmt::Debug for MsrManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsrManager")
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl MsrManager {
    /// Create a manager with no CPUs registered yet.
    pub fn new(
        table: EndpointTable,
        access: Arc<dyn RegisterAccess>,
        host: Arc<dyn AttrHost>,
    ) -> Self {
        Self {
            shared: Arc::new(Exposition::new(table, access)),
            host,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Resolve the catalog, build endpoints and register every CPU in `cpus`.
    ///
    /// Any failure unwinds all registrations made so far.
    pub fn start(
        catalog: &Catalog,
        signature: Option<u32>,
        access: Arc<dyn RegisterAccess>,
        host: Arc<dyn AttrHost>,
        cpus: impl IntoIterator<Item = u32>,
    ) -> Result<Self> {
        let set = catalog.resolve(signature)?;
        let table = EndpointTable::build(set)?;
        let manager = Self::new(table, access, host);
        for cpu in cpus {
            if let Err(err) = manager.online(cpu) {
                error!("msr: start-up failed on cpu {cpu}: {err}");
                manager.shutdown();
                return Err(err);
            }
        }
        info!(
            "msr: exposing {} registers ({} writable) on {} cpus",
            manager.table().len(),
            manager.table().writable_count(),
            manager.active_cpus().len()
        );
        Ok(manager)
    }

    /// Shared endpoint table.
    pub fn table(&self) -> &EndpointTable {
        self.shared.table()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<u32, Slot>>> {
        self.slots.lock().map_err(|_| MsrError::LockPoisoned)
    }

    /// Current state of `cpu`'s slot.
    pub fn state(&self, cpu: u32) -> SlotState {
        match self.slots.lock() {
            Ok(slots) => slots.get(&cpu).map_or(SlotState::Absent, Slot::state),
            Err(poisoned) => poisoned
                .into_inner()
                .get(&cpu)
                .map_or(SlotState::Absent, Slot::state),
        }
    }

    /// CPUs whose subtree is active.
    pub fn active_cpus(&self) -> Vec<u32> {
        let slots = match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
            .map(|(cpu, _)| *cpu)
            .collect()
    }

    /// Capability for an active CPU.
    pub fn handle(&self, cpu: u32) -> Option<UnitHandle> {
        (self.state(cpu) == SlotState::Active).then(|| UnitHandle::new(cpu, self.shared.clone()))
    }

    /// Bring `cpu`'s subtree up. Already active CPUs are left untouched.
    pub fn online(&self, cpu: u32) -> Result<()> {
        let mut slots = self.slots()?;
        if matches!(slots.get(&cpu), Some(Slot::Active(_))) {
            debug!("msr: cpu {cpu} already online");
            return Ok(());
        }
        slots.insert(cpu, Slot::Creating);
        match self.create(cpu) {
            Ok(subtree) => {
                debug!("msr: cpu {cpu} subtree active");
                slots.insert(cpu, Slot::Active(subtree));
                Ok(())
            }
            Err(err) => {
                warn!("msr: creating subtree for cpu {cpu} failed: {err}");
                slots.insert(cpu, Slot::Removed);
                Err(err)
            }
        }
    }

    /// Take `cpu`'s subtree down. A no-op unless the CPU is active.
    pub fn offline(&self, cpu: u32) -> Result<()> {
        let mut slots = self.slots()?;
        match slots.get_mut(&cpu) {
            Some(slot) => {
                if let Slot::Active(subtree) = slot {
                    self.teardown(subtree);
                    *slot = Slot::Removed;
                    debug!("msr: cpu {cpu} subtree removed");
                } else {
                    debug!("msr: offline of cpu {cpu} ignored in state {:?}", slot.state());
                }
            }
            None => debug!("msr: offline of unknown cpu {cpu} ignored"),
        }
        Ok(())
    }

    /// Tear down every active subtree.
    pub fn shutdown(&self) {
        let mut slots = match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        for slot in slots.values_mut() {
            if let Slot::Active(subtree) = slot {
                self.teardown(subtree);
                *slot = Slot::Removed;
            }
        }
    }

    fn create(&self, cpu: u32) -> Result<Subtree> {
        let parent = self.host.cpu_device(cpu).ok_or(MsrError::NoDevice(cpu))?;
        let dir = self.host.create_dir(parent, DIR_NAME).map_err(|err| {
            warn!("msr: cannot create {DIR_NAME} directory for cpu {cpu}: {err}");
            MsrError::NoDevice(cpu)
        })?;
        let mut subtree = Subtree {
            cpu,
            good: true,
            dir,
            text_names: self
                .table()
                .endpoints()
                .iter()
                .map(|e| e.name.clone())
                .collect(),
        };
        if let Err(err) = self.register(&subtree) {
            self.teardown(&mut subtree);
            return Err(err);
        }
        Ok(subtree)
    }

    fn register(&self, subtree: &Subtree) -> Result<()> {
        let unit = UnitHandle::new(subtree.cpu, self.shared.clone());
        let group = self
            .table()
            .endpoints()
            .iter()
            .enumerate()
            .map(|(index, endpoint)| TextEntry {
                name: endpoint.name.clone(),
                mode: endpoint.mode.mode(),
                ops: Arc::new(TextNode::new(unit.clone(), index)),
            })
            .collect();
        self.host.create_group(subtree.dir, group)?;
        self.host.create_bin_file(
            subtree.dir,
            BinEntry {
                name: CBI_NAME.into(),
                mode: cohesix_attrfs::Mode::RW,
                size: self.table().cbi_size(),
                ops: Arc::new(CbiNode(unit.clone())),
            },
        )?;
        if self.table().has_read_only() {
            self.host.create_bin_file(
                subtree.dir,
                BinEntry {
                    name: RO_MSR_NAME.into(),
                    mode: cohesix_attrfs::Mode::RO,
                    size: 0,
                    ops: Arc::new(RoMsrNode(unit)),
                },
            )?;
        }
        Ok(())
    }

    fn teardown(&self, subtree: &mut Subtree) {
        if !subtree.good {
            return;
        }
        self.host.remove_bin_file(subtree.dir, RO_MSR_NAME);
        self.host.remove_bin_file(subtree.dir, CBI_NAME);
        self.host.remove_group(subtree.dir, &subtree.text_names);
        self.host.remove_dir(subtree.dir);
        subtree.good = false;
    }
}

impl Drop for MsrManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::MemRegisters;
    use crate::catalog::RegisterSet;
    use cohesix_attrfs::AttrFs;

    fn manager(fs: Arc<AttrFs>, ro: Vec<u32>) -> MsrManager {
        let table = EndpointTable::build(RegisterSet::new(vec![0x10], ro).unwrap()).unwrap();
        MsrManager::new(table, Arc::new(MemRegisters::new()), fs)
    }

    #[test]
    fn online_offline_online() {
        let fs = Arc::new(AttrFs::with_cpus(2));
        let mgr = manager(fs.clone(), vec![0x20]);
        assert_eq!(mgr.state(1), SlotState::Absent);
        mgr.online(1).unwrap();
        assert_eq!(mgr.state(1), SlotState::Active);
        assert!(fs.exists(&format!("{}/10", msr_path(1))));
        mgr.offline(1).unwrap();
        assert_eq!(mgr.state(1), SlotState::Removed);
        assert!(!fs.exists(&msr_path(1)));
        assert!(mgr.handle(1).is_none());
        mgr.online(1).unwrap();
        assert_eq!(mgr.state(1), SlotState::Active);
        assert!(mgr.handle(1).is_some());
    }

    #[test]
    fn repeated_events_are_idempotent() {
        let fs = Arc::new(AttrFs::with_cpus(1));
        let mgr = manager(fs.clone(), vec![]);
        mgr.offline(0).unwrap();
        assert_eq!(mgr.state(0), SlotState::Absent);
        mgr.online(0).unwrap();
        mgr.online(0).unwrap();
        mgr.offline(0).unwrap();
        mgr.offline(0).unwrap();
        assert_eq!(mgr.state(0), SlotState::Removed);
    }

    #[test]
    fn ro_msr_only_with_read_only_registers() {
        let fs = Arc::new(AttrFs::with_cpus(1));
        let mgr = manager(fs.clone(), vec![]);
        mgr.online(0).unwrap();
        assert!(fs.exists(&format!("{}/{CBI_NAME}", msr_path(0))));
        assert!(!fs.exists(&format!("{}/{RO_MSR_NAME}", msr_path(0))));
    }

    #[test]
    fn missing_device_is_no_device() {
        let fs = Arc::new(AttrFs::with_cpus(1));
        let mgr = manager(fs, vec![]);
        let err = mgr.online(5).unwrap_err();
        assert_eq!(err, MsrError::NoDevice(5));
        assert_eq!(err.errno(), libc::ENODEV);
        assert_eq!(mgr.state(5), SlotState::Removed);
    }

    #[test]
    fn failed_registration_rolls_back() {
        let fs = Arc::new(AttrFs::with_cpus(1));
        let mgr = manager(fs.clone(), vec![0x20]);
        fs.inject_failure(RO_MSR_NAME);
        let err = mgr.online(0).unwrap_err();
        assert_eq!(err.errno(), libc::ENOMEM);
        assert_eq!(mgr.state(0), SlotState::Removed);
        assert!(!fs.exists(&msr_path(0)));
        fs.clear_failures();
        mgr.online(0).unwrap();
        assert!(fs.exists(&format!("{}/{RO_MSR_NAME}", msr_path(0))));
    }

    #[test]
    fn drop_unregisters_everything() {
        let fs = Arc::new(AttrFs::with_cpus(2));
        {
            let mgr = manager(fs.clone(), vec![0x20]);
            mgr.online(0).unwrap();
            mgr.online(1).unwrap();
        }
        assert!(!fs.exists(&msr_path(0)));
        assert!(!fs.exists(&msr_path(1)));
    }
}
