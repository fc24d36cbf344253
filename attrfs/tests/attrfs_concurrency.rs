// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exercise concurrent dispatch through the in-memory attribute tree.
// Author: Lukas Bower

use cohesix_attrfs::{AttrError, AttrFs, AttrHost, Mode, TextAttr, TextEntry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

struct Cell(AtomicU64);

impl TextAttr for Cell {
    fn show(&self) -> Result<String, AttrError> {
        Ok(format!("{}\n", self.0.load(Ordering::SeqCst)))
    }

    fn store(&self, text: &str) -> Result<usize, AttrError> {
        let v: u64 = text
            .trim()
            .parse()
            .map_err(|_| AttrError::callback(22, "bad value"))?;
        self.0.store(v, Ordering::SeqCst);
        Ok(text.len())
    }
}

#[test]
fn concurrent_access() {
    let fs = Arc::new(AttrFs::with_cpus(4));
    for cpu in 0..4 {
        let dev = fs.cpu_device(cpu).expect("cpu device");
        let dir = fs.create_dir(dev, "cells").expect("dir");
        let attrs = (0..8)
            .map(|i| TextEntry {
                name: format!("c{i}"),
                mode: Mode::RW,
                ops: Arc::new(Cell(AtomicU64::new(0))),
            })
            .collect();
        fs.create_group(dir, attrs).expect("group");
    }
    let mut handles = Vec::new();
    for cpu in 0..4 {
        let fs_cl = fs.clone();
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let path = format!("devices/system/cpu/cpu{}/cells/c{}", cpu, j % 8);
                fs_cl.store(&path, &j.to_string()).expect("store");
                let _ = fs_cl.show(&path).expect("show");
            }
        }));
    }
    for h in handles {
        h.join().expect("thread failed");
    }
    assert_eq!(
        fs.show("devices/system/cpu/cpu3/cells/c1").unwrap(),
        "49\n"
    );
}
