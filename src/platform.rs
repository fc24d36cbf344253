// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Host probes for the CPUID signature and the online CPU set.
// Author: Lukas Bower

use std::path::Path;

/// Default location of the processor description.
pub const CPUINFO: &str = "/proc/cpuinfo";
/// Default location of the online CPU range list.
pub const CPU_ONLINE: &str = "/sys/devices/system/cpu/online";

/// Rebuild the CPUID leaf 1 signature from the first processor block of
/// `/proc/cpuinfo` text.
pub fn signature_from_cpuinfo(text: &str) -> Option<u32> {
    let mut family = None;
    let mut model = None;
    let mut stepping = None;
    for line in text.lines() {
        if line.trim().is_empty() && family.is_some() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().parse::<u32>().ok();
        match key.trim() {
            "cpu family" => family = value,
            "model" => model = value,
            "stepping" => stepping = value,
            _ => {}
        }
    }
    Some(encode_signature(family?, model?, stepping.unwrap_or(0)))
}

/// Encode display family/model/stepping back into the CPUID layout.
pub fn encode_signature(family: u32, model: u32, stepping: u32) -> u32 {
    let (base_family, ext_family) = if family >= 0xf {
        (0xf, family - 0xf)
    } else {
        (family, 0)
    };
    (ext_family & 0xff) << 20
        | ((model >> 4) & 0xf) << 16
        | (base_family & 0xf) << 8
        | (model & 0xf) << 4
        | (stepping & 0xf)
}

/// Parse a kernel CPU list such as `0-3,6,8-9`.
pub fn parse_cpu_list(text: &str) -> Option<Vec<u32>> {
    let mut cpus = Vec::new();
    for part in text.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u32 = lo.trim().parse().ok()?;
                let hi: u32 = hi.trim().parse().ok()?;
                if hi < lo {
                    return None;
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(part.trim().parse().ok()?),
        }
    }
    Some(cpus)
}

/// Read and decode the CPUID signature from `path`.
pub fn read_signature(path: &Path) -> Option<u32> {
    signature_from_cpuinfo(&std::fs::read_to_string(path).ok()?)
}

/// Read the online CPU list from `path`.
pub fn read_online_cpus(path: &Path) -> Option<Vec<u32>> {
    parse_cpu_list(&std::fs::read_to_string(path).ok()?)
}
