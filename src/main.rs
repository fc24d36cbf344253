// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Diagnostic front-end building and querying the per-CPU msr tree.
// Author: Lukas Bower

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cohesix_attrfs::AttrFs;
use cohesix_msr::config::{parse_address, CatalogConfig};
use cohesix_msr::endpoint::{CBI_NAME, RO_MSR_NAME};
use cohesix_msr::{msr_path, platform, BinaryRecord, MemRegisters, MsrManager, RegisterAccess};
use log::info;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-memory registers, all zero at start.
    Mem,
    /// Linux msr driver under /dev/cpu.
    Dev,
}

#[derive(Parser)]
#[command(name = "cohesix-msr", about = "Expose configured MSRs per CPU")]
struct Args {
    /// JSON catalog; defaults to $COH_MSR_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Load-time style entries such as rw_vec_hsw=0x199,0x1a0.
    #[arg(long = "param")]
    params: Vec<String>,
    /// CPUID leaf 1 signature; read from /proc/cpuinfo when omitted.
    #[arg(long, value_parser = parse_signature)]
    cpuid: Option<u32>,
    /// CPU list such as 0-3,6; read from sysfs when omitted.
    #[arg(long)]
    cpus: Option<String>,
    /// Register primitive.
    #[arg(long, value_enum, default_value_t = Backend::Mem)]
    backend: Backend,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the msr directory of a CPU.
    Ls { cpu: u32 },
    /// Show one text endpoint.
    Cat { cpu: u32, name: String },
    /// Store a value through a text endpoint.
    Write { cpu: u32, name: String, value: String },
    /// Decode every cbi record of a CPU.
    Dump { cpu: u32 },
    /// Read a read-only register through ro_msr.
    Peek {
        cpu: u32,
        addr: String,
        #[arg(default_value_t = 8)]
        size: usize,
    },
}

fn parse_signature(text: &str) -> std::result::Result<u32, String> {
    parse_address(text).map_err(|e| e.to_string())
}

fn load_config(args: &Args) -> Result<CatalogConfig> {
    let mut cfg = match &args.config {
        Some(path) => CatalogConfig::from_file(path)?,
        None => CatalogConfig::from_env()?.unwrap_or_default(),
    };
    for param in &args.params {
        cfg.apply_param(param)?;
    }
    if cfg.is_empty() {
        return Err(anyhow!("no register lists configured"));
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let catalog = load_config(&args)?.into_catalog();

    let signature = args
        .cpuid
        .or_else(|| platform::read_signature(platform::CPUINFO.as_ref()));
    let cpus = match &args.cpus {
        Some(list) => platform::parse_cpu_list(list).context("malformed --cpus list")?,
        None => platform::read_online_cpus(platform::CPU_ONLINE.as_ref()).unwrap_or_else(|| vec![0]),
    };
    let access: Arc<dyn RegisterAccess> = match args.backend {
        Backend::Mem => Arc::new(MemRegisters::new()),
        #[cfg(unix)]
        Backend::Dev => Arc::new(cohesix_msr::DevCpuMsr::default()),
        #[cfg(not(unix))]
        Backend::Dev => return Err(anyhow!("the dev backend needs a unix host")),
    };

    let host_cpus = cpus.iter().copied().max().map_or(0, |m| m + 1);
    let fs = Arc::new(AttrFs::with_cpus(host_cpus));
    let _manager = MsrManager::start(&catalog, signature, access, fs.clone(), cpus.clone())?;
    info!("msr tree ready for cpus {:?}", cpus);

    match args.command {
        Command::Ls { cpu } => {
            for entry in fs.list(&msr_path(cpu))? {
                println!("{} {:>6} {}", entry.mode.octal(), entry.size, entry.name);
            }
        }
        Command::Cat { cpu, name } => {
            print!("{}", fs.show(&format!("{}/{name}", msr_path(cpu)))?);
        }
        Command::Write { cpu, name, value } => {
            let n = fs.store(&format!("{}/{name}", msr_path(cpu)), &value)?;
            println!("{n} bytes consumed");
        }
        Command::Dump { cpu } => {
            let path = format!("{}/{CBI_NAME}", msr_path(cpu));
            let bytes = fs.read(&path, 0, usize::MAX)?;
            for chunk in bytes.chunks_exact(BinaryRecord::SIZE) {
                let mut raw = [0u8; BinaryRecord::SIZE];
                raw.copy_from_slice(chunk);
                let rec = BinaryRecord::from_bytes(&raw);
                println!("{:#06x} {:#018x} {}", rec.address, rec.value, hex::encode(raw));
            }
        }
        Command::Peek { cpu, addr, size } => {
            let addr = parse_address(&addr)?;
            let path = format!("{}/{RO_MSR_NAME}", msr_path(cpu));
            let bytes = fs.read(&path, u64::from(addr), size)?;
            for chunk in bytes.chunks_exact(8) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                println!("{:#x}", u64::from_le_bytes(raw));
            }
        }
    }
    Ok(())
}
