// SPDX-License-Identifier: MIT

//! `frt`: command-line interface for xclbin2 images.
//!
//! ```text
//! USAGE:
//!   frt inspect <path>               Print header, sections and argument table
//!   frt placement <tag>...           Show the placement flag for bank tags
//!   frt pack <out> [options]         Write a small fixture image
//!   frt simulate <path> [options]    Run one pipeline cycle on the software backend
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frt_container::builder::{BankSpec, XclbinBuilder};
use frt_container::{ArgCategory, ContainerMetadata};
use frt_driver::{Access, BufferRequest, Instance, RuntimeConfig, SoftwareApi};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xclbin_layout::bank;

#[derive(Parser)]
#[command(name = "frt", about = "xclbin2 image and runtime tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the parsed contents of an image.
    Inspect {
        /// Path to the .xclbin file.
        path: PathBuf,
    },
    /// Map memory bank tags to allocation flags.
    Placement {
        /// Bank tags (e.g. DDR[1], HBM[7]).
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Write a fixture image with one kernel and one bank per buffer argument.
    Pack {
        /// Output file.
        out: PathBuf,
        /// Device name the image targets.
        #[arg(long, default_value = "xilinx_u250_gen3x16_xdma_4_1")]
        device: String,
        /// Kernel name.
        #[arg(long, default_value = "vadd")]
        kernel: String,
        /// Bank tag for buffer arguments, in argument order.
        #[arg(long = "bank", default_values = ["DDR[0]", "DDR[1]", "DDR[2]"])]
        banks: Vec<String>,
        /// Metadata target (bitstream, hw_em, csim).
        #[arg(long, default_value = "bitstream")]
        target: String,
    },
    /// Bind an image to the software backend and run one load/compute/store cycle.
    Simulate {
        /// Path to the .xclbin file.
        path: PathBuf,
        /// Bytes allocated per buffer argument.
        #[arg(long, default_value_t = 1 << 20)]
        size: usize,
        /// Simulated kernel time in nanoseconds.
        #[arg(long, default_value_t = 10_000)]
        kernel_ns: u64,
        /// Simulated transfer bandwidth in bytes per nanosecond.
        #[arg(long, default_value_t = 8)]
        bandwidth: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Inspect { path } => cmd_inspect(&path)?,
        Cmd::Placement { tags } => cmd_placement(&tags),
        Cmd::Pack {
            out,
            device,
            kernel,
            banks,
            target,
        } => cmd_pack(&out, &device, &kernel, &banks, &target)?,
        Cmd::Simulate {
            path,
            size,
            kernel_ns,
            bandwidth,
        } => cmd_simulate(&path, size, kernel_ns, bandwidth)?,
    }

    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let meta = ContainerMetadata::from_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    print!("{}", meta.summary());
    Ok(())
}

fn cmd_placement(tags: &[String]) {
    for tag in tags {
        match bank::placement_flag(tag) {
            Some(flag) => match bank::hbm_channel_of(flag) {
                Some(channel) => println!("{tag:<12} 0x{flag:08x}  HBM channel {channel}"),
                None => println!("{tag:<12} 0x{flag:08x}"),
            },
            None => println!("{tag:<12} unrecognized (default placement)"),
        }
    }
}

fn cmd_pack(out: &Path, device: &str, kernel: &str, banks: &[String], target: &str) -> Result<()> {
    let mut builder = XclbinBuilder::new(device, kernel).target(target);
    for (i, tag) in banks.iter().enumerate() {
        let index = i32::try_from(i).context("too many banks")?;
        builder = builder
            .buffer(&format!("b{i}"), "int*")
            .bank(BankSpec::used(tag))
            .connect(index, index);
    }
    let image = builder.scalar("n", "int").build();

    std::fs::write(out, &image).with_context(|| format!("writing {}", out.display()))?;
    println!("Wrote {} bytes to {}", image.len(), out.display());
    Ok(())
}

fn cmd_simulate(path: &Path, size: usize, kernel_ns: u64, bandwidth: u64) -> Result<()> {
    let meta = ContainerMetadata::from_file(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let identity = meta.identity();
    let api = SoftwareApi::for_device(identity.vendor.clone(), identity.device_name.clone())
        .with_kernel_time(kernel_ns)
        .with_bandwidth(bandwidth);

    let mut vm = Instance::from_metadata(api, &meta, RuntimeConfig::from_env())?;
    println!("Kernel : {}", vm.kernel_name());
    println!("Device : {}", vm.device().device_name);

    let args: Vec<_> = vm.args().iter().map(|a| (a.index, a.category)).collect();
    for (index, category) in args {
        match category {
            ArgCategory::Mmap => {
                vm.create_buffer(BufferRequest::new(index, Access::ReadWrite, size))?;
                vm.set_buffer_arg(index)?;
                if let Some(buffer) = vm.buffers().buffer(index) {
                    println!("  [{index:>2}] {size} bytes  {:?}", buffer.placement);
                }
            }
            ArgCategory::Scalar => vm.set_scalar_arg(index, 0u32)?,
            other => tracing::warn!("Leaving {other} argument {index} unset"),
        }
    }

    let metrics = vm.invoke()?;
    println!();
    println!("{metrics}");
    Ok(())
}
