#![deny(unsafe_code)]

//! Accelerator image metadata parser
//!
//! Reads `xclbin2` images far enough to drive a host runtime: which device
//! the image targets, which kernel it carries, the kernel's argument table
//! and which memory bank each buffer argument is wired to.
//!
//! # Format
//!
//! An `xclbin2` image is a little-endian container:
//!
//! - **Magic** (8 bytes): `xclbin2\0`
//! - **Header** at `0x130`: length, version, load mode, platform name
//! - **Section directory** at `0x1c8`: 40-byte records pointing at payloads
//! - **Embedded metadata**: XML describing the kernel and its arguments
//! - **Memory topology / connectivity**: bank table and argument wiring
//!
//! # Example
//!
//! ```no_run
//! use frt_container::ContainerMetadata;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let meta = ContainerMetadata::from_file("vadd.xclbin")?;
//!
//! println!("Device: {}", meta.identity().device_name);
//! println!("Kernel: {}", meta.kernel_name());
//! for arg in meta.args() {
//!     println!("  [{}] {} {} ({})", arg.index, arg.type_name, arg.name, arg.category);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

mod args;
pub mod builder;
mod container;
mod emulation;
mod error;
pub mod header;
mod metadata;
pub mod probe;
mod reader;
mod topology;

pub use args::{ArgCategory, ArgInfo, ArgTable};
pub use container::{ContainerMetadata, DeviceIdentity};
pub use emulation::EmulationMode;
pub use error::{ContainerError, Result};
pub use header::{ContainerHeader, SectionHeader};
pub use metadata::{parse_embedded_metadata, EmbeddedMetadata, KernelDecl};
pub use probe::{ContainerFormat, ContainerParser, XclbinParser};
pub use topology::{Connection, MemoryBank};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        ArgCategory, ArgInfo, ArgTable, ContainerMetadata, EmulationMode, Result,
    };
}
