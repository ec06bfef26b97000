//! Host runtime for `xclbin2` accelerator images.
//!
//! Binds an image to a matching device, allocates bank-aware buffers for
//! the kernel's arguments and drives a three-stage asynchronous pipeline:
//! host→device migration, kernel launch, device→host migration. Stages are
//! chained by events and timed through the API's profiling counters.
//!
//! # Layers
//!
//! ```text
//! Instance        one image on one device
//!   DeviceResolver  vendor + device name → context, queue, program, kernel
//!   BufferManager   argument index → buffer, placement, load/store sets
//!   Pipeline        write → execute → read → finish
//! ComputeApi      command submission seam
//!   SoftwareApi     in-process backend with a simulated clock
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use frt_driver::{Access, BufferRequest, Instance, RuntimeConfig, SoftwareApi};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let api = SoftwareApi::for_device("Xilinx", "xilinx_u250_gen3x16_xdma_shell_4_1");
//! let mut vadd = Instance::open(api, "vadd.xclbin", RuntimeConfig::from_env())?;
//!
//! let input = vec![1u8; 4096];
//! vadd.create_buffer(BufferRequest::from_host(0, Access::ReadOnly, &input))?;
//! vadd.create_buffer(BufferRequest::new(1, Access::WriteOnly, 4096))?;
//! vadd.set_buffer_arg(0)?;
//! vadd.set_buffer_arg(1)?;
//! vadd.set_scalar_arg(2, 1024u32)?;
//!
//! let metrics = vadd.invoke()?;
//! println!("{metrics}");
//! let output = vadd.host_data(1)?;
//! # let _ = output;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod api;
pub mod backends;
mod buffers;
mod config;
mod error;
mod instance;
mod pipeline;
mod profiling;
mod resolver;

pub use api::{
    ApiResult, BufferHandle, ComputeApi, ContextHandle, DeviceId, EventHandle, ExtPtr, KernelArg,
    KernelHandle, MemFlags, MigrationDirection, PlatformId, ProfilingInfo, ProgramBuild,
    ProgramHandle, QueueHandle, QueueProperties, Status, StreamDirection, StreamHandle,
};
pub use backends::{SoftwareApi, SoftwareDevice};
pub use buffers::{Access, BufferManager, BufferRequest, ManagedBuffer, Placement};
pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use instance::{Instance, StreamArg};
pub use pipeline::{Pipeline, PipelineState};
pub use profiling::{
    elapsed_ns, profiling_timestamp, throughput, PipelineMetrics, Stage, StageMetrics,
    StageTimestamps,
};
pub use resolver::{BoundDevice, DeviceResolver};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Access, BufferRequest, ComputeApi, Instance, PipelineMetrics, Result, RuntimeConfig,
        RuntimeError, SoftwareApi, Stage,
    };
}
