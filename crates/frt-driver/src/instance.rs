//! Runtime instance
//!
//! Ties everything together for one image on one device:
//!
//! ```text
//! image ──probe──▶ ContainerMetadata ──resolve──▶ BoundDevice
//!                        │                           │
//!                    ArgTable ──▶ BufferManager ──▶ Pipeline
//! ```

use crate::api::{BufferHandle, ComputeApi, EventHandle, KernelArg, StreamDirection, StreamHandle};
use crate::buffers::{BufferManager, BufferRequest};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::pipeline::{Pipeline, PipelineState};
use crate::profiling::{PipelineMetrics, Stage};
use crate::resolver::{BoundDevice, DeviceResolver};
use bytes::Bytes;
use frt_container::{ArgCategory, ArgTable, ContainerMetadata, EmulationMode};
use std::path::Path;
use tracing::{debug, info, warn};

/// Caller-owned holder for a stream attached by [`Instance::set_stream_arg`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamArg {
    handle: Option<StreamHandle>,
}

impl StreamArg {
    /// Unattached holder
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Attached stream, if any
    pub const fn handle(&self) -> Option<StreamHandle> {
        self.handle
    }
}

/// One image bound to one device
///
/// Owns the compute API, the device binding, the buffers and the pipeline.
/// Buffers must not be replaced while a stage that uses them is in flight;
/// call [`Instance::finish`] first.
#[derive(Debug)]
pub struct Instance<A: ComputeApi> {
    api: A,
    config: RuntimeConfig,
    device: BoundDevice,
    kernel_name: String,
    args: ArgTable,
    buffers: BufferManager,
    pipeline: Pipeline,
}

impl<A: ComputeApi> Instance<A> {
    /// Load an image file and bind it.
    ///
    /// # Errors
    ///
    /// Returns `Container` if the file cannot be read or parsed, otherwise
    /// the errors of [`Self::from_metadata`].
    pub fn open<P: AsRef<Path>>(api: A, path: P, config: RuntimeConfig) -> Result<Self> {
        let meta = ContainerMetadata::from_file(path)?;
        Self::from_metadata(api, &meta, config)
    }

    /// Bind an in-memory image.
    ///
    /// # Errors
    ///
    /// Same as [`Self::open`].
    pub fn from_bytes(api: A, image: impl Into<Bytes>, config: RuntimeConfig) -> Result<Self> {
        let meta = ContainerMetadata::from_bytes(image)?;
        Self::from_metadata(api, &meta, config)
    }

    /// Bind an already parsed image.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound`, `Build` or `Api` from device resolution.
    pub fn from_metadata(mut api: A, meta: &ContainerMetadata, config: RuntimeConfig) -> Result<Self> {
        let emulation = config.effective_emulation(meta.emulation());
        match (config.emulation, emulation) {
            (None, Some(mode)) => warn!(
                "Image targets {mode} emulation; the launcher must set {}={}",
                EmulationMode::ENV_VAR,
                mode.as_env_value()
            ),
            (Some(mode), _) => info!("Running under {mode} emulation"),
            (None, None) => {}
        }

        let kernel_name = meta.kernel_name().to_string();
        let device = DeviceResolver::new(config.queue)
            .with_emulation(emulation)
            .resolve(&mut api, meta.identity(), meta.image(), &kernel_name)?;

        Ok(Self {
            api,
            buffers: BufferManager::new(config.force_host_ptr),
            config,
            device,
            kernel_name,
            args: meta.args().clone(),
            pipeline: Pipeline::new(),
        })
    }

    /// Allocate the buffer for an argument, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Api` if allocation fails.
    pub fn create_buffer(&mut self, request: BufferRequest<'_>) -> Result<BufferHandle> {
        self.buffers
            .create_buffer(&mut self.api, self.device.context, &self.args, request)
    }

    /// Bind a plain-old-data scalar argument.
    ///
    /// # Errors
    ///
    /// Returns `Api` if the API rejects the argument.
    pub fn set_scalar_arg<T: bytemuck::Pod>(&mut self, index: usize, value: T) -> Result<()> {
        if let Some(arg) = self.args.get(index) {
            if arg.category != ArgCategory::Scalar {
                warn!("Argument {index} ({}) is {}, binding a scalar", arg.name, arg.category);
            }
        }
        self.api
            .set_kernel_arg(
                self.device.kernel,
                index,
                KernelArg::Scalar(bytemuck::bytes_of(&value)),
            )
            .map_err(|s| RuntimeError::api("set_kernel_arg", s))
    }

    /// Bind the buffer created for `index` as that kernel argument.
    ///
    /// # Errors
    ///
    /// Returns `UnknownArgument` if no buffer exists for `index`.
    pub fn set_buffer_arg(&mut self, index: usize) -> Result<()> {
        let handle = self.buffers.handle(index)?;
        self.api
            .set_kernel_arg(self.device.kernel, index, KernelArg::Buffer(handle))
            .map_err(|s| RuntimeError::api("set_kernel_arg", s))
    }

    /// Attach a stream to argument `index` and hand it to `stream`.
    ///
    /// # Errors
    ///
    /// Returns `Api` if stream creation fails.
    pub fn set_stream_arg(
        &mut self,
        index: usize,
        direction: StreamDirection,
        stream: &mut StreamArg,
    ) -> Result<()> {
        if let Some(arg) = self.args.get(index) {
            if arg.category != ArgCategory::Stream {
                warn!("Argument {index} ({}) is {}, attaching a stream", arg.name, arg.category);
            }
        }
        let handle = self
            .api
            .create_stream(self.device.device, direction, self.device.kernel, index)
            .map_err(|s| RuntimeError::api("create_stream", s))?;
        stream.handle = Some(handle);
        Ok(())
    }

    /// Submit the load stage.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::write`].
    pub fn write_to_device(&mut self) -> Result<Option<EventHandle>> {
        self.pipeline
            .write(&mut self.api, self.device.queue, &self.buffers)
    }

    /// Submit the compute stage.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::execute`].
    pub fn execute(&mut self) -> Result<EventHandle> {
        self.pipeline
            .execute(&mut self.api, self.device.queue, self.device.kernel)
    }

    /// Submit the store stage.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::read`].
    pub fn read_from_device(&mut self) -> Result<Option<EventHandle>> {
        self.pipeline
            .read(&mut self.api, self.device.queue, &self.buffers)
    }

    /// Block until all submitted work has completed.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::finish`].
    pub fn finish(&mut self) -> Result<()> {
        self.pipeline.finish(&mut self.api, self.device.queue)
    }

    /// Run one full load, compute, store cycle and wait for it.
    ///
    /// # Errors
    ///
    /// Any error of the individual stages or of profiling.
    pub fn invoke(&mut self) -> Result<PipelineMetrics> {
        self.write_to_device()?;
        self.execute()?;
        self.read_from_device()?;
        self.finish()?;
        let metrics = self.pipeline.metrics(&self.api)?;
        debug!("Cycle took {} ns", metrics.span_ns());
        Ok(metrics)
    }

    /// Host memory of the buffer for `index`
    ///
    /// # Errors
    ///
    /// Returns `UnknownArgument` if no buffer exists for `index`.
    pub fn host_data(&self, index: usize) -> Result<&[u8]> {
        let handle = self.buffers.handle(index)?;
        self.api
            .host_memory(handle)
            .map_err(|s| RuntimeError::api("host_memory", s))
    }

    /// Mutable host memory of the buffer for `index`
    ///
    /// # Errors
    ///
    /// Returns `UnknownArgument` if no buffer exists for `index`.
    pub fn host_data_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let handle = self.buffers.handle(index)?;
        self.api
            .host_memory_mut(handle)
            .map_err(|s| RuntimeError::api("host_memory", s))
    }

    /// Load stage execution time; 0 if skipped
    ///
    /// # Errors
    ///
    /// Returns `Api` if the stage has not completed.
    pub fn load_time_ns(&self) -> Result<u64> {
        self.pipeline.elapsed_ns(&self.api, Stage::Load)
    }

    /// Compute stage execution time
    ///
    /// # Errors
    ///
    /// Returns `Api` if the stage has not completed.
    pub fn compute_time_ns(&self) -> Result<u64> {
        self.pipeline.elapsed_ns(&self.api, Stage::Compute)
    }

    /// Store stage execution time; 0 if skipped
    ///
    /// # Errors
    ///
    /// Returns `Api` if the stage has not completed.
    pub fn store_time_ns(&self) -> Result<u64> {
        self.pipeline.elapsed_ns(&self.api, Stage::Store)
    }

    /// Load stage bytes per nanosecond
    ///
    /// # Errors
    ///
    /// Returns `Api` if the stage has not completed.
    pub fn load_throughput(&self) -> Result<f64> {
        self.pipeline.throughput(&self.api, Stage::Load)
    }

    /// Store stage bytes per nanosecond
    ///
    /// # Errors
    ///
    /// Returns `Api` if the stage has not completed.
    pub fn store_throughput(&self) -> Result<f64> {
        self.pipeline.throughput(&self.api, Stage::Store)
    }

    /// Metrics of the latest cycle
    ///
    /// # Errors
    ///
    /// Returns `Api` if a submitted stage has not completed.
    pub fn metrics(&self) -> Result<PipelineMetrics> {
        self.pipeline.metrics(&self.api)
    }

    /// Event of the latest submission of `stage`
    pub const fn stage_event(&self, stage: Stage) -> Option<EventHandle> {
        self.pipeline.event(stage)
    }

    /// Pipeline state
    pub const fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Active kernel name
    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    /// Argument table
    pub const fn args(&self) -> &ArgTable {
        &self.args
    }

    /// Effective emulation mode
    pub const fn emulation(&self) -> Option<EmulationMode> {
        self.device.emulation
    }

    /// Device binding
    pub const fn device(&self) -> &BoundDevice {
        &self.device
    }

    /// Configuration in effect
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Buffers
    pub const fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    /// Compute API
    pub const fn api(&self) -> &A {
        &self.api
    }
}

impl<A: ComputeApi> Drop for Instance<A> {
    fn drop(&mut self) {
        self.pipeline.release_events(&mut self.api);
        let released = self.buffers.release_all(&mut self.api);
        if let Err(s) = self.api.release_context(self.device.context) {
            warn!("Failed to release context on {}: {s}", self.device.device_name);
        }
        info!(
            "Released {} ({released} buffer(s))",
            self.device.device_name
        );
    }
}
