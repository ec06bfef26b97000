// SPDX-License-Identifier: MIT

//! Software compute API
//!
//! Implements [`ComputeApi`] in-process so images can be bound, buffers
//! placed and pipelines driven without an accelerator. This enables:
//!
//! 1. **CI without hardware**: every runtime path, from device resolution to
//!    profiling, runs against this backend.
//!
//! 2. **Host kernels**: a closure registered under a kernel name runs when a
//!    task for that kernel executes, reading and writing device memory.
//!
//! 3. **Inspection**: allocation directives, event dependencies and device
//!    memory are observable, which hardware never allows.
//!
//! ## Timing model
//!
//! Commands are queued on enqueue and executed in submission order when the
//! queue is flushed. Each command starts once it has been submitted and all
//! of its wait events have ended; on an out-of-order queue independent
//! commands overlap, on an in-order queue each also waits for its
//! predecessor. The clock is simulated and fully deterministic.
//!
//! ```text
//! enqueue   clock += ENQUEUE_NS         queued    = clock
//! flush                                 submitted = clock
//!                                       started   = max(submitted, deps.ended)
//! migrate   MIGRATION_SETUP_NS + bytes / bytes_per_ns
//! task      kernel_ns
//! finish    clock = max(clock, last ended)
//! ```

use crate::api::{
    ApiResult, BufferHandle, ComputeApi, ContextHandle, DeviceId, EventHandle, ExtPtr, KernelArg,
    KernelHandle, MemFlags, MigrationDirection, PlatformId, ProfilingInfo, ProgramBuild,
    ProgramHandle, QueueHandle, QueueProperties, Status, StreamDirection, StreamHandle,
};
use bytes::Bytes;
use frt_container::ContainerMetadata;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Simulated host cost of one enqueue call
pub const ENQUEUE_NS: u64 = 100;

/// Fixed cost of a migration command
pub const MIGRATION_SETUP_NS: u64 = 1_000;

/// Default kernel execution time
pub const DEFAULT_KERNEL_NS: u64 = 10_000;

/// Default transfer rate (8 GB/s)
pub const DEFAULT_BYTES_PER_NS: u64 = 8;

/// A simulated accelerator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareDevice {
    name: String,
    busy: bool,
    rejects_binaries: bool,
}

impl SoftwareDevice {
    /// Device reporting `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            busy: false,
            rejects_binaries: false,
        }
    }

    /// Context creation reports `CL_DEVICE_NOT_AVAILABLE`
    #[must_use]
    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }

    /// Program builds report `CL_INVALID_BINARY` for this device
    #[must_use]
    pub fn rejecting_binaries(mut self) -> Self {
        self.rejects_binaries = true;
        self
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Allocation request as received by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Flags passed to `create_buffer`
    pub flags: MemFlags,

    /// Extended placement directive, if any
    pub ext: Option<ExtPtr>,

    /// Size in bytes
    pub size: usize,
}

/// Command recorded behind an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Buffer migration
    Migrate {
        /// Buffers moved
        buffers: Vec<BufferHandle>,
        /// Direction
        direction: MigrationDirection,
    },
    /// Kernel launch
    Task {
        /// Kernel launched
        kernel: KernelHandle,
    },
}

#[derive(Debug, Clone)]
enum BoundArg {
    Scalar(Vec<u8>),
    Buffer(BufferHandle),
}

#[derive(Debug)]
struct BufferEntry {
    allocation: Allocation,
    host: Vec<u8>,
    device: Vec<u8>,
}

/// View of a running task handed to a host kernel
pub struct KernelInvocation<'a> {
    name: &'a str,
    args: &'a BTreeMap<usize, BoundArg>,
    buffers: &'a mut HashMap<BufferHandle, BufferEntry>,
}

impl KernelInvocation<'_> {
    /// Kernel name
    pub fn name(&self) -> &str {
        self.name
    }

    /// Scalar argument at `index`
    pub fn scalar<T: bytemuck::Pod>(&self, index: usize) -> Option<T> {
        match self.args.get(&index)? {
            BoundArg::Scalar(bytes) => bytemuck::try_pod_read_unaligned(bytes).ok(),
            BoundArg::Buffer(_) => None,
        }
    }

    /// Copy of the device memory bound at `index`
    pub fn read(&self, index: usize) -> Option<Vec<u8>> {
        match self.args.get(&index)? {
            BoundArg::Buffer(handle) => self.buffers.get(handle).map(|b| b.device.clone()),
            BoundArg::Scalar(_) => None,
        }
    }

    /// Overwrite the device memory bound at `index`. Extra bytes are dropped.
    ///
    /// Returns false if `index` is not a buffer argument.
    pub fn write(&mut self, index: usize, data: &[u8]) -> bool {
        let Some(BoundArg::Buffer(handle)) = self.args.get(&index) else {
            return false;
        };
        let Some(buffer) = self.buffers.get_mut(handle) else {
            return false;
        };
        let n = data.len().min(buffer.device.len());
        buffer.device[..n].copy_from_slice(&data[..n]);
        true
    }
}

type HostKernelFn = Box<dyn FnMut(&mut KernelInvocation<'_>)>;

struct HostKernel(HostKernelFn);

impl fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostKernel")
    }
}

#[derive(Debug)]
struct PlatformEntry {
    name: String,
    devices: Vec<DeviceId>,
}

#[derive(Debug)]
struct QueueState {
    properties: QueueProperties,
    pending: Vec<EventHandle>,
    last_end: u64,
}

#[derive(Debug)]
struct ProgramEntry {
    kernels: Vec<String>,
}

#[derive(Debug)]
struct KernelEntry {
    name: String,
    args: BTreeMap<usize, BoundArg>,
}

#[derive(Debug)]
struct EventRecord {
    command: Command,
    wait: Vec<EventHandle>,
    profiling: bool,
    queued: u64,
    submitted: Option<u64>,
    started: Option<u64>,
    ended: Option<u64>,
    released: bool,
}

/// In-process [`ComputeApi`]
#[derive(Debug)]
pub struct SoftwareApi {
    platforms: Vec<PlatformEntry>,
    devices: Vec<SoftwareDevice>,
    contexts: HashMap<ContextHandle, DeviceId>,
    queues: HashMap<QueueHandle, QueueState>,
    programs: HashMap<ProgramHandle, ProgramEntry>,
    kernels: HashMap<KernelHandle, KernelEntry>,
    buffers: HashMap<BufferHandle, BufferEntry>,
    events: BTreeMap<EventHandle, EventRecord>,
    streams: HashMap<StreamHandle, (KernelHandle, usize, StreamDirection)>,
    host_kernels: HashMap<String, HostKernel>,
    clock: u64,
    next_id: u64,
    kernel_ns: u64,
    bytes_per_ns: u64,
}

impl Default for SoftwareApi {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareApi {
    /// Backend with no platforms
    pub fn new() -> Self {
        Self {
            platforms: Vec::new(),
            devices: Vec::new(),
            contexts: HashMap::new(),
            queues: HashMap::new(),
            programs: HashMap::new(),
            kernels: HashMap::new(),
            buffers: HashMap::new(),
            events: BTreeMap::new(),
            streams: HashMap::new(),
            host_kernels: HashMap::new(),
            clock: 0,
            next_id: 1,
            kernel_ns: DEFAULT_KERNEL_NS,
            bytes_per_ns: DEFAULT_BYTES_PER_NS,
        }
    }

    /// Backend with one platform carrying one idle device
    pub fn for_device(vendor: impl Into<String>, device: impl Into<String>) -> Self {
        Self::new().with_platform(vendor, [SoftwareDevice::new(device)])
    }

    /// Add a platform and its devices
    #[must_use]
    pub fn with_platform(
        mut self,
        vendor: impl Into<String>,
        devices: impl IntoIterator<Item = SoftwareDevice>,
    ) -> Self {
        let mut ids = Vec::new();
        for device in devices {
            ids.push(DeviceId::new(self.devices.len() as u64));
            self.devices.push(device);
        }
        self.platforms.push(PlatformEntry {
            name: vendor.into(),
            devices: ids,
        });
        self
    }

    /// Set the simulated kernel execution time
    #[must_use]
    pub fn with_kernel_time(mut self, ns: u64) -> Self {
        self.kernel_ns = ns.max(1);
        self
    }

    /// Set the simulated transfer rate
    #[must_use]
    pub fn with_bandwidth(mut self, bytes_per_ns: u64) -> Self {
        self.bytes_per_ns = bytes_per_ns.max(1);
        self
    }

    /// Run `kernel` whenever a task for kernel `name` executes
    #[must_use]
    pub fn with_host_kernel(
        mut self,
        name: impl Into<String>,
        kernel: impl FnMut(&mut KernelInvocation<'_>) + 'static,
    ) -> Self {
        self.register_kernel(name, kernel);
        self
    }

    /// Register a host kernel, replacing any previous one for `name`
    pub fn register_kernel(
        &mut self,
        name: impl Into<String>,
        kernel: impl FnMut(&mut KernelInvocation<'_>) + 'static,
    ) {
        self.host_kernels
            .insert(name.into(), HostKernel(Box::new(kernel)));
    }

    /// Allocation directive a buffer was created with
    pub fn allocation(&self, buffer: BufferHandle) -> Option<&Allocation> {
        self.buffers.get(&buffer).map(|b| &b.allocation)
    }

    /// Wait list an event was submitted with
    pub fn event_dependencies(&self, event: EventHandle) -> Option<&[EventHandle]> {
        self.live_event(event).map(|e| e.wait.as_slice())
    }

    /// Command behind an event
    pub fn event_command(&self, event: EventHandle) -> Option<&Command> {
        self.live_event(event).map(|e| &e.command)
    }

    /// Number of event records held, counting released events that a
    /// queued command still waits on
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Device-side contents of a buffer
    pub fn device_memory(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.device.as_slice())
    }

    /// Kernel and argument index a stream is attached to
    pub fn stream_binding(&self, stream: StreamHandle) -> Option<(KernelHandle, usize, StreamDirection)> {
        self.streams.get(&stream).copied()
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live contexts
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Current simulated time (ns)
    pub const fn now(&self) -> u64 {
        self.clock
    }

    fn live_event(&self, event: EventHandle) -> Option<&EventRecord> {
        self.events.get(&event).filter(|e| !e.released)
    }

    /// Drop released records nothing queued refers to any more.
    fn collect_released(&mut self) {
        let mut pinned: HashSet<EventHandle> = HashSet::new();
        for state in self.queues.values() {
            for event in &state.pending {
                pinned.insert(*event);
                if let Some(record) = self.events.get(event) {
                    pinned.extend(record.wait.iter().copied());
                }
            }
        }
        let before = self.events.len();
        self.events
            .retain(|event, record| !record.released || pinned.contains(event));
        if self.events.len() < before {
            debug!("Dropped {} released event(s)", before - self.events.len());
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn device(&self, device: DeviceId) -> ApiResult<&SoftwareDevice> {
        usize::try_from(device.id())
            .ok()
            .and_then(|i| self.devices.get(i))
            .ok_or(Status::DEVICE_NOT_FOUND)
    }

    fn platform(&self, platform: PlatformId) -> ApiResult<&PlatformEntry> {
        usize::try_from(platform.id())
            .ok()
            .and_then(|i| self.platforms.get(i))
            .ok_or(Status::INVALID_VALUE)
    }

    fn submit(
        &mut self,
        queue: QueueHandle,
        command: Command,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle> {
        if wait.iter().any(|e| self.live_event(*e).is_none()) {
            return Err(Status::INVALID_EVENT);
        }
        let profiling = self
            .queues
            .get(&queue)
            .ok_or(Status::INVALID_VALUE)?
            .properties
            .profiling;

        self.clock += ENQUEUE_NS;
        let event = EventHandle::new(self.next_handle());
        self.events.insert(
            event,
            EventRecord {
                command,
                wait: wait.to_vec(),
                profiling,
                queued: self.clock,
                submitted: None,
                started: None,
                ended: None,
                released: false,
            },
        );
        if let Some(state) = self.queues.get_mut(&queue) {
            state.pending.push(event);
        }
        Ok(event)
    }

    fn run_pending(&mut self, queue: QueueHandle) -> ApiResult<()> {
        let state = self.queues.get_mut(&queue).ok_or(Status::INVALID_VALUE)?;
        let pending = std::mem::take(&mut state.pending);
        let in_order = !state.properties.out_of_order;
        let mut last_end = state.last_end;
        let submitted = self.clock;

        for event in pending {
            let record = self.events.get(&event).ok_or(Status::INVALID_EVENT)?;
            let mut start = submitted;
            for dep in &record.wait {
                let ended = self
                    .events
                    .get(dep)
                    .and_then(|d| d.ended)
                    .ok_or(Status::INVALID_EVENT)?;
                start = start.max(ended);
            }
            if in_order {
                start = start.max(last_end);
            }

            let command = record.command.clone();
            let cost = self.execute(&command)?;
            let end = start + cost;

            if let Some(record) = self.events.get_mut(&event) {
                record.submitted = Some(submitted);
                record.started = Some(start);
                record.ended = Some(end);
            }
            debug!("Event {} ran [{start}, {end}]", event.id());
            last_end = last_end.max(end);
        }

        if let Some(state) = self.queues.get_mut(&queue) {
            state.last_end = last_end;
        }
        self.collect_released();
        Ok(())
    }

    fn execute(&mut self, command: &Command) -> ApiResult<u64> {
        match command {
            Command::Migrate { buffers, direction } => {
                let mut bytes = 0u64;
                for handle in buffers {
                    let buffer = self
                        .buffers
                        .get_mut(handle)
                        .ok_or(Status::INVALID_MEM_OBJECT)?;
                    match direction {
                        MigrationDirection::ToDevice => buffer.device.copy_from_slice(&buffer.host),
                        MigrationDirection::ToHost => buffer.host.copy_from_slice(&buffer.device),
                    }
                    bytes += buffer.host.len() as u64;
                }
                Ok(MIGRATION_SETUP_NS + bytes.div_ceil(self.bytes_per_ns))
            }
            Command::Task { kernel } => {
                let entry = self.kernels.get(kernel).ok_or(Status::INVALID_VALUE)?;
                if let Some(host) = self.host_kernels.get_mut(&entry.name) {
                    let mut invocation = KernelInvocation {
                        name: &entry.name,
                        args: &entry.args,
                        buffers: &mut self.buffers,
                    };
                    (host.0)(&mut invocation);
                }
                Ok(self.kernel_ns)
            }
        }
    }
}

impl ComputeApi for SoftwareApi {
    fn platforms(&self) -> ApiResult<Vec<PlatformId>> {
        Ok((0..self.platforms.len() as u64).map(PlatformId::new).collect())
    }

    fn platform_name(&self, platform: PlatformId) -> ApiResult<String> {
        Ok(self.platform(platform)?.name.clone())
    }

    fn accelerator_devices(&self, platform: PlatformId) -> ApiResult<Vec<DeviceId>> {
        let devices = &self.platform(platform)?.devices;
        if devices.is_empty() {
            return Err(Status::DEVICE_NOT_FOUND);
        }
        Ok(devices.clone())
    }

    fn device_name(&self, device: DeviceId) -> ApiResult<String> {
        Ok(self.device(device)?.name.clone())
    }

    fn create_context(&mut self, device: DeviceId) -> ApiResult<ContextHandle> {
        if self.device(device)?.busy {
            return Err(Status::DEVICE_NOT_AVAILABLE);
        }
        let context = ContextHandle::new(self.next_handle());
        self.contexts.insert(context, device);
        Ok(context)
    }

    fn release_context(&mut self, context: ContextHandle) -> ApiResult<()> {
        self.contexts
            .remove(&context)
            .map(|_| ())
            .ok_or(Status::INVALID_VALUE)
    }

    fn create_queue(
        &mut self,
        context: ContextHandle,
        device: DeviceId,
        properties: QueueProperties,
    ) -> ApiResult<QueueHandle> {
        if self.contexts.get(&context) != Some(&device) {
            return Err(Status::INVALID_VALUE);
        }
        let queue = QueueHandle::new(self.next_handle());
        self.queues.insert(
            queue,
            QueueState {
                properties,
                pending: Vec::new(),
                last_end: 0,
            },
        );
        Ok(queue)
    }

    fn build_program(
        &mut self,
        context: ContextHandle,
        devices: &[DeviceId],
        image: &[u8],
    ) -> ApiResult<ProgramBuild> {
        if !self.contexts.contains_key(&context) {
            return Err(Status::INVALID_VALUE);
        }

        let parsed = ContainerMetadata::from_bytes(Bytes::copy_from_slice(image));
        if let Err(e) = &parsed {
            warn!("Software backend cannot read image: {e}");
        }

        let device_status: Vec<Status> = devices
            .iter()
            .map(|&id| match (self.device(id), &parsed) {
                (Err(status), _) => status,
                (Ok(_), Err(_)) => Status::INVALID_BINARY,
                (Ok(device), Ok(_)) if device.rejects_binaries => Status::INVALID_BINARY,
                (Ok(device), Ok(meta)) if meta.identity().device_name != device.name => {
                    Status::INVALID_BINARY
                }
                (Ok(_), Ok(_)) => Status::SUCCESS,
            })
            .collect();

        let kernels = match &parsed {
            Ok(meta) if device_status.iter().all(|s| s.is_success()) => {
                meta.kernels().iter().map(|k| k.name.clone()).collect()
            }
            _ => Vec::new(),
        };
        debug!("Built program with kernels {kernels:?}");

        let program = ProgramHandle::new(self.next_handle());
        self.programs.insert(program, ProgramEntry { kernels });
        Ok(ProgramBuild {
            program,
            device_status,
        })
    }

    fn create_kernel(&mut self, program: ProgramHandle, name: &str) -> ApiResult<KernelHandle> {
        let entry = self.programs.get(&program).ok_or(Status::INVALID_VALUE)?;
        if !entry.kernels.iter().any(|k| k == name) {
            return Err(Status::INVALID_KERNEL_NAME);
        }
        let kernel = KernelHandle::new(self.next_handle());
        self.kernels.insert(
            kernel,
            KernelEntry {
                name: name.to_string(),
                args: BTreeMap::new(),
            },
        );
        Ok(kernel)
    }

    fn set_kernel_arg(
        &mut self,
        kernel: KernelHandle,
        index: usize,
        value: KernelArg<'_>,
    ) -> ApiResult<()> {
        let bound = match value {
            KernelArg::Scalar(bytes) => BoundArg::Scalar(bytes.to_vec()),
            KernelArg::Buffer(handle) => {
                if !self.buffers.contains_key(&handle) {
                    return Err(Status::INVALID_MEM_OBJECT);
                }
                BoundArg::Buffer(handle)
            }
        };
        let entry = self.kernels.get_mut(&kernel).ok_or(Status::INVALID_VALUE)?;
        entry.args.insert(index, bound);
        Ok(())
    }

    fn create_buffer(
        &mut self,
        context: ContextHandle,
        flags: MemFlags,
        size: usize,
        host: Option<&[u8]>,
        ext: Option<ExtPtr>,
    ) -> ApiResult<BufferHandle> {
        if !self.contexts.contains_key(&context) || size == 0 {
            return Err(Status::INVALID_VALUE);
        }
        let host = match host {
            Some(data) if data.len() < size => return Err(Status::INVALID_VALUE),
            Some(data) => data[..size].to_vec(),
            None => vec![0; size],
        };

        let buffer = BufferHandle::new(self.next_handle());
        debug!(
            "Buffer {}: {size} bytes, flags {:#x}, ext {ext:?}",
            buffer.id(),
            flags.bits()
        );
        self.buffers.insert(
            buffer,
            BufferEntry {
                allocation: Allocation { flags, ext, size },
                host,
                device: vec![0; size],
            },
        );
        Ok(buffer)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) -> ApiResult<()> {
        self.buffers
            .remove(&buffer)
            .map(|_| ())
            .ok_or(Status::INVALID_MEM_OBJECT)
    }

    fn host_memory(&self, buffer: BufferHandle) -> ApiResult<&[u8]> {
        self.buffers
            .get(&buffer)
            .map(|b| b.host.as_slice())
            .ok_or(Status::INVALID_MEM_OBJECT)
    }

    fn host_memory_mut(&mut self, buffer: BufferHandle) -> ApiResult<&mut [u8]> {
        self.buffers
            .get_mut(&buffer)
            .map(|b| b.host.as_mut_slice())
            .ok_or(Status::INVALID_MEM_OBJECT)
    }

    fn enqueue_migrate(
        &mut self,
        queue: QueueHandle,
        buffers: &[BufferHandle],
        direction: MigrationDirection,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle> {
        if buffers.is_empty() {
            return Err(Status::INVALID_VALUE);
        }
        if buffers.iter().any(|b| !self.buffers.contains_key(b)) {
            return Err(Status::INVALID_MEM_OBJECT);
        }
        self.submit(
            queue,
            Command::Migrate {
                buffers: buffers.to_vec(),
                direction,
            },
            wait,
        )
    }

    fn enqueue_task(
        &mut self,
        queue: QueueHandle,
        kernel: KernelHandle,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle> {
        if !self.kernels.contains_key(&kernel) {
            return Err(Status::INVALID_VALUE);
        }
        self.submit(queue, Command::Task { kernel }, wait)
    }

    fn profiling_info(&self, event: EventHandle, info: ProfilingInfo) -> ApiResult<u64> {
        let record = self.live_event(event).ok_or(Status::INVALID_EVENT)?;
        if !record.profiling {
            return Err(Status::PROFILING_INFO_NOT_AVAILABLE);
        }
        match info {
            ProfilingInfo::Queued => Some(record.queued),
            ProfilingInfo::Submitted => record.submitted,
            ProfilingInfo::Started => record.started,
            ProfilingInfo::Ended => record.ended,
        }
        .ok_or(Status::PROFILING_INFO_NOT_AVAILABLE)
    }

    fn release_event(&mut self, event: EventHandle) -> ApiResult<()> {
        let record = self
            .events
            .get_mut(&event)
            .filter(|e| !e.released)
            .ok_or(Status::INVALID_EVENT)?;
        record.released = true;
        self.collect_released();
        Ok(())
    }

    fn flush(&mut self, queue: QueueHandle) -> ApiResult<()> {
        self.run_pending(queue)
    }

    fn finish(&mut self, queue: QueueHandle) -> ApiResult<()> {
        self.run_pending(queue)?;
        let last_end = self.queues.get(&queue).map_or(0, |q| q.last_end);
        self.clock = self.clock.max(last_end);
        Ok(())
    }

    fn create_stream(
        &mut self,
        device: DeviceId,
        direction: StreamDirection,
        kernel: KernelHandle,
        index: usize,
    ) -> ApiResult<StreamHandle> {
        self.device(device)?;
        if !self.kernels.contains_key(&kernel) {
            return Err(Status::INVALID_VALUE);
        }
        let stream = StreamHandle::new(self.next_handle());
        self.streams.insert(stream, (kernel, index, direction));
        info!("Stream {} attached to argument {index} ({direction:?})", stream.id());
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frt_container::builder::XclbinBuilder;

    fn bound(api: &mut SoftwareApi) -> (ContextHandle, QueueHandle, KernelHandle) {
        let image = XclbinBuilder::new("u200", "vadd")
            .buffer("a", "int*")
            .scalar("n", "int")
            .build();
        let device = DeviceId::new(0);
        let context = api.create_context(device).unwrap();
        let queue = api
            .create_queue(context, device, QueueProperties::default())
            .unwrap();
        let build = api.build_program(context, &[device], &image).unwrap();
        assert_eq!(build.device_status, vec![Status::SUCCESS]);
        let kernel = api.create_kernel(build.program, "vadd").unwrap();
        (context, queue, kernel)
    }

    #[test]
    fn test_enumeration() {
        let api = SoftwareApi::new()
            .with_platform("Intel", [SoftwareDevice::new("cpu")])
            .with_platform("Xilinx", [SoftwareDevice::new("u200"), SoftwareDevice::new("u200")]);

        let platforms = api.platforms().unwrap();
        assert_eq!(platforms.len(), 2);
        assert_eq!(api.platform_name(platforms[1]).unwrap(), "Xilinx");
        let devices = api.accelerator_devices(platforms[1]).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(api.device_name(devices[0]).unwrap(), "u200");
    }

    #[test]
    fn test_busy_device() {
        let mut api = SoftwareApi::new().with_platform("Xilinx", [SoftwareDevice::new("u200").busy()]);
        assert_eq!(
            api.create_context(DeviceId::new(0)),
            Err(Status::DEVICE_NOT_AVAILABLE)
        );
    }

    #[test]
    fn test_build_rejects_foreign_image() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200");
        let device = DeviceId::new(0);
        let context = api.create_context(device).unwrap();

        let image = XclbinBuilder::new("u280", "vadd").build();
        let build = api.build_program(context, &[device], &image).unwrap();
        assert_eq!(build.device_status, vec![Status::INVALID_BINARY]);
        assert_eq!(
            api.create_kernel(build.program, "vadd"),
            Err(Status::INVALID_KERNEL_NAME)
        );

        let build = api.build_program(context, &[device], b"garbage").unwrap();
        assert_eq!(build.device_status, vec![Status::INVALID_BINARY]);
    }

    #[test]
    fn test_unknown_kernel_name() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200");
        let device = DeviceId::new(0);
        let context = api.create_context(device).unwrap();
        let image = XclbinBuilder::new("u200", "vadd").build();
        let build = api.build_program(context, &[device], &image).unwrap();
        assert_eq!(
            api.create_kernel(build.program, "vmul"),
            Err(Status::INVALID_KERNEL_NAME)
        );
    }

    #[test]
    fn test_deferred_execution_and_timestamps() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200").with_kernel_time(5_000);
        let (context, queue, kernel) = bound(&mut api);

        let buffer = api
            .create_buffer(context, MemFlags::READ_ONLY, 16, Some(&[7u8; 16]), None)
            .unwrap();
        api.set_kernel_arg(kernel, 0, KernelArg::Buffer(buffer)).unwrap();

        let load = api
            .enqueue_migrate(queue, &[buffer], MigrationDirection::ToDevice, &[])
            .unwrap();
        let run = api.enqueue_task(queue, kernel, &[load]).unwrap();

        assert_eq!(api.device_memory(buffer).unwrap(), &[0u8; 16]);
        assert_eq!(
            api.profiling_info(run, ProfilingInfo::Ended),
            Err(Status::PROFILING_INFO_NOT_AVAILABLE)
        );

        api.finish(queue).unwrap();
        assert_eq!(api.device_memory(buffer).unwrap(), &[7u8; 16]);

        let load_end = api.profiling_info(load, ProfilingInfo::Ended).unwrap();
        let run_start = api.profiling_info(run, ProfilingInfo::Started).unwrap();
        let run_end = api.profiling_info(run, ProfilingInfo::Ended).unwrap();
        assert_eq!(run_start, load_end);
        assert_eq!(run_end - run_start, 5_000);
        assert_eq!(api.event_dependencies(run).unwrap(), &[load]);
        assert!(api.now() >= run_end);
    }

    #[test]
    fn test_released_event_is_kept_while_awaited() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200").with_kernel_time(2_000);
        let (context, queue, kernel) = bound(&mut api);
        let buffer = api
            .create_buffer(context, MemFlags::READ_ONLY, 64, None, None)
            .unwrap();

        let load = api
            .enqueue_migrate(queue, &[buffer], MigrationDirection::ToDevice, &[])
            .unwrap();
        let run = api.enqueue_task(queue, kernel, &[load]).unwrap();
        api.release_event(load).unwrap();

        assert_eq!(api.event_count(), 2);
        assert_eq!(api.release_event(load), Err(Status::INVALID_EVENT));
        assert_eq!(
            api.enqueue_task(queue, kernel, &[load]),
            Err(Status::INVALID_EVENT)
        );

        api.finish(queue).unwrap();
        assert_eq!(api.event_count(), 1);
        assert_eq!(
            api.profiling_info(load, ProfilingInfo::Ended),
            Err(Status::INVALID_EVENT)
        );
        let started = api.profiling_info(run, ProfilingInfo::Started).unwrap();
        let submitted = api.profiling_info(run, ProfilingInfo::Submitted).unwrap();
        assert!(started > submitted);

        api.release_event(run).unwrap();
        assert_eq!(api.event_count(), 0);
    }

    #[test]
    fn test_in_order_queue_serializes() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200");
        let (context, _, kernel) = bound(&mut api);
        let queue = api
            .create_queue(
                context,
                DeviceId::new(0),
                QueueProperties {
                    out_of_order: false,
                    profiling: true,
                },
            )
            .unwrap();

        let first = api.enqueue_task(queue, kernel, &[]).unwrap();
        let second = api.enqueue_task(queue, kernel, &[]).unwrap();
        api.finish(queue).unwrap();

        assert_eq!(
            api.profiling_info(second, ProfilingInfo::Started).unwrap(),
            api.profiling_info(first, ProfilingInfo::Ended).unwrap()
        );
    }

    #[test]
    fn test_profiling_disabled() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200");
        let (context, _, kernel) = bound(&mut api);
        let queue = api
            .create_queue(
                context,
                DeviceId::new(0),
                QueueProperties {
                    out_of_order: true,
                    profiling: false,
                },
            )
            .unwrap();
        let event = api.enqueue_task(queue, kernel, &[]).unwrap();
        api.finish(queue).unwrap();
        assert_eq!(
            api.profiling_info(event, ProfilingInfo::Queued),
            Err(Status::PROFILING_INFO_NOT_AVAILABLE)
        );
    }

    #[test]
    fn test_host_kernel_sees_arguments() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200").with_host_kernel("vadd", |inv| {
            let n: i32 = inv.scalar(1).unwrap_or(0);
            let mut data = inv.read(0).unwrap_or_default();
            for byte in &mut data {
                *byte = byte.wrapping_add(n as u8);
            }
            inv.write(0, &data);
        });
        let (context, queue, kernel) = bound(&mut api);

        let buffer = api
            .create_buffer(context, MemFlags::READ_WRITE, 4, Some(&[1, 2, 3, 4]), None)
            .unwrap();
        api.set_kernel_arg(kernel, 0, KernelArg::Buffer(buffer)).unwrap();
        api.set_kernel_arg(kernel, 1, KernelArg::Scalar(&10i32.to_le_bytes()))
            .unwrap();

        let load = api
            .enqueue_migrate(queue, &[buffer], MigrationDirection::ToDevice, &[])
            .unwrap();
        let run = api.enqueue_task(queue, kernel, &[load]).unwrap();
        api.enqueue_migrate(queue, &[buffer], MigrationDirection::ToHost, &[run])
            .unwrap();
        api.finish(queue).unwrap();

        assert_eq!(api.host_memory(buffer).unwrap(), &[11, 12, 13, 14]);
    }

    #[test]
    fn test_invalid_handles() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200");
        let (context, queue, kernel) = bound(&mut api);

        assert_eq!(
            api.enqueue_task(queue, kernel, &[EventHandle::new(999)]),
            Err(Status::INVALID_EVENT)
        );
        assert_eq!(
            api.set_kernel_arg(kernel, 0, KernelArg::Buffer(BufferHandle::new(999))),
            Err(Status::INVALID_MEM_OBJECT)
        );
        assert_eq!(
            api.create_buffer(context, MemFlags::READ_ONLY, 8, Some(&[0u8; 4]), None),
            Err(Status::INVALID_VALUE)
        );
        assert_eq!(
            api.release_buffer(BufferHandle::new(999)),
            Err(Status::INVALID_MEM_OBJECT)
        );
    }

    #[test]
    fn test_stream_binding() {
        let mut api = SoftwareApi::for_device("Xilinx", "u200");
        let (_, _, kernel) = bound(&mut api);
        let stream = api
            .create_stream(DeviceId::new(0), StreamDirection::Write, kernel, 2)
            .unwrap();
        assert_eq!(
            api.stream_binding(stream),
            Some((kernel, 2, StreamDirection::Write))
        );
    }
}
