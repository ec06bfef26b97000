//! Compute API abstraction
//!
//! The runtime never talks to an accelerator directly. It drives an
//! OpenCL-shaped command API through [`ComputeApi`]: enumerate platforms and
//! devices, create a context and queue, build the image, allocate buffers
//! with placement directives, and submit migrations and kernel launches
//! chained by events.

use std::fmt::{self, Debug};
use std::ops::{BitOr, BitOrAssign};

/// Result of a compute API call
pub type ApiResult<T> = std::result::Result<T, Status>;

/// Status code returned by the compute API (OpenCL numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    /// `CL_SUCCESS`
    pub const SUCCESS: Self = Self(0);
    /// `CL_DEVICE_NOT_FOUND`
    pub const DEVICE_NOT_FOUND: Self = Self(-1);
    /// `CL_DEVICE_NOT_AVAILABLE`
    pub const DEVICE_NOT_AVAILABLE: Self = Self(-2);
    /// `CL_OUT_OF_RESOURCES`
    pub const OUT_OF_RESOURCES: Self = Self(-5);
    /// `CL_PROFILING_INFO_NOT_AVAILABLE`
    pub const PROFILING_INFO_NOT_AVAILABLE: Self = Self(-7);
    /// `CL_BUILD_PROGRAM_FAILURE`
    pub const BUILD_PROGRAM_FAILURE: Self = Self(-11);
    /// `CL_INVALID_VALUE`
    pub const INVALID_VALUE: Self = Self(-30);
    /// `CL_INVALID_MEM_OBJECT`
    pub const INVALID_MEM_OBJECT: Self = Self(-38);
    /// `CL_INVALID_BINARY`
    pub const INVALID_BINARY: Self = Self(-42);
    /// `CL_INVALID_KERNEL_NAME`
    pub const INVALID_KERNEL_NAME: Self = Self(-46);
    /// `CL_INVALID_EVENT`
    pub const INVALID_EVENT: Self = Self(-58);

    /// True for `CL_SUCCESS`
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Symbolic name, if known
    pub const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0 => "CL_SUCCESS",
            -1 => "CL_DEVICE_NOT_FOUND",
            -2 => "CL_DEVICE_NOT_AVAILABLE",
            -5 => "CL_OUT_OF_RESOURCES",
            -7 => "CL_PROFILING_INFO_NOT_AVAILABLE",
            -11 => "CL_BUILD_PROGRAM_FAILURE",
            -30 => "CL_INVALID_VALUE",
            -38 => "CL_INVALID_MEM_OBJECT",
            -42 => "CL_INVALID_BINARY",
            -46 => "CL_INVALID_KERNEL_NAME",
            -58 => "CL_INVALID_EVENT",
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw id
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Raw id
            pub const fn id(&self) -> u64 {
                self.0
            }
        }
    };
}

handle!(
    /// Platform returned by enumeration
    PlatformId
);
handle!(
    /// Device returned by enumeration
    DeviceId
);
handle!(
    /// Context bound to one device
    ContextHandle
);
handle!(
    /// Command queue
    QueueHandle
);
handle!(
    /// Program built from an image
    ProgramHandle
);
handle!(
    /// Kernel object
    KernelHandle
);
handle!(
    /// Device buffer
    BufferHandle
);
handle!(
    /// Completion token of a submitted command
    EventHandle
);
handle!(
    /// Stream attached to a kernel argument
    StreamHandle
);

/// Buffer allocation flags (`cl_mem_flags`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags(u64);

impl MemFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// `CL_MEM_READ_WRITE`
    pub const READ_WRITE: Self = Self(1 << 0);
    /// `CL_MEM_WRITE_ONLY`
    pub const WRITE_ONLY: Self = Self(1 << 1);
    /// `CL_MEM_READ_ONLY`
    pub const READ_ONLY: Self = Self(1 << 2);
    /// `CL_MEM_USE_HOST_PTR`
    pub const USE_HOST_PTR: Self = Self(1 << 3);
    /// `CL_MEM_EXT_PTR_XILINX`: an [`ExtPtr`] accompanies the allocation
    pub const EXT_PTR_XILINX: Self = Self(xclbin_layout::bank::EXT_PTR_FLAG);

    /// Wrap raw bits
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True if every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MemFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Extended allocation directive (`cl_mem_ext_ptr_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtPtr {
    /// Placement flag, 0 when no bank is requested
    pub flags: u32,

    /// Host memory accompanies the directive
    pub host_attached: bool,
}

/// Command queue properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueProperties {
    /// Commands may run in any order their events allow
    pub out_of_order: bool,

    /// Record profiling timestamps for every event
    pub profiling: bool,
}

impl Default for QueueProperties {
    fn default() -> Self {
        Self {
            out_of_order: true,
            profiling: true,
        }
    }
}

/// Direction of a buffer migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Host memory to device memory
    ToDevice,
    /// Device memory to host memory
    ToHost,
}

/// Profiling instant of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingInfo {
    /// Command enqueued by the host
    Queued,
    /// Command handed to the device
    Submitted,
    /// Command began executing
    Started,
    /// Command finished executing
    Ended,
}

impl ProfilingInfo {
    /// All four instants in chronological order
    pub const ALL: [Self; 4] = [Self::Queued, Self::Submitted, Self::Started, Self::Ended];
}

/// Direction of a kernel stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Host reads what the kernel writes
    Read,
    /// Host writes what the kernel reads
    Write,
}

/// Value bound to a kernel argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg<'a> {
    /// Scalar passed by value
    Scalar(&'a [u8]),
    /// Device buffer
    Buffer(BufferHandle),
}

/// Outcome of building an image against a set of devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramBuild {
    /// Program object
    pub program: ProgramHandle,

    /// One status per device, in the order the devices were given
    pub device_status: Vec<Status>,
}

/// Asynchronous command submission API the runtime drives.
///
/// Every call reports failure as a [`Status`]; callers attach the operation
/// name and propagate. `&mut A` is itself an API, so an instance can borrow
/// a backend instead of owning it.
pub trait ComputeApi: Debug {
    /// Enumerate platforms
    fn platforms(&self) -> ApiResult<Vec<PlatformId>>;

    /// Platform vendor name
    fn platform_name(&self, platform: PlatformId) -> ApiResult<String>;

    /// Enumerate accelerator-class devices on a platform
    fn accelerator_devices(&self, platform: PlatformId) -> ApiResult<Vec<DeviceId>>;

    /// Device name
    fn device_name(&self, device: DeviceId) -> ApiResult<String>;

    /// Create a context on one device
    fn create_context(&mut self, device: DeviceId) -> ApiResult<ContextHandle>;

    /// Release a context and everything created from it
    fn release_context(&mut self, context: ContextHandle) -> ApiResult<()>;

    /// Create a command queue
    fn create_queue(
        &mut self,
        context: ContextHandle,
        device: DeviceId,
        properties: QueueProperties,
    ) -> ApiResult<QueueHandle>;

    /// Build a program from an image for `devices`
    fn build_program(
        &mut self,
        context: ContextHandle,
        devices: &[DeviceId],
        image: &[u8],
    ) -> ApiResult<ProgramBuild>;

    /// Create a kernel object by name
    fn create_kernel(&mut self, program: ProgramHandle, name: &str) -> ApiResult<KernelHandle>;

    /// Bind an argument value
    fn set_kernel_arg(
        &mut self,
        kernel: KernelHandle,
        index: usize,
        value: KernelArg<'_>,
    ) -> ApiResult<()>;

    /// Allocate a buffer, optionally initialized from `host` and placed by `ext`
    fn create_buffer(
        &mut self,
        context: ContextHandle,
        flags: MemFlags,
        size: usize,
        host: Option<&[u8]>,
        ext: Option<ExtPtr>,
    ) -> ApiResult<BufferHandle>;

    /// Release a buffer
    fn release_buffer(&mut self, buffer: BufferHandle) -> ApiResult<()>;

    /// Host-side view of a buffer
    fn host_memory(&self, buffer: BufferHandle) -> ApiResult<&[u8]>;

    /// Mutable host-side view of a buffer
    fn host_memory_mut(&mut self, buffer: BufferHandle) -> ApiResult<&mut [u8]>;

    /// Submit a migration of `buffers` after `wait` completes
    fn enqueue_migrate(
        &mut self,
        queue: QueueHandle,
        buffers: &[BufferHandle],
        direction: MigrationDirection,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle>;

    /// Submit a single work-item launch after `wait` completes
    fn enqueue_task(
        &mut self,
        queue: QueueHandle,
        kernel: KernelHandle,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle>;

    /// Read one profiling timestamp (ns)
    fn profiling_info(&self, event: EventHandle, info: ProfilingInfo) -> ApiResult<u64>;

    /// Drop the caller's reference to an event
    ///
    /// The command behind it still runs; the handle is invalid afterwards.
    fn release_event(&mut self, event: EventHandle) -> ApiResult<()>;

    /// Hand queued commands to the device
    fn flush(&mut self, queue: QueueHandle) -> ApiResult<()>;

    /// Block until every command on the queue has completed
    fn finish(&mut self, queue: QueueHandle) -> ApiResult<()>;

    /// Create a stream bound to argument `index` of `kernel`
    fn create_stream(
        &mut self,
        device: DeviceId,
        direction: StreamDirection,
        kernel: KernelHandle,
        index: usize,
    ) -> ApiResult<StreamHandle>;
}

impl<T: ComputeApi + ?Sized> ComputeApi for &mut T {
    fn platforms(&self) -> ApiResult<Vec<PlatformId>> {
        (**self).platforms()
    }

    fn platform_name(&self, platform: PlatformId) -> ApiResult<String> {
        (**self).platform_name(platform)
    }

    fn accelerator_devices(&self, platform: PlatformId) -> ApiResult<Vec<DeviceId>> {
        (**self).accelerator_devices(platform)
    }

    fn device_name(&self, device: DeviceId) -> ApiResult<String> {
        (**self).device_name(device)
    }

    fn create_context(&mut self, device: DeviceId) -> ApiResult<ContextHandle> {
        (**self).create_context(device)
    }

    fn release_context(&mut self, context: ContextHandle) -> ApiResult<()> {
        (**self).release_context(context)
    }

    fn create_queue(
        &mut self,
        context: ContextHandle,
        device: DeviceId,
        properties: QueueProperties,
    ) -> ApiResult<QueueHandle> {
        (**self).create_queue(context, device, properties)
    }

    fn build_program(
        &mut self,
        context: ContextHandle,
        devices: &[DeviceId],
        image: &[u8],
    ) -> ApiResult<ProgramBuild> {
        (**self).build_program(context, devices, image)
    }

    fn create_kernel(&mut self, program: ProgramHandle, name: &str) -> ApiResult<KernelHandle> {
        (**self).create_kernel(program, name)
    }

    fn set_kernel_arg(
        &mut self,
        kernel: KernelHandle,
        index: usize,
        value: KernelArg<'_>,
    ) -> ApiResult<()> {
        (**self).set_kernel_arg(kernel, index, value)
    }

    fn create_buffer(
        &mut self,
        context: ContextHandle,
        flags: MemFlags,
        size: usize,
        host: Option<&[u8]>,
        ext: Option<ExtPtr>,
    ) -> ApiResult<BufferHandle> {
        (**self).create_buffer(context, flags, size, host, ext)
    }

    fn release_buffer(&mut self, buffer: BufferHandle) -> ApiResult<()> {
        (**self).release_buffer(buffer)
    }

    fn host_memory(&self, buffer: BufferHandle) -> ApiResult<&[u8]> {
        (**self).host_memory(buffer)
    }

    fn host_memory_mut(&mut self, buffer: BufferHandle) -> ApiResult<&mut [u8]> {
        (**self).host_memory_mut(buffer)
    }

    fn enqueue_migrate(
        &mut self,
        queue: QueueHandle,
        buffers: &[BufferHandle],
        direction: MigrationDirection,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle> {
        (**self).enqueue_migrate(queue, buffers, direction, wait)
    }

    fn enqueue_task(
        &mut self,
        queue: QueueHandle,
        kernel: KernelHandle,
        wait: &[EventHandle],
    ) -> ApiResult<EventHandle> {
        (**self).enqueue_task(queue, kernel, wait)
    }

    fn profiling_info(&self, event: EventHandle, info: ProfilingInfo) -> ApiResult<u64> {
        (**self).profiling_info(event, info)
    }

    fn release_event(&mut self, event: EventHandle) -> ApiResult<()> {
        (**self).release_event(event)
    }

    fn flush(&mut self, queue: QueueHandle) -> ApiResult<()> {
        (**self).flush(queue)
    }

    fn finish(&mut self, queue: QueueHandle) -> ApiResult<()> {
        (**self).finish(queue)
    }

    fn create_stream(
        &mut self,
        device: DeviceId,
        direction: StreamDirection,
        kernel: KernelHandle,
        index: usize,
    ) -> ApiResult<StreamHandle> {
        (**self).create_stream(device, direction, kernel, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(
            Status::DEVICE_NOT_AVAILABLE.to_string(),
            "CL_DEVICE_NOT_AVAILABLE (-2)"
        );
        assert_eq!(Status(-9999).to_string(), "status -9999");
        assert!(Status::SUCCESS.is_success());
        assert!(!Status::INVALID_BINARY.is_success());
    }

    #[test]
    fn test_mem_flags() {
        let flags = MemFlags::READ_ONLY | MemFlags::USE_HOST_PTR;
        assert!(flags.contains(MemFlags::READ_ONLY));
        assert!(!flags.contains(MemFlags::WRITE_ONLY));
        assert_eq!(MemFlags::EXT_PTR_XILINX.bits(), 1 << 31);
    }

    #[test]
    fn test_queue_defaults() {
        let props = QueueProperties::default();
        assert!(props.out_of_order);
        assert!(props.profiling);
    }
}
