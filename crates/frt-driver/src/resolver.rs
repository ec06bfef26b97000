//! Device resolution
//!
//! Finds a device whose platform vendor and device name match the image,
//! binds a context and queue to it, builds the image and instantiates the
//! kernel. Cards with identical names are common, so a device held by
//! another process is skipped rather than treated as fatal.

use crate::api::{
    ComputeApi, ContextHandle, DeviceId, KernelHandle, PlatformId, ProgramHandle, QueueHandle,
    QueueProperties, Status,
};
use crate::error::{Result, RuntimeError};
use frt_container::{DeviceIdentity, EmulationMode};
use tracing::{debug, error, info, warn};

/// A device bound to one runtime instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundDevice {
    /// Platform the device was found on
    pub platform: PlatformId,

    /// Device
    pub device: DeviceId,

    /// Device name as reported by the API
    pub device_name: String,

    /// Context created on the device
    pub context: ContextHandle,

    /// Command queue
    pub queue: QueueHandle,

    /// Program built from the image
    pub program: ProgramHandle,

    /// Active kernel
    pub kernel: KernelHandle,

    /// Emulation mode the device was bound under, if any
    pub emulation: Option<EmulationMode>,
}

/// Device resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceResolver {
    queue: QueueProperties,
    emulation: Option<EmulationMode>,
}

impl DeviceResolver {
    /// Resolver that creates queues with `queue` properties
    pub const fn new(queue: QueueProperties) -> Self {
        Self {
            queue,
            emulation: None,
        }
    }

    /// Bind devices under an emulation mode
    ///
    /// The mode travels with the [`BoundDevice`]; a hardware backend selects
    /// its emulation target from it.
    #[must_use]
    pub const fn with_emulation(mut self, emulation: Option<EmulationMode>) -> Self {
        self.emulation = emulation;
        self
    }

    /// Emulation mode devices are bound under
    pub const fn emulation(&self) -> Option<EmulationMode> {
        self.emulation
    }

    /// Bind a device matching `identity`, build `image` on it and create
    /// `kernel_name`.
    ///
    /// # Errors
    ///
    /// - `DeviceNotFound` when no matching device could be bound
    /// - `Build` when the image does not build for the bound device
    /// - `Api` for any other failing call
    pub fn resolve<A: ComputeApi + ?Sized>(
        &self,
        api: &mut A,
        identity: &DeviceIdentity,
        image: &[u8],
        kernel_name: &str,
    ) -> Result<BoundDevice> {
        let (platform, device, context) = Self::bind_context(api, identity)?;
        let device_name = identity.device_name.clone();

        let instantiated = self.instantiate(api, context, device, &device_name, image, kernel_name);
        let (queue, program, kernel) = match instantiated {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(s) = api.release_context(context) {
                    warn!("Failed to release context on {device_name}: {s}");
                }
                return Err(e);
            }
        };

        info!("Bound {device_name} (device {}), kernel {kernel_name}", device.id());

        Ok(BoundDevice {
            platform,
            device,
            device_name,
            context,
            queue,
            program,
            kernel,
            emulation: self.emulation,
        })
    }

    fn instantiate<A: ComputeApi + ?Sized>(
        &self,
        api: &mut A,
        context: ContextHandle,
        device: DeviceId,
        device_name: &str,
        image: &[u8],
        kernel_name: &str,
    ) -> Result<(QueueHandle, ProgramHandle, KernelHandle)> {
        let queue = api
            .create_queue(context, device, self.queue)
            .map_err(|s| RuntimeError::api("create_queue", s))?;

        let build = api
            .build_program(context, &[device], image)
            .map_err(|s| RuntimeError::api("build_program", s))?;
        if let Some(&status) = build.device_status.iter().find(|s| !s.is_success()) {
            error!("Build failed for {device_name}: {status}");
            return Err(RuntimeError::Build {
                device: device_name.to_string(),
                status,
            });
        }

        let kernel = api
            .create_kernel(build.program, kernel_name)
            .map_err(|s| RuntimeError::api("create_kernel", s))?;
        Ok((queue, build.program, kernel))
    }

    /// Find the first matching device that accepts a context.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` once every candidate is exhausted, or `Api`
    /// for enumeration failures and context errors other than "not available".
    pub fn bind_context<A: ComputeApi + ?Sized>(
        api: &mut A,
        identity: &DeviceIdentity,
    ) -> Result<(PlatformId, DeviceId, ContextHandle)> {
        let platforms = api
            .platforms()
            .map_err(|s| RuntimeError::api("platforms", s))?;

        for platform in platforms {
            let vendor = api
                .platform_name(platform)
                .map_err(|s| RuntimeError::api("platform_name", s))?;
            if vendor != identity.vendor {
                debug!("Skipping platform {vendor}");
                continue;
            }

            let devices = match api.accelerator_devices(platform) {
                Ok(devices) => devices,
                Err(Status::DEVICE_NOT_FOUND) => {
                    debug!("Platform {vendor} has no accelerators");
                    continue;
                }
                Err(s) => return Err(RuntimeError::api("accelerator_devices", s)),
            };

            for device in devices {
                let name = api
                    .device_name(device)
                    .map_err(|s| RuntimeError::api("device_name", s))?;
                if name != identity.device_name {
                    continue;
                }

                match api.create_context(device) {
                    Ok(context) => return Ok((platform, device, context)),
                    Err(Status::DEVICE_NOT_AVAILABLE) => {
                        warn!("{name} (device {}) is in use, trying next", device.id());
                    }
                    Err(s) => return Err(RuntimeError::api("create_context", s)),
                }
            }
        }

        error!(
            "No available {} device on a {} platform",
            identity.device_name, identity.vendor
        );
        Err(RuntimeError::DeviceNotFound {
            vendor: identity.vendor.clone(),
            device: identity.device_name.clone(),
        })
    }
}
