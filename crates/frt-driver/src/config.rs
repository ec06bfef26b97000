//! Runtime configuration

use crate::api::QueueProperties;
use frt_container::EmulationMode;
use tracing::{debug, warn};

/// Runtime configuration
///
/// Passed explicitly to [`crate::Instance`]; the runtime never reads or
/// writes process-wide state behind the caller's back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Emulation mode requested by the environment; wins over the image's hint
    pub emulation: Option<EmulationMode>,

    /// OR `USE_HOST_PTR` into every buffer allocation
    pub force_host_ptr: bool,

    /// Properties of the command queue
    pub queue: QueueProperties,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            emulation: None,
            force_host_ptr: true,
            queue: QueueProperties::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults plus `XCL_EMULATION_MODE` from the process environment
    pub fn from_env() -> Self {
        let value = std::env::var(EmulationMode::ENV_VAR).ok();
        Self::default().with_env_value(value.as_deref())
    }

    /// Apply a raw `XCL_EMULATION_MODE` value. Unknown values warn and are ignored.
    #[must_use]
    pub fn with_env_value(mut self, value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => {}
            Some(raw) => match EmulationMode::from_env_value(raw) {
                Some(mode) => {
                    debug!("{}={raw}", EmulationMode::ENV_VAR);
                    self.emulation = Some(mode);
                }
                None => warn!(
                    "Ignoring {}={raw}: expected hw_emu or sw_emu",
                    EmulationMode::ENV_VAR
                ),
            },
        }
        self
    }

    /// Set the emulation mode
    #[must_use]
    pub const fn with_emulation(mut self, emulation: Option<EmulationMode>) -> Self {
        self.emulation = emulation;
        self
    }

    /// Enable or disable forcing `USE_HOST_PTR`
    #[must_use]
    pub const fn with_force_host_ptr(mut self, force: bool) -> Self {
        self.force_host_ptr = force;
        self
    }

    /// Set the queue properties
    #[must_use]
    pub const fn with_queue(mut self, queue: QueueProperties) -> Self {
        self.queue = queue;
        self
    }

    /// Emulation mode to run under: the configured one, else the image's hint
    pub fn effective_emulation(&self, hint: Option<EmulationMode>) -> Option<EmulationMode> {
        if let (Some(configured), Some(hint)) = (self.emulation, hint) {
            if configured != hint {
                warn!("Environment requests {configured}, image was built for {hint}");
            }
        }
        self.emulation.or(hint)
    }
}
