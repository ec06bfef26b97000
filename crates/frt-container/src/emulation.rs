//! Emulation mode hint

use xclbin_layout::ContainerMode;

/// Emulation flow an image was built for.
///
/// Hardware images carry no hint (`Option::None` at use sites).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmulationMode {
    /// RTL simulation (`hw_emu`)
    Hardware,
    /// C simulation (`sw_emu`)
    Software,
}

impl EmulationMode {
    /// Environment variable the vendor runtime reads.
    pub const ENV_VAR: &'static str = "XCL_EMULATION_MODE";

    /// Value for [`Self::ENV_VAR`]
    pub const fn as_env_value(self) -> &'static str {
        match self {
            Self::Hardware => "hw_emu",
            Self::Software => "sw_emu",
        }
    }

    /// Parse a [`Self::ENV_VAR`] value
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value.trim() {
            "hw_emu" => Some(Self::Hardware),
            "sw_emu" => Some(Self::Software),
            _ => None,
        }
    }

    /// Hint implied by the header mode
    pub const fn from_container_mode(mode: ContainerMode) -> Option<Self> {
        match mode {
            ContainerMode::HardwareEmulation => Some(Self::Hardware),
            ContainerMode::SoftwareEmulation => Some(Self::Software),
            ContainerMode::Flat
            | ContainerMode::PartialReconfig
            | ContainerMode::TandemStage2
            | ContainerMode::TandemStage2WithPr => None,
        }
    }

    /// Hint implied by the metadata `core@target` attribute
    pub fn from_target(target: &str) -> Option<Self> {
        match target {
            "hw_em" => Some(Self::Hardware),
            "csim" => Some(Self::Software),
            _ => None,
        }
    }

    /// Combine both sources. The header mode is not reliable for emulation
    /// builds, so a recognized metadata target takes precedence.
    pub fn resolve(mode: ContainerMode, target: Option<&str>) -> Option<Self> {
        target
            .and_then(Self::from_target)
            .or_else(|| Self::from_container_mode(mode))
    }
}

impl std::fmt::Display for EmulationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_env_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_values() {
        for mode in [EmulationMode::Hardware, EmulationMode::Software] {
            assert_eq!(EmulationMode::from_env_value(mode.as_env_value()), Some(mode));
        }
        assert_eq!(EmulationMode::from_env_value("hw"), None);
    }

    #[test]
    fn test_metadata_target_wins() {
        assert_eq!(
            EmulationMode::resolve(ContainerMode::HardwareEmulation, Some("csim")),
            Some(EmulationMode::Software)
        );
        assert_eq!(
            EmulationMode::resolve(ContainerMode::SoftwareEmulation, Some("hw_em")),
            Some(EmulationMode::Hardware)
        );
        assert_eq!(
            EmulationMode::resolve(ContainerMode::Flat, Some("hw_em")),
            Some(EmulationMode::Hardware)
        );
    }

    #[test]
    fn test_header_used_without_target() {
        assert_eq!(
            EmulationMode::resolve(ContainerMode::HardwareEmulation, Some("bitstream")),
            Some(EmulationMode::Hardware)
        );
        assert_eq!(EmulationMode::resolve(ContainerMode::Flat, None), None);
    }
}
