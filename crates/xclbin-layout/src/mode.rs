//! Container mode (`axlf_header.m_mode`).

/// How the image is meant to be loaded.
///
/// The two emulation variants imply a simulated device; the rest describe a
/// real FPGA configuration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerMode {
    /// Full, flat bitstream.
    Flat,
    /// Partial reconfiguration.
    PartialReconfig,
    /// Tandem configuration, stage 2.
    TandemStage2,
    /// Tandem configuration, stage 2, with partial reconfiguration.
    TandemStage2WithPr,
    /// Hardware emulation (RTL simulation).
    HardwareEmulation,
    /// Software emulation (C simulation).
    SoftwareEmulation,
}

impl ContainerMode {
    /// `XCLBIN_FLAT`
    pub const FLAT: u16 = 0;
    /// `XCLBIN_PR`
    pub const PR: u16 = 1;
    /// `XCLBIN_TANDEM_STAGE2`
    pub const TANDEM_STAGE2: u16 = 2;
    /// `XCLBIN_TANDEM_STAGE2_WITH_PR`
    pub const TANDEM_STAGE2_WITH_PR: u16 = 3;
    /// `XCLBIN_HW_EMU`
    pub const HW_EMU: u16 = 4;
    /// `XCLBIN_SW_EMU`
    pub const SW_EMU: u16 = 5;

    /// Decode a raw mode code. Returns `None` for codes outside the known set.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            Self::FLAT => Some(Self::Flat),
            Self::PR => Some(Self::PartialReconfig),
            Self::TANDEM_STAGE2 => Some(Self::TandemStage2),
            Self::TANDEM_STAGE2_WITH_PR => Some(Self::TandemStage2WithPr),
            Self::HW_EMU => Some(Self::HardwareEmulation),
            Self::SW_EMU => Some(Self::SoftwareEmulation),
            _ => None,
        }
    }

    /// Raw mode code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Flat => Self::FLAT,
            Self::PartialReconfig => Self::PR,
            Self::TandemStage2 => Self::TANDEM_STAGE2,
            Self::TandemStage2WithPr => Self::TANDEM_STAGE2_WITH_PR,
            Self::HardwareEmulation => Self::HW_EMU,
            Self::SoftwareEmulation => Self::SW_EMU,
        }
    }

    /// True for the two emulation modes.
    #[must_use]
    pub const fn is_emulation(self) -> bool {
        matches!(self, Self::HardwareEmulation | Self::SoftwareEmulation)
    }
}

impl std::fmt::Display for ContainerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::PartialReconfig => write!(f, "partial-reconfig"),
            Self::TandemStage2 => write!(f, "tandem-stage2"),
            Self::TandemStage2WithPr => write!(f, "tandem-stage2-with-pr"),
            Self::HardwareEmulation => write!(f, "hw-emu"),
            Self::SoftwareEmulation => write!(f, "sw-emu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes() {
        for code in 0..=5 {
            let mode = ContainerMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert_eq!(ContainerMode::from_code(6), None);
        assert_eq!(ContainerMode::from_code(0xffff), None);
    }

    #[test]
    fn test_emulation_modes() {
        assert!(ContainerMode::HardwareEmulation.is_emulation());
        assert!(ContainerMode::SoftwareEmulation.is_emulation());
        assert!(!ContainerMode::Flat.is_emulation());
    }
}
