//! Section directory records.
//!
//! Each record is 40 bytes:
//!
//! ```text
//! 0   m_sectionKind    u32
//! 4   m_sectionName    [u8; 16]
//! 20  (padding)
//! 24  m_sectionOffset  u64   absolute offset of the payload
//! 32  m_sectionSize    u64
//! ```

/// Size of one directory record.
pub const RECORD_SIZE: usize = 40;

/// Offset of `m_sectionKind` within a record.
pub const KIND: usize = 0;
/// Offset of `m_sectionName` within a record.
pub const NAME: usize = 4;
/// Capacity of `m_sectionName`.
pub const NAME_LEN: usize = 16;
/// Offset of `m_sectionOffset` within a record.
pub const OFFSET: usize = 24;
/// Offset of `m_sectionSize` within a record.
pub const SIZE: usize = 32;

/// Section kinds the runtime cares about, plus a catch-all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// FPGA bitstream.
    Bitstream,
    /// XML kernel / argument description.
    EmbeddedMetadata,
    /// Memory bank table.
    MemTopology,
    /// Argument → bank table.
    Connectivity,
    /// Compute unit layout.
    IpLayout,
    /// Clock frequencies.
    ClockFreqTopology,
    /// Build metadata (JSON).
    BuildMetadata,
    /// Any other kind, carried by code.
    Other(u32),
}

impl SectionKind {
    /// `BITSTREAM`
    pub const BITSTREAM: u32 = 0;
    /// `EMBEDDED_METADATA`
    pub const EMBEDDED_METADATA: u32 = 2;
    /// `MEM_TOPOLOGY`
    pub const MEM_TOPOLOGY: u32 = 6;
    /// `CONNECTIVITY`
    pub const CONNECTIVITY: u32 = 7;
    /// `IP_LAYOUT`
    pub const IP_LAYOUT: u32 = 8;
    /// `CLOCK_FREQ_TOPOLOGY`
    pub const CLOCK_FREQ_TOPOLOGY: u32 = 11;
    /// `BUILD_METADATA`
    pub const BUILD_METADATA: u32 = 14;

    /// Decode a raw kind code.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            Self::BITSTREAM => Self::Bitstream,
            Self::EMBEDDED_METADATA => Self::EmbeddedMetadata,
            Self::MEM_TOPOLOGY => Self::MemTopology,
            Self::CONNECTIVITY => Self::Connectivity,
            Self::IP_LAYOUT => Self::IpLayout,
            Self::CLOCK_FREQ_TOPOLOGY => Self::ClockFreqTopology,
            Self::BUILD_METADATA => Self::BuildMetadata,
            other => Self::Other(other),
        }
    }

    /// Raw kind code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Bitstream => Self::BITSTREAM,
            Self::EmbeddedMetadata => Self::EMBEDDED_METADATA,
            Self::MemTopology => Self::MEM_TOPOLOGY,
            Self::Connectivity => Self::CONNECTIVITY,
            Self::IpLayout => Self::IP_LAYOUT,
            Self::ClockFreqTopology => Self::CLOCK_FREQ_TOPOLOGY,
            Self::BuildMetadata => Self::BUILD_METADATA,
            Self::Other(code) => code,
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bitstream => write!(f, "BITSTREAM"),
            Self::EmbeddedMetadata => write!(f, "EMBEDDED_METADATA"),
            Self::MemTopology => write!(f, "MEM_TOPOLOGY"),
            Self::Connectivity => write!(f, "CONNECTIVITY"),
            Self::IpLayout => write!(f, "IP_LAYOUT"),
            Self::ClockFreqTopology => write!(f, "CLOCK_FREQ_TOPOLOGY"),
            Self::BuildMetadata => write!(f, "BUILD_METADATA"),
            Self::Other(code) => write!(f, "SECTION({code})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_stable() {
        for code in [0, 2, 6, 7, 8, 11, 14, 23] {
            assert_eq!(SectionKind::from_code(code).code(), code);
        }
        assert_eq!(SectionKind::from_code(23), SectionKind::Other(23));
    }

    #[test]
    fn test_record_fields_fit() {
        assert!(NAME + NAME_LEN <= OFFSET);
        assert_eq!(SIZE + 8, RECORD_SIZE);
    }
}
