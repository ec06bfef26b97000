//! Top-level `axlf` struct and `axlf_header` field offsets.
//!
//! ```text
//! 0x000  m_magic[8]            "xclbin2\0"
//! 0x008  m_signature_length    i32
//! 0x00c  reserved[28]
//! 0x028  m_keyBlock[256]
//! 0x128  m_uniqueId            u64
//! 0x130  m_header              axlf_header (152 bytes)
//! 0x1c8  m_sections[]          axlf_section_header (40 bytes each)
//! ```

/// Magic bytes at the start of every image, including the trailing NUL.
pub const MAGIC: &[u8; 8] = b"xclbin2\0";

/// Length of the magic field.
pub const MAGIC_LEN: usize = 8;

/// Vendor string the compute platform reports for this container family.
pub const VENDOR: &str = "Xilinx";

/// Offset of `m_signature_length`.
pub const SIGNATURE_LENGTH: usize = 0x008;

/// Offset of `m_uniqueId`.
pub const UNIQUE_ID: usize = 0x128;

/// Offset of the embedded `axlf_header`.
pub const HEADER: usize = 0x130;

/// Size of `axlf_header`.
pub const HEADER_SIZE: usize = 152;

/// Offset of the first section directory record.
pub const SECTIONS: usize = HEADER + HEADER_SIZE;

/// Smallest image that still holds a header and one directory record.
pub const MIN_IMAGE_SIZE: usize = SECTIONS + crate::section::RECORD_SIZE;

/// Field offsets inside `axlf_header`, relative to [`HEADER`].
pub mod header {
    /// `m_length`: total image length in bytes (u64).
    pub const LENGTH: usize = 0;
    /// `m_timeStamp` (u64).
    pub const TIMESTAMP: usize = 8;
    /// `m_featureRomTimeStamp` (u64).
    pub const FEATURE_ROM_TIMESTAMP: usize = 16;
    /// `m_versionPatch` (u16).
    pub const VERSION_PATCH: usize = 24;
    /// `m_versionMajor` (u8).
    pub const VERSION_MAJOR: usize = 26;
    /// `m_versionMinor` (u8).
    pub const VERSION_MINOR: usize = 27;
    /// `m_mode` (u16), see [`crate::mode`].
    pub const MODE: usize = 28;
    /// `m_actionMask` (u16).
    pub const ACTION_MASK: usize = 30;
    /// ROM UUID / platform + feature IDs (16 bytes).
    pub const ROM_UUID: usize = 32;
    /// `m_platformVBNV`: NUL-terminated target platform name.
    pub const PLATFORM_VBNV: usize = 48;
    /// Capacity of the platform name field.
    pub const PLATFORM_VBNV_LEN: usize = 64;
    /// `uuid` (16 bytes).
    pub const UUID: usize = 112;
    /// `m_debug_bin` (16 bytes).
    pub const DEBUG_BIN: usize = 128;
    /// `m_numSections` (u32).
    pub const NUM_SECTIONS: usize = 144;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_follow_header() {
        assert_eq!(SECTIONS, 0x1c8);
        assert_eq!(MIN_IMAGE_SIZE, 496);
    }

    #[test]
    fn test_header_fields_fit() {
        assert!(header::NUM_SECTIONS + 4 <= HEADER_SIZE);
        assert_eq!(
            header::PLATFORM_VBNV + header::PLATFORM_VBNV_LEN,
            header::UUID
        );
    }
}
