//! Fixed header and section directory of an `xclbin2` image.

use crate::error::{ContainerError, Result};
use crate::reader::ByteReader;
use xclbin_layout::{axlf, section, ContainerMode, SectionKind};

/// Decoded `axlf_header`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Total image length recorded by the linker
    pub length: u64,

    /// Build timestamp
    pub timestamp: u64,

    /// Tool version (major, minor, patch)
    pub version: (u8, u8, u16),

    /// Load mode
    pub mode: ContainerMode,

    /// Target platform name (`m_platformVBNV`), also the device name to match
    pub platform_vbnv: String,

    /// Number of directory records
    pub section_count: u32,
}

/// One record of the section directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section kind
    pub kind: SectionKind,

    /// Name recorded by the linker
    pub name: String,

    /// Absolute payload offset
    pub offset: u64,

    /// Payload size in bytes
    pub size: u64,
}

/// True if `image` starts with the `xclbin2` magic.
pub fn has_magic(image: &[u8]) -> bool {
    image.len() >= axlf::MAGIC_LEN && image[..axlf::MAGIC_LEN] == axlf::MAGIC[..]
}

impl ContainerHeader {
    /// Decode the header of a signature-checked image.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the image is shorter than the header and
    /// `UnknownMode` for a mode code outside the known set.
    pub fn decode(image: &[u8]) -> Result<Self> {
        use axlf::header as h;

        let header = ByteReader::at(
            image.get(axlf::HEADER..).unwrap_or_default(),
            axlf::HEADER,
        );
        // Whole header up front so a short image fails with one clear error.
        header.bytes(0, axlf::HEADER_SIZE, "axlf_header")?;

        let code = header.u16(h::MODE, "m_mode")?;
        let mode = ContainerMode::from_code(code).ok_or_else(|| {
            tracing::error!("Unknown xclbin mode {code}");
            ContainerError::UnknownMode { code }
        })?;

        Ok(Self {
            length: header.u64(h::LENGTH, "m_length")?,
            timestamp: header.u64(h::TIMESTAMP, "m_timeStamp")?,
            version: (
                header.u8(h::VERSION_MAJOR, "m_versionMajor")?,
                header.u8(h::VERSION_MINOR, "m_versionMinor")?,
                header.u16(h::VERSION_PATCH, "m_versionPatch")?,
            ),
            mode,
            platform_vbnv: header.c_str(h::PLATFORM_VBNV, h::PLATFORM_VBNV_LEN, "m_platformVBNV")?,
            section_count: header.u32(h::NUM_SECTIONS, "m_numSections")?,
        })
    }

    /// Formatted tool version, e.g. `2.12.427`
    pub fn version_string(&self) -> String {
        let (major, minor, patch) = self.version;
        format!("{major}.{minor}.{patch}")
    }
}

/// Decode the section directory.
///
/// # Errors
///
/// Returns `Truncated` if the directory runs past the end of the image.
pub fn read_sections(image: &[u8], count: u32) -> Result<Vec<SectionHeader>> {
    let reader = ByteReader::new(image);
    let mut sections = Vec::with_capacity(count.min(64) as usize);

    for i in 0..count as usize {
        let base = axlf::SECTIONS + i * section::RECORD_SIZE;
        reader.bytes(base, section::RECORD_SIZE, "axlf_section_header")?;

        let kind = SectionKind::from_code(reader.u32(base + section::KIND, "m_sectionKind")?);
        let record = SectionHeader {
            kind,
            name: reader.c_str(base + section::NAME, section::NAME_LEN, "m_sectionName")?,
            offset: reader.u64(base + section::OFFSET, "m_sectionOffset")?,
            size: reader.u64(base + section::SIZE, "m_sectionSize")?,
        };
        tracing::debug!(
            "Section {i}: {} '{}' @ {} ({} bytes)",
            record.kind,
            record.name,
            record.offset,
            record.size
        );
        sections.push(record);
    }

    Ok(sections)
}

/// Payload of the first section of `kind`, if present.
///
/// # Errors
///
/// Returns `SectionOutOfBounds` if the recorded payload lies outside the image.
pub fn find_section<'a>(
    image: &'a [u8],
    sections: &[SectionHeader],
    kind: SectionKind,
) -> Result<Option<(usize, &'a [u8])>> {
    let Some(header) = sections.iter().find(|s| s.kind == kind) else {
        return Ok(None);
    };

    let out_of_bounds = || ContainerError::SectionOutOfBounds {
        kind,
        offset: header.offset,
        size: header.size,
        len: image.len(),
    };

    let start = usize::try_from(header.offset).map_err(|_| out_of_bounds())?;
    let size = usize::try_from(header.size).map_err(|_| out_of_bounds())?;
    let payload = start
        .checked_add(size)
        .and_then(|end| image.get(start..end))
        .ok_or_else(out_of_bounds)?;

    Ok(Some((start, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::XclbinBuilder;

    #[test]
    fn test_magic() {
        assert!(has_magic(b"xclbin2\0rest"));
        assert!(!has_magic(b"xclbin2"));
        assert!(!has_magic(b"xclbin1\0rest"));
        assert!(!has_magic(&[]));
    }

    #[test]
    fn test_decode_header() {
        let image = XclbinBuilder::new("xilinx_u250_xdma_201830_2", "k0")
            .mode(ContainerMode::PartialReconfig)
            .build();
        let header = ContainerHeader::decode(&image).unwrap();
        assert_eq!(header.mode, ContainerMode::PartialReconfig);
        assert_eq!(header.platform_vbnv, "xilinx_u250_xdma_201830_2");
        assert_eq!(header.length, image.len() as u64);
        assert!(header.section_count >= 1);
    }

    #[test]
    fn test_unknown_mode_is_fatal() {
        let image = XclbinBuilder::new("dev", "k0").raw_mode(42).build();
        assert!(matches!(
            ContainerHeader::decode(&image),
            Err(ContainerError::UnknownMode { code: 42 })
        ));
    }

    #[test]
    fn test_truncated_header() {
        let image = XclbinBuilder::new("dev", "k0").build();
        let short = &image[..axlf::HEADER + 20];
        assert!(matches!(
            ContainerHeader::decode(short),
            Err(ContainerError::Truncated { what: "axlf_header", .. })
        ));
    }

    #[test]
    fn test_section_out_of_bounds() {
        let sections = vec![SectionHeader {
            kind: SectionKind::MemTopology,
            name: "mem".into(),
            offset: 10,
            size: 1000,
        }];
        let image = [0u8; 64];
        assert!(matches!(
            find_section(&image, &sections, SectionKind::MemTopology),
            Err(ContainerError::SectionOutOfBounds { .. })
        ));
        assert!(find_section(&image, &sections, SectionKind::Connectivity)
            .unwrap()
            .is_none());
    }
}
