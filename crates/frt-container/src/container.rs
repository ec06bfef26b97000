//! Parsed accelerator image

use crate::args::{ArgInfo, ArgTable};
use crate::emulation::EmulationMode;
use crate::error::{ContainerError, Result};
use crate::header::{self, ContainerHeader, SectionHeader};
use crate::metadata::{parse_embedded_metadata, KernelDecl};
use crate::probe::{self, ContainerFormat};
use crate::topology;
use bytes::Bytes;
use std::fs;
use std::path::Path;
use xclbin_layout::{axlf, SectionKind};

/// Platform vendor and device name the image targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Platform vendor as reported by the compute API
    pub vendor: String,

    /// Device name as reported by the compute API
    pub device_name: String,
}

/// Everything the runtime needs to know about one image
#[derive(Debug, Clone)]
pub struct ContainerMetadata {
    format: ContainerFormat,
    header: ContainerHeader,
    sections: Vec<SectionHeader>,
    identity: DeviceIdentity,
    emulation: Option<EmulationMode>,
    target: Option<String>,
    kernels: Vec<KernelDecl>,
    args: ArgTable,
    image: Bytes,
}

impl ContainerMetadata {
    /// Load and probe an image file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or no parser accepts it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        tracing::info!("Loading {}", path.display());

        if !path.exists() {
            return Err(ContainerError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Probe an in-memory image
    ///
    /// # Errors
    ///
    /// Returns error if no parser accepts the image or parsing fails.
    pub fn from_bytes(image: impl Into<Bytes>) -> Result<Self> {
        probe::probe(image)
    }

    /// Parse an `xclbin2` image.
    ///
    /// # Errors
    ///
    /// - `NotRecognized` if the magic does not match
    /// - `Truncated`, `UnknownMode`, `SectionOutOfBounds` for a malformed header
    /// - `MissingSection` / `Metadata` if the kernel cannot be identified
    pub fn parse_xclbin(image: Bytes) -> Result<Self> {
        if !header::has_magic(&image) {
            return Err(ContainerError::NotRecognized);
        }
        tracing::debug!("Parsing xclbin2 image ({} bytes)", image.len());

        let header = ContainerHeader::decode(&image)?;
        let sections = header::read_sections(&image, header.section_count)?;

        let (_, xml) = header::find_section(&image, &sections, SectionKind::EmbeddedMetadata)?
            .ok_or_else(|| {
                tracing::error!("Image has no embedded metadata");
                ContainerError::MissingSection {
                    kind: SectionKind::EmbeddedMetadata,
                }
            })?;
        let metadata = parse_embedded_metadata(xml)?;
        let mut args = metadata.args;

        let emulation = EmulationMode::resolve(header.mode, metadata.target.as_deref());
        if let (Some(from_header), Some(resolved)) =
            (EmulationMode::from_container_mode(header.mode), emulation)
        {
            if from_header != resolved {
                tracing::debug!("Header mode says {from_header}, metadata target says {resolved}");
            }
        }

        if let Some((base, payload)) =
            header::find_section(&image, &sections, SectionKind::MemTopology)?
        {
            let banks = topology::read_memory_banks(payload, base)?;
            let tags = topology::used_bank_tags(&banks);
            tracing::debug!("{} of {} memory banks in use", tags.len(), banks.len());

            if let Some((base, payload)) =
                header::find_section(&image, &sections, SectionKind::Connectivity)?
            {
                let connections = topology::read_connections(payload, base)?;
                let assigned = topology::assign_bank_tags(&mut args, &tags, &connections);
                tracing::debug!("{assigned} argument(s) bound to memory banks");
            }
        }

        let identity = DeviceIdentity {
            vendor: axlf::VENDOR.to_string(),
            device_name: header.platform_vbnv.clone(),
        };

        tracing::info!(
            "xclbin2 for {} ({}), kernel {}, {} argument(s)",
            identity.device_name,
            header.mode,
            metadata.kernels[0].name,
            args.len()
        );

        Ok(Self {
            format: ContainerFormat::Xclbin,
            header,
            sections,
            identity,
            emulation,
            target: metadata.target,
            kernels: metadata.kernels,
            args,
            image,
        })
    }

    /// Container format that accepted the image
    pub const fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Decoded fixed header
    pub const fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Section directory
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Vendor and device name to resolve
    pub const fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Emulation hint, metadata target first, header mode second
    pub const fn emulation(&self) -> Option<EmulationMode> {
        self.emulation
    }

    /// Raw `core@target` attribute
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Name of the kernel this runtime drives (the first declared)
    pub fn kernel_name(&self) -> &str {
        &self.kernels[0].name
    }

    /// All declared kernels
    pub fn kernels(&self) -> &[KernelDecl] {
        &self.kernels
    }

    /// Flat argument table
    pub const fn args(&self) -> &ArgTable {
        &self.args
    }

    /// Argument by index
    pub fn arg(&self, index: usize) -> Option<&ArgInfo> {
        self.args.get(index)
    }

    /// Raw image bytes
    pub const fn image(&self) -> &Bytes {
        &self.image
    }

    /// Split into the argument table, dropping the image.
    pub fn into_args(self) -> ArgTable {
        self.args
    }

    /// Multi-line human-readable description
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "Format     : {}", self.format);
        let _ = writeln!(out, "Size       : {} bytes", self.image.len());
        let _ = writeln!(out, "Version    : {}", self.header.version_string());
        let _ = writeln!(out, "Mode       : {}", self.header.mode);
        let _ = writeln!(
            out,
            "Device     : {} / {}",
            self.identity.vendor, self.identity.device_name
        );
        let _ = writeln!(
            out,
            "Emulation  : {}",
            self.emulation.map_or("none", EmulationMode::as_env_value)
        );
        let _ = writeln!(out, "Sections   : {}", self.sections.len());
        for s in &self.sections {
            let _ = writeln!(out, "  {:<20} {:<16} @{:<8} {} bytes", s.kind.to_string(), s.name, s.offset, s.size);
        }
        let names: Vec<&str> = self.kernels.iter().map(|k| k.name.as_str()).collect();
        let _ = writeln!(out, "Kernels    : {}", names.join(", "));
        let _ = writeln!(out, "Arguments  : {}", self.args.len());
        for a in &self.args {
            let _ = writeln!(
                out,
                "  [{:>2}] {:<16} {:<12} {:<8} {}",
                a.index,
                a.name,
                a.type_name,
                a.category.to_string(),
                a.bank_tag.as_deref().unwrap_or("-")
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgCategory;
    use crate::builder::{BankSpec, XclbinBuilder};
    use xclbin_layout::ContainerMode;

    #[test]
    fn test_end_to_end_k0() {
        let image = XclbinBuilder::new("xilinx_u250", "k0")
            .scalar("n", "int")
            .buffer("a", "int*")
            .build();

        let meta = ContainerMetadata::parse_xclbin(image).unwrap();
        assert_eq!(meta.kernel_name(), "k0");
        assert_eq!(meta.identity().vendor, "Xilinx");
        assert_eq!(meta.identity().device_name, "xilinx_u250");
        assert_eq!(meta.arg(0).unwrap().category, ArgCategory::Scalar);
        assert_eq!(meta.arg(1).unwrap().category, ArgCategory::Mmap);
        assert_eq!(meta.emulation(), None);
    }

    #[test]
    fn test_bank_tags_from_connectivity() {
        let image = XclbinBuilder::new("dev", "vadd")
            .buffer("a", "int*")
            .buffer("b", "int*")
            .buffer("c", "int*")
            .bank(BankSpec::used("HBM[0]"))
            .bank(BankSpec::unused("HBM[1]"))
            .bank(BankSpec::used("HBM[3]"))
            .connect(0, 0)
            .connect(1, 1)
            .connect(2, 2)
            .connect(7, 0)
            .build();

        let meta = ContainerMetadata::parse_xclbin(image).unwrap();
        assert_eq!(meta.arg(0).unwrap().bank_tag.as_deref(), Some("HBM[0]"));
        assert_eq!(meta.arg(1).unwrap().bank_tag, None);
        assert_eq!(meta.arg(2).unwrap().bank_tag.as_deref(), Some("HBM[3]"));
        assert_eq!(meta.args().len(), 3);
    }

    #[test]
    fn test_no_topology_means_no_tags() {
        let image = XclbinBuilder::new("dev", "vadd")
            .buffer("a", "int*")
            .connect(0, 0)
            .build();

        let meta = ContainerMetadata::parse_xclbin(image).unwrap();
        assert!(meta.args().iter().all(|a| a.bank_tag.is_none()));
    }

    #[test]
    fn test_missing_metadata_is_fatal() {
        let image = XclbinBuilder::new("dev", "k0").without_metadata().build();
        assert!(matches!(
            ContainerMetadata::parse_xclbin(image),
            Err(ContainerError::MissingSection {
                kind: SectionKind::EmbeddedMetadata
            })
        ));
    }

    #[test]
    fn test_metadata_target_overrides_header() {
        let image = XclbinBuilder::new("dev", "k0")
            .mode(ContainerMode::HardwareEmulation)
            .target("csim")
            .build();
        let meta = ContainerMetadata::parse_xclbin(image).unwrap();
        assert_eq!(meta.emulation(), Some(EmulationMode::Software));
        assert_eq!(meta.target(), Some("csim"));
    }

    #[test]
    fn test_bad_signature() {
        let err = ContainerMetadata::parse_xclbin(Bytes::from_static(b"\x7fELF\x02\x01\x01\0....")).unwrap_err();
        assert!(err.is_not_recognized());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k0.xclbin");
        std::fs::write(&path, XclbinBuilder::new("dev", "k0").build()).unwrap();

        let meta = ContainerMetadata::from_file(&path).unwrap();
        assert_eq!(meta.kernel_name(), "k0");
        assert!(meta.summary().contains("k0"));

        assert!(matches!(
            ContainerMetadata::from_file(dir.path().join("missing.xclbin")),
            Err(ContainerError::FileNotFound { .. })
        ));
    }
}
