//! Image assembly for fixtures and tooling.
//!
//! Produces a structurally valid `xclbin2` container with an embedded
//! metadata document and, optionally, memory-topology and connectivity
//! sections. There is no bitstream: the result is only meaningful to
//! software backends and to the parser.

use bytes::{BufMut, Bytes, BytesMut};
use xclbin_layout::topology::{connectivity, mem, MemType};
use xclbin_layout::{axlf, section, ContainerMode, SectionKind};

/// Memory bank entry for [`XclbinBuilder::bank`]
#[derive(Debug, Clone)]
pub struct BankSpec {
    tag: String,
    used: bool,
    memory_type: MemType,
}

impl BankSpec {
    /// A bank the design uses
    pub fn used(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            used: true,
            memory_type: MemType::Ddr4,
        }
    }

    /// A bank present on the platform but not used by the design
    pub fn unused(tag: impl Into<String>) -> Self {
        Self {
            used: false,
            ..Self::used(tag)
        }
    }

    /// Override the memory type
    #[must_use]
    pub fn memory_type(mut self, memory_type: MemType) -> Self {
        self.memory_type = memory_type;
        self
    }
}

#[derive(Debug, Clone)]
struct ArgSpec {
    name: String,
    type_name: String,
    qualifier: Option<String>,
}

#[derive(Debug, Clone)]
struct KernelSpec {
    name: String,
    args: Vec<ArgSpec>,
}

/// Builder for `xclbin2` images
#[derive(Debug, Clone)]
pub struct XclbinBuilder {
    device_name: String,
    mode: u16,
    target: String,
    kernels: Vec<KernelSpec>,
    explicit_ids: bool,
    with_metadata: bool,
    metadata_override: Option<String>,
    banks: Vec<BankSpec>,
    connections: Vec<(i32, i32)>,
}

impl XclbinBuilder {
    /// Start an image for `device_name` whose first kernel is `kernel`.
    pub fn new(device_name: impl Into<String>, kernel: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            mode: ContainerMode::FLAT,
            target: "bitstream".to_string(),
            kernels: vec![KernelSpec {
                name: kernel.into(),
                args: Vec::new(),
            }],
            explicit_ids: true,
            with_metadata: true,
            metadata_override: None,
            banks: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Header mode
    #[must_use]
    pub fn mode(mut self, mode: ContainerMode) -> Self {
        self.mode = mode.code();
        self
    }

    /// Header mode as a raw code, including invalid ones
    #[must_use]
    pub fn raw_mode(mut self, code: u16) -> Self {
        self.mode = code;
        self
    }

    /// `core@target` attribute (`bitstream`, `hw_em`, `csim`)
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Begin another kernel; following args belong to it.
    #[must_use]
    pub fn kernel(mut self, name: impl Into<String>) -> Self {
        self.kernels.push(KernelSpec {
            name: name.into(),
            args: Vec::new(),
        });
        self
    }

    /// Scalar argument (`addressQualifier="0"`)
    #[must_use]
    pub fn scalar(self, name: &str, type_name: &str) -> Self {
        self.arg(name, type_name, Some("0"))
    }

    /// Memory-mapped argument (`addressQualifier="1"`)
    #[must_use]
    pub fn buffer(self, name: &str, type_name: &str) -> Self {
        self.arg(name, type_name, Some("1"))
    }

    /// Stream argument (`addressQualifier="4"`)
    #[must_use]
    pub fn stream(self, name: &str, type_name: &str) -> Self {
        self.arg(name, type_name, Some("4"))
    }

    /// Argument with an arbitrary (or absent) `addressQualifier`
    #[must_use]
    pub fn arg(mut self, name: &str, type_name: &str, qualifier: Option<&str>) -> Self {
        if let Some(kernel) = self.kernels.last_mut() {
            kernel.args.push(ArgSpec {
                name: name.to_string(),
                type_name: type_name.to_string(),
                qualifier: qualifier.map(str::to_string),
            });
        }
        self
    }

    /// Omit `id` attributes so indices come from position.
    #[must_use]
    pub fn positional_ids(mut self) -> Self {
        self.explicit_ids = false;
        self
    }

    /// Leave out the embedded metadata section entirely.
    #[must_use]
    pub fn without_metadata(mut self) -> Self {
        self.with_metadata = false;
        self
    }

    /// Use `xml` verbatim as the metadata payload.
    #[must_use]
    pub fn metadata_xml(mut self, xml: impl Into<String>) -> Self {
        self.metadata_override = Some(xml.into());
        self
    }

    /// Append a memory-topology entry; its index is its position.
    #[must_use]
    pub fn bank(mut self, bank: BankSpec) -> Self {
        self.banks.push(bank);
        self
    }

    /// Append a connectivity entry `arg_index → bank_index`.
    #[must_use]
    pub fn connect(mut self, arg_index: i32, bank_index: i32) -> Self {
        self.connections.push((arg_index, bank_index));
        self
    }

    /// Metadata document this builder would embed
    pub fn metadata_document(&self) -> String {
        if let Some(xml) = &self.metadata_override {
            return xml.clone();
        }

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<project name=\"frt\">\n  <platform vendor=\"xilinx\">\n");
        xml.push_str(&format!("    <device name=\"{}\">\n", escape(&self.device_name)));
        xml.push_str(&format!(
            "      <core name=\"OCL_REGION_0\" target=\"{}\" type=\"clc_region\">\n",
            escape(&self.target)
        ));
        for kernel in &self.kernels {
            xml.push_str(&format!("        <kernel name=\"{}\" language=\"c\">\n", escape(&kernel.name)));
            for (id, arg) in kernel.args.iter().enumerate() {
                xml.push_str(&format!("          <arg name=\"{}\"", escape(&arg.name)));
                if let Some(q) = &arg.qualifier {
                    xml.push_str(&format!(" addressQualifier=\"{}\"", escape(q)));
                }
                if self.explicit_ids {
                    xml.push_str(&format!(" id=\"{id}\""));
                }
                xml.push_str(&format!(" type=\"{}\"/>\n", escape(&arg.type_name)));
            }
            xml.push_str("        </kernel>\n");
        }
        xml.push_str("      </core>\n    </device>\n  </platform>\n</project>\n");
        xml
    }

    /// Assemble the image.
    pub fn build(&self) -> Bytes {
        let mut payloads: Vec<(SectionKind, &str, Vec<u8>)> = Vec::new();

        if self.with_metadata {
            let mut xml = self.metadata_document().into_bytes();
            xml.push(0);
            payloads.push((SectionKind::EmbeddedMetadata, "metadata", xml));
        }
        if !self.banks.is_empty() {
            payloads.push((SectionKind::MemTopology, "mem_topology", self.mem_topology()));
        }
        if !self.connections.is_empty() {
            payloads.push((SectionKind::Connectivity, "connectivity", self.connectivity()));
        }

        let record_count = payloads.len().max(1);
        let directory_end = axlf::SECTIONS + record_count * section::RECORD_SIZE;

        let mut offsets = Vec::with_capacity(payloads.len());
        let mut cursor = align8(directory_end);
        for (_, _, data) in &payloads {
            offsets.push(cursor);
            cursor = align8(cursor + data.len());
        }
        let total = cursor;

        let mut out = BytesMut::zeroed(total);
        out[..axlf::MAGIC_LEN].copy_from_slice(axlf::MAGIC);
        out[axlf::SIGNATURE_LENGTH..axlf::SIGNATURE_LENGTH + 4].copy_from_slice(&(-1i32).to_le_bytes());

        {
            use axlf::header as h;
            let hdr = &mut out[axlf::HEADER..axlf::HEADER + axlf::HEADER_SIZE];
            put(hdr, h::LENGTH, &(total as u64).to_le_bytes());
            put(hdr, h::VERSION_PATCH, &0u16.to_le_bytes());
            hdr[h::VERSION_MAJOR] = 2;
            hdr[h::VERSION_MINOR] = 1;
            put(hdr, h::MODE, &self.mode.to_le_bytes());
            let name = self.device_name.as_bytes();
            let n = name.len().min(h::PLATFORM_VBNV_LEN - 1);
            put(hdr, h::PLATFORM_VBNV, &name[..n]);
            put(hdr, h::NUM_SECTIONS, &(payloads.len() as u32).to_le_bytes());
        }

        for (i, ((kind, name, data), offset)) in payloads.iter().zip(&offsets).enumerate() {
            let rec_start = axlf::SECTIONS + i * section::RECORD_SIZE;
            let rec = &mut out[rec_start..rec_start + section::RECORD_SIZE];
            put(rec, section::KIND, &kind.code().to_le_bytes());
            let name = name.as_bytes();
            put(rec, section::NAME, &name[..name.len().min(section::NAME_LEN - 1)]);
            put(rec, section::OFFSET, &(*offset as u64).to_le_bytes());
            put(rec, section::SIZE, &(data.len() as u64).to_le_bytes());
            out[*offset..*offset + data.len()].copy_from_slice(data);
        }

        out.freeze()
    }

    fn mem_topology(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(mem::RECORDS + self.banks.len() * mem::RECORD_SIZE);
        buf.put_i32_le(self.banks.len() as i32);
        buf.put_bytes(0, mem::RECORDS - 4);
        for (i, bank) in self.banks.iter().enumerate() {
            let mut rec = [0u8; mem::RECORD_SIZE];
            rec[mem::TYPE] = bank.memory_type.code();
            rec[mem::USED] = u8::from(bank.used);
            put(&mut rec, mem::SIZE_KB, &(16 * 1024 * 1024u64).to_le_bytes());
            put(&mut rec, mem::BASE_ADDRESS, &((i as u64) << 34).to_le_bytes());
            let tag = bank.tag.as_bytes();
            put(&mut rec, mem::TAG, &tag[..tag.len().min(mem::TAG_LEN - 1)]);
            buf.put_slice(&rec);
        }
        buf.to_vec()
    }

    fn connectivity(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(
            connectivity::RECORDS + self.connections.len() * connectivity::RECORD_SIZE,
        );
        buf.put_i32_le(self.connections.len() as i32);
        for &(arg_index, bank_index) in &self.connections {
            buf.put_i32_le(arg_index);
            buf.put_i32_le(0);
            buf.put_i32_le(bank_index);
        }
        buf.to_vec()
    }
}

fn put(dst: &mut [u8], offset: usize, src: &[u8]) {
    dst[offset..offset + src.len()].copy_from_slice(src);
}

const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{read_sections, ContainerHeader};

    #[test]
    fn test_directory_matches_payloads() {
        let image = XclbinBuilder::new("dev", "k0")
            .buffer("a", "int*")
            .bank(BankSpec::used("DDR[0]"))
            .connect(0, 0)
            .build();

        let header = ContainerHeader::decode(&image).unwrap();
        assert_eq!(header.section_count, 3);
        let sections = read_sections(&image, header.section_count).unwrap();
        assert_eq!(sections[0].kind, SectionKind::EmbeddedMetadata);
        assert_eq!(sections[1].kind, SectionKind::MemTopology);
        assert_eq!(sections[2].kind, SectionKind::Connectivity);
        for s in &sections {
            assert_eq!(s.offset % 8, 0);
            assert!(s.offset + s.size <= image.len() as u64);
        }
    }

    #[test]
    fn test_bank_records() {
        let image = XclbinBuilder::new("dev", "k0")
            .bank(BankSpec::used("HBM[2]").memory_type(MemType::Hbm))
            .bank(BankSpec::unused("bank0"))
            .build();

        let header = ContainerHeader::decode(&image).unwrap();
        let sections = read_sections(&image, header.section_count).unwrap();
        let topology = sections
            .iter()
            .find(|s| s.kind == SectionKind::MemTopology)
            .unwrap();
        let start = topology.offset as usize;
        let payload = &image[start..start + topology.size as usize];

        let banks = crate::topology::read_memory_banks(payload, start).unwrap();
        assert_eq!(banks.len(), 2);
        assert_eq!(banks[0].memory_type, MemType::Hbm);
        assert_eq!(banks[0].tag, "HBM[2]");
        assert!(banks[0].used);
        assert_eq!(banks[1].memory_type, MemType::Ddr4);
        assert!(!banks[1].used);
    }

    #[test]
    fn test_metadata_override() {
        let xml = "<project><platform><device><core target=\"hw_em\">\
                   <kernel name=\"mmult\"><arg name=\"a\" addressQualifier=\"1\" id=\"0\" type=\"float*\"/></kernel>\
                   </core></device></platform></project>";
        let builder = XclbinBuilder::new("dev", "ignored").metadata_xml(xml);
        assert_eq!(builder.metadata_document(), xml);

        let meta = crate::ContainerMetadata::from_bytes(builder.build()).unwrap();
        assert_eq!(meta.kernel_name(), "mmult");
        assert_eq!(meta.target(), Some("hw_em"));
        assert_eq!(meta.args().len(), 1);
    }

    #[test]
    fn test_escaping() {
        let xml = XclbinBuilder::new("a<b", "k&0").metadata_document();
        assert!(xml.contains("a&lt;b"));
        assert!(xml.contains("k&amp;0"));
    }
}
