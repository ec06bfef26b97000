//! Embedded metadata (`EMBEDDED_METADATA` section)
//!
//! The payload is an XML document of the form:
//!
//! ```text
//! <project name="vadd">
//!   <platform vendor="xilinx" name="u250">
//!     <device name="fpga0">
//!       <core name="OCL_REGION_0" target="bitstream">
//!         <kernel name="vadd">
//!           <arg name="a" addressQualifier="1" id="0" type="int*"/>
//!           ...
//! ```
//!
//! Arguments of every kernel land in one flat table. Each kernel gets a base
//! index (one past the highest index assigned so far); an argument's index is
//! that base plus its `id` attribute, or plus its position when `id` is absent.

use crate::args::{ArgCategory, ArgInfo, ArgTable};
use crate::error::{ContainerError, Result};
use roxmltree::{Document, Node};

/// One `<kernel>` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDecl {
    /// Kernel name
    pub name: String,

    /// Base index of this kernel's arguments in the flat table
    pub first_arg: usize,

    /// Number of `<arg>` elements
    pub arg_count: usize,
}

/// Parsed metadata document
#[derive(Debug, Clone)]
pub struct EmbeddedMetadata {
    /// `core@target` (`bitstream`, `hw_em`, `csim`)
    pub target: Option<String>,

    /// Declared kernels, in document order
    pub kernels: Vec<KernelDecl>,

    /// Flat argument table across all kernels
    pub args: ArgTable,
}

/// Parse the raw section payload.
///
/// # Errors
///
/// Returns `Metadata` for non-UTF-8 or malformed XML, a missing
/// `project/platform/device/core` node, no `<kernel>` element, a missing
/// `name`/`type` attribute, an invalid `id`, or a duplicate argument index.
pub fn parse_embedded_metadata(payload: &[u8]) -> Result<EmbeddedMetadata> {
    let end = payload.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    let text = std::str::from_utf8(&payload[..end])
        .map_err(|e| ContainerError::metadata(format!("not UTF-8: {e}")))?;

    let doc = Document::parse(text)
        .map_err(|e| ContainerError::metadata(format!("XML parse error: {e}")))?;

    let project = doc.root_element();
    if !project.has_tag_name("project") {
        return Err(ContainerError::metadata(format!(
            "root element is <{}>, expected <project>",
            project.tag_name().name()
        )));
    }
    let core = ["platform", "device", "core"]
        .iter()
        .try_fold(project, |node, name| {
            child(node, name).ok_or_else(|| ContainerError::metadata(format!("missing <{name}> element")))
        })?;

    let target = core.attribute("target").map(str::to_string);
    let mut kernels = Vec::new();
    let mut args = ArgTable::new();

    for xml_kernel in core.children().filter(|n| n.has_tag_name("kernel")) {
        let name = required(xml_kernel, "name", "kernel")?;
        let first_arg = args.max_index().map_or(0, |i| i + 1);
        let mut arg_count = 0;

        for (position, xml_arg) in xml_kernel
            .children()
            .filter(|n| n.has_tag_name("arg"))
            .enumerate()
        {
            let arg = parse_arg(xml_arg, first_arg, position)?;
            tracing::debug!(
                "Kernel {name} arg {}: {} {} ({})",
                arg.index,
                arg.type_name,
                arg.name,
                arg.category
            );
            let index = arg.index;
            if args.insert(arg).is_some() {
                return Err(ContainerError::metadata(format!(
                    "duplicate argument index {index} in kernel {name}"
                )));
            }
            arg_count += 1;
        }

        kernels.push(KernelDecl {
            name: name.to_string(),
            first_arg,
            arg_count,
        });
    }

    if kernels.is_empty() {
        return Err(ContainerError::metadata("no <kernel> element"));
    }
    if kernels.len() > 1 {
        tracing::info!(
            "{} kernels declared; driving {} only",
            kernels.len(),
            kernels[0].name
        );
    }

    Ok(EmbeddedMetadata {
        target,
        kernels,
        args,
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn required<'a>(node: Node<'a, '_>, attr: &str, element: &str) -> Result<&'a str> {
    node.attribute(attr)
        .ok_or_else(|| ContainerError::metadata(format!("<{element}> without {attr} attribute")))
}

fn parse_arg(xml_arg: Node<'_, '_>, base: usize, position: usize) -> Result<ArgInfo> {
    let name = required(xml_arg, "name", "arg")?;
    let type_name = required(xml_arg, "type", "arg")?;

    let offset = match xml_arg.attribute("id") {
        Some(id) => id.trim().parse::<usize>().map_err(|_| {
            ContainerError::metadata(format!("argument {name} has invalid id '{id}'"))
        })?,
        None => position,
    };

    let category = match xml_arg.attribute("addressQualifier") {
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(code) => ArgCategory::from_address_qualifier(code),
            Err(_) => {
                tracing::warn!("Argument {name}: non-numeric addressQualifier '{raw}'");
                ArgCategory::Unknown(-1)
            }
        },
        None => {
            tracing::warn!("Argument {name}: missing addressQualifier");
            ArgCategory::Unknown(-1)
        }
    };
    if let ArgCategory::Unknown(code) = category {
        if code >= 0 {
            tracing::warn!("Unknown argument category: {code} (argument {name})");
        }
    }

    Ok(ArgInfo {
        index: base + offset,
        name: name.to_string(),
        type_name: type_name.to_string(),
        category,
        bank_tag: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(core_body: &str, target: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<project name="p"><platform vendor="xilinx" name="u250"><device name="fpga0">
<core name="OCL_REGION_0" target="{target}">{core_body}</core></device></platform></project>"#
        )
    }

    #[test]
    fn test_single_kernel() {
        let xml = doc(
            r#"<kernel name="k0">
                 <arg name="n" addressQualifier="0" id="0" type="int"/>
                 <arg name="a" addressQualifier="1" id="1" type="float*"/>
               </kernel>"#,
            "bitstream",
        );
        let meta = parse_embedded_metadata(xml.as_bytes()).unwrap();
        assert_eq!(meta.target.as_deref(), Some("bitstream"));
        assert_eq!(meta.kernels.len(), 1);
        assert_eq!(meta.kernels[0].name, "k0");
        assert_eq!(meta.args.get(0).unwrap().category, ArgCategory::Scalar);
        assert_eq!(meta.args.get(1).unwrap().category, ArgCategory::Mmap);
        assert_eq!(meta.args.get(1).unwrap().type_name, "float*");
    }

    #[test]
    fn test_multi_kernel_flat_indexing() {
        let xml = doc(
            r#"<kernel name="k0">
                 <arg name="a" addressQualifier="1" id="0" type="int*"/>
                 <arg name="b" addressQualifier="1" id="1" type="int*"/>
               </kernel>
               <kernel name="k1">
                 <arg name="c" addressQualifier="4" id="0" type="stream"/>
                 <arg name="d" addressQualifier="0" type="int"/>
               </kernel>"#,
            "bitstream",
        );
        let meta = parse_embedded_metadata(xml.as_bytes()).unwrap();
        assert_eq!(meta.kernels.len(), 2);
        assert_eq!(meta.kernels[1].first_arg, 2);
        assert_eq!(meta.kernels[1].arg_count, 2);
        assert_eq!(meta.args.len(), 4);
        assert_eq!(meta.args.get(2).unwrap().name, "c");
        // No id: falls back to position within the kernel.
        assert_eq!(meta.args.get(3).unwrap().name, "d");
    }

    #[test]
    fn test_positional_indexing() {
        let xml = doc(
            r#"<kernel name="k0">
                 <arg name="x" addressQualifier="1" type="int*"/>
                 <arg name="y" addressQualifier="1" type="int*"/>
               </kernel>"#,
            "bitstream",
        );
        let meta = parse_embedded_metadata(xml.as_bytes()).unwrap();
        assert_eq!(meta.args.get(0).unwrap().name, "x");
        assert_eq!(meta.args.get(1).unwrap().name, "y");
    }

    #[test]
    fn test_unknown_qualifier_is_not_fatal() {
        let xml = doc(
            r#"<kernel name="k0"><arg name="x" addressQualifier="2" id="0" type="int*"/></kernel>"#,
            "bitstream",
        );
        let meta = parse_embedded_metadata(xml.as_bytes()).unwrap();
        assert_eq!(meta.args.get(0).unwrap().category, ArgCategory::Unknown(2));
    }

    #[test]
    fn test_trailing_nul_padding() {
        let mut payload = doc(r#"<kernel name="k0"/>"#, "csim").into_bytes();
        payload.extend_from_slice(&[0, 0, 0, 0]);
        let meta = parse_embedded_metadata(&payload).unwrap();
        assert_eq!(meta.target.as_deref(), Some("csim"));
        assert!(meta.args.is_empty());
    }

    #[test]
    fn test_structural_errors() {
        let no_core = r#"<project><platform><device/></platform></project>"#;
        assert!(matches!(
            parse_embedded_metadata(no_core.as_bytes()),
            Err(ContainerError::Metadata { .. })
        ));

        let no_kernel = doc("", "bitstream");
        assert!(parse_embedded_metadata(no_kernel.as_bytes()).is_err());

        let duplicate = doc(
            r#"<kernel name="k0">
                 <arg name="a" addressQualifier="1" id="0" type="int*"/>
                 <arg name="b" addressQualifier="1" id="0" type="int*"/>
               </kernel>"#,
            "bitstream",
        );
        assert!(parse_embedded_metadata(duplicate.as_bytes()).is_err());

        assert!(parse_embedded_metadata(b"<project>").is_err());
        assert!(parse_embedded_metadata(&[0xff, 0xfe]).is_err());
    }
}
