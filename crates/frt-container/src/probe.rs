//! Container format detection
//!
//! Each supported format gets a [`ContainerParser`]. Probing walks the
//! parsers in priority order and hands the image to the first one whose
//! signature matches. A signature mismatch is never an error on its own;
//! only "nobody recognized it" is.

use crate::container::ContainerMetadata;
use crate::error::{ContainerError, Result};
use bytes::Bytes;
use std::fmt;

/// Known container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    /// `xclbin2` images
    Xclbin,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xclbin => write!(f, "xclbin2"),
        }
    }
}

/// A format-specific parser.
pub trait ContainerParser: Sync {
    /// Format this parser handles
    fn format(&self) -> ContainerFormat;

    /// Parse `image` if its signature belongs to this format.
    ///
    /// Returns `Ok(None)` when the signature does not match, so the next
    /// parser can try.
    ///
    /// # Errors
    ///
    /// Returns error when the signature matches but the image is malformed.
    fn try_parse(&self, image: &Bytes) -> Result<Option<ContainerMetadata>>;
}

/// Parser for `xclbin2` images
#[derive(Debug, Clone, Copy, Default)]
pub struct XclbinParser;

impl ContainerParser for XclbinParser {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Xclbin
    }

    fn try_parse(&self, image: &Bytes) -> Result<Option<ContainerMetadata>> {
        match ContainerMetadata::parse_xclbin(image.clone()) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.is_not_recognized() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Parsers tried by [`probe`], highest priority first.
pub static DEFAULT_PARSERS: &[&dyn ContainerParser] = &[&XclbinParser];

/// Identify and parse `image` with the default parser list.
///
/// # Errors
///
/// Returns [`ContainerError::UnrecognizedFormat`] if no parser accepts the
/// image, or the accepting parser's error.
pub fn probe(image: impl Into<Bytes>) -> Result<ContainerMetadata> {
    probe_with(image, DEFAULT_PARSERS)
}

/// Identify and parse `image` with an explicit parser list.
///
/// # Errors
///
/// Same as [`probe`].
pub fn probe_with(
    image: impl Into<Bytes>,
    parsers: &[&dyn ContainerParser],
) -> Result<ContainerMetadata> {
    let image = image.into();

    for parser in parsers {
        if let Some(meta) = parser.try_parse(&image)? {
            tracing::debug!("Image recognized as {}", parser.format());
            return Ok(meta);
        }
        tracing::debug!("Not a {} image", parser.format());
    }

    tracing::error!("No container parser recognized a {}-byte image", image.len());
    Err(ContainerError::UnrecognizedFormat {
        len: image.len(),
        tried: parsers.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::XclbinBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Declines(AtomicUsize);

    impl ContainerParser for Declines {
        fn format(&self) -> ContainerFormat {
            ContainerFormat::Xclbin
        }

        fn try_parse(&self, _image: &Bytes) -> Result<Option<ContainerMetadata>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[test]
    fn test_probe_xclbin() {
        let meta = probe(XclbinBuilder::new("dev", "k0").build()).unwrap();
        assert_eq!(meta.format(), ContainerFormat::Xclbin);
        assert_eq!(meta.kernel_name(), "k0");
    }

    #[test]
    fn test_unrecognized() {
        let err = probe(vec![0u8; 1024]).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::UnrecognizedFormat { len: 1024, tried: 1 }
        ));
    }

    #[test]
    fn test_priority_order() {
        let first = Declines(AtomicUsize::new(0));
        let parsers: [&dyn ContainerParser; 2] = [&first, &XclbinParser];

        let meta = probe_with(XclbinBuilder::new("dev", "k0").build(), &parsers).unwrap();
        assert_eq!(meta.kernel_name(), "k0");
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_match_is_reported() {
        let image = XclbinBuilder::new("dev", "k0").raw_mode(42).build();
        assert!(matches!(
            probe(image),
            Err(ContainerError::UnknownMode { code: 42 })
        ));
    }

    #[test]
    fn test_empty_parser_list() {
        let err = probe_with(Bytes::new(), &[]).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::UnrecognizedFormat { len: 0, tried: 0 }
        ));
    }
}
