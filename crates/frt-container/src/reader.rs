//! Bounds-checked little-endian field decoding.
//!
//! Every accessor validates `offset + width` against the slice before reading,
//! and reports the absolute image offset on failure.

use crate::error::{ContainerError, Result};

/// Read-only view of a byte region with an absolute base offset for errors.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) const fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    /// View of a sub-region located at `base` in the image.
    pub(crate) const fn at(data: &'a [u8], base: usize) -> Self {
        Self { data, base }
    }

    pub(crate) const fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn bytes(&self, offset: usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
        let available = self.data.len().saturating_sub(offset);
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                ContainerError::truncated(what, self.base.saturating_add(offset), len, available)
            })
    }

    fn array<const N: usize>(&self, offset: usize, what: &'static str) -> Result<[u8; N]> {
        let slice = self.bytes(offset, N, what)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub(crate) fn u8(&self, offset: usize, what: &'static str) -> Result<u8> {
        Ok(self.array::<1>(offset, what)?[0])
    }

    pub(crate) fn u16(&self, offset: usize, what: &'static str) -> Result<u16> {
        self.array(offset, what).map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&self, offset: usize, what: &'static str) -> Result<u32> {
        self.array(offset, what).map(u32::from_le_bytes)
    }

    pub(crate) fn i32(&self, offset: usize, what: &'static str) -> Result<i32> {
        self.array(offset, what).map(i32::from_le_bytes)
    }

    pub(crate) fn u64(&self, offset: usize, what: &'static str) -> Result<u64> {
        self.array(offset, what).map(u64::from_le_bytes)
    }

    /// Fixed-capacity NUL-terminated string; lossy on invalid UTF-8.
    pub(crate) fn c_str(&self, offset: usize, capacity: usize, what: &'static str) -> Result<String> {
        let raw = self.bytes(offset, capacity, what)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_fields() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let r = ByteReader::new(&data);
        assert_eq!(r.u8(1, "b").unwrap(), 0x02);
        assert_eq!(r.u16(0, "h").unwrap(), 0x0201);
        assert_eq!(r.u32(4, "w").unwrap(), 0x0807_0605);
        assert_eq!(r.u64(0, "q").unwrap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn test_truncation_reports_absolute_offset() {
        let data = [0u8; 6];
        let r = ByteReader::at(&data, 100);
        match r.u64(2, "field") {
            Err(ContainerError::Truncated {
                what,
                offset,
                needed,
                available,
            }) => {
                assert_eq!(what, "field");
                assert_eq!(offset, 102);
                assert_eq!(needed, 8);
                assert_eq!(available, 4);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_offset_past_usize_is_truncation() {
        let data = [0u8; 4];
        let r = ByteReader::at(&data, 0x1c8);
        assert!(matches!(
            r.bytes(usize::MAX, 2, "overflow"),
            Err(ContainerError::Truncated {
                offset: usize::MAX,
                available: 0,
                ..
            })
        ));
        assert!(r.u32(usize::MAX - 1, "record").is_err());
    }

    #[test]
    fn test_c_str() {
        let data = *b"HBM[3]\0\0garbage!";
        let r = ByteReader::new(&data);
        assert_eq!(r.c_str(0, 16, "tag").unwrap(), "HBM[3]");
        assert_eq!(r.c_str(8, 8, "tag").unwrap(), "garbage!");
    }
}
