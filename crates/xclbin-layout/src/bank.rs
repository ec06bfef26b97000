//! Bank tag → placement flag encoding.
//!
//! When a buffer is allocated through the vendor extended-pointer path, the
//! `flags` word selects the memory bank:
//!
//! | Tag | Flag |
//! |-----|------|
//! | `bank0`..`bank3`, `DDR[0]`..`DDR[3]` | one-hot DDR bank bit |
//! | `HBM[n]`, `0 <= n < 32` | `n \| XCL_MEM_TOPOLOGY` |
//!
//! Any other tag has no encoding; callers allocate without placement.

/// `XCL_MEM_DDR_BANK0`
pub const DDR_BANK0: u32 = 1 << 0;
/// `XCL_MEM_DDR_BANK1`
pub const DDR_BANK1: u32 = 1 << 1;
/// `XCL_MEM_DDR_BANK2`
pub const DDR_BANK2: u32 = 1 << 2;
/// `XCL_MEM_DDR_BANK3`
pub const DDR_BANK3: u32 = 1 << 3;

/// `XCL_MEM_TOPOLOGY`: low bits carry a topology index instead of a bank bit.
pub const MEM_TOPOLOGY: u32 = 1 << 31;

/// Number of addressable HBM pseudo-channels.
pub const HBM_CHANNELS: u32 = 32;

/// `CL_MEM_EXT_PTR_XILINX`: allocation flag announcing an extended pointer.
pub const EXT_PTR_FLAG: u64 = 1 << 31;

const DDR_BANKS: [u32; 4] = [DDR_BANK0, DDR_BANK1, DDR_BANK2, DDR_BANK3];

/// Placement flag for a bank tag, or `None` if the tag is not recognized.
#[must_use]
pub fn placement_flag(tag: &str) -> Option<u32> {
    if let Some(n) = tag.strip_prefix("bank") {
        return ddr_bank(n);
    }
    if let Some(n) = bracketed(tag, "DDR") {
        return ddr_bank(n);
    }
    if let Some(n) = bracketed(tag, "HBM") {
        return hbm_channel(n);
    }
    None
}

/// HBM channel encoded in a placement flag, if any.
#[must_use]
pub const fn hbm_channel_of(flag: u32) -> Option<u32> {
    if flag & MEM_TOPOLOGY != 0 {
        Some(flag & !MEM_TOPOLOGY)
    } else {
        None
    }
}

fn bracketed<'a>(tag: &'a str, prefix: &str) -> Option<&'a str> {
    tag.strip_prefix(prefix)?.strip_prefix('[')?.strip_suffix(']')
}

fn ddr_bank(digits: &str) -> Option<u32> {
    let n = parse_index(digits)?;
    DDR_BANKS.get(n as usize).copied()
}

fn hbm_channel(digits: &str) -> Option<u32> {
    let n = parse_index(digits)?;
    (n < HBM_CHANNELS).then_some(n | MEM_TOPOLOGY)
}

// Plain decimal only: no sign, no leading zeros, no whitespace.
fn parse_index(digits: &str) -> Option<u32> {
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddr_tags() {
        assert_eq!(placement_flag("bank0"), Some(DDR_BANK0));
        assert_eq!(placement_flag("bank3"), Some(DDR_BANK3));
        assert_eq!(placement_flag("DDR[1]"), Some(DDR_BANK1));
        assert_eq!(placement_flag("DDR[2]"), Some(DDR_BANK2));
        assert_eq!(placement_flag("bank4"), None);
        assert_eq!(placement_flag("DDR[4]"), None);
    }

    #[test]
    fn test_hbm_tags() {
        assert_eq!(placement_flag("HBM[0]"), Some(MEM_TOPOLOGY));
        assert_eq!(placement_flag("HBM[3]"), Some(3 | MEM_TOPOLOGY));
        assert_eq!(placement_flag("HBM[31]"), Some(31 | MEM_TOPOLOGY));
        assert_eq!(placement_flag("HBM[32]"), None);
        assert_eq!(hbm_channel_of(placement_flag("HBM[17]").unwrap()), Some(17));
        assert_eq!(hbm_channel_of(DDR_BANK2), None);
    }

    #[test]
    fn test_malformed_tags() {
        for tag in ["", "bank", "DDR[]", "DDR[01]", "HBM[-1]", "HBM[3", "hbm[3]", "PLRAM[0]", "unknown-tag"] {
            assert_eq!(placement_flag(tag), None, "{tag}");
        }
    }
}
