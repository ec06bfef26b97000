//! `mem_topology` and `connectivity` section payloads.
//!
//! ```text
//! mem_topology:
//!   0   m_count        i32
//!   8   m_mem_data[]   40-byte records
//!         0   m_type          u8
//!         1   m_used          u8
//!         8   m_size / route  u64   (KB)
//!         16  m_base_address  u64
//!         24  m_tag           [u8; 16]  NUL-terminated
//!
//! connectivity:
//!   0   m_count          i32
//!   4   m_connection[]   12-byte records
//!         0   arg_index         i32
//!         4   m_ip_layout_index i32
//!         8   mem_data_index    i32
//! ```

/// Memory-topology table layout.
pub mod mem {
    /// Offset of `m_count`.
    pub const COUNT: usize = 0;
    /// Offset of the first `mem_data` record (8-byte aligned).
    pub const RECORDS: usize = 8;
    /// Size of one `mem_data` record.
    pub const RECORD_SIZE: usize = 40;
    /// `m_type` within a record.
    pub const TYPE: usize = 0;
    /// `m_used` within a record.
    pub const USED: usize = 1;
    /// `m_size` within a record.
    pub const SIZE_KB: usize = 8;
    /// `m_base_address` within a record.
    pub const BASE_ADDRESS: usize = 16;
    /// `m_tag` within a record.
    pub const TAG: usize = 24;
    /// Capacity of `m_tag`.
    pub const TAG_LEN: usize = 16;
}

/// Connectivity table layout.
pub mod connectivity {
    /// Offset of `m_count`.
    pub const COUNT: usize = 0;
    /// Offset of the first `connection` record.
    pub const RECORDS: usize = 4;
    /// Size of one `connection` record.
    pub const RECORD_SIZE: usize = 12;
    /// `arg_index` within a record.
    pub const ARG_INDEX: usize = 0;
    /// `m_ip_layout_index` within a record.
    pub const IP_LAYOUT_INDEX: usize = 4;
    /// `mem_data_index` within a record.
    pub const MEM_DATA_INDEX: usize = 8;
}

/// `m_type` values of a memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemType {
    /// DDR3
    Ddr3,
    /// DDR4
    Ddr4,
    /// DRAM
    Dram,
    /// AXI stream
    Streaming,
    /// Pre-allocated global
    PreallocatedGlobal,
    /// ARE
    Are,
    /// HBM pseudo-channel
    Hbm,
    /// BRAM
    Bram,
    /// URAM
    Uram,
    /// Streaming connection
    StreamingConnection,
    /// Host memory
    Host,
    /// Anything else.
    Unknown(u8),
}

impl MemType {
    /// Decode a raw `m_type` byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Ddr3,
            1 => Self::Ddr4,
            2 => Self::Dram,
            3 => Self::Streaming,
            4 => Self::PreallocatedGlobal,
            5 => Self::Are,
            6 => Self::Hbm,
            7 => Self::Bram,
            8 => Self::Uram,
            9 => Self::StreamingConnection,
            10 => Self::Host,
            other => Self::Unknown(other),
        }
    }

    /// Raw `m_type` byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ddr3 => 0,
            Self::Ddr4 => 1,
            Self::Dram => 2,
            Self::Streaming => 3,
            Self::PreallocatedGlobal => 4,
            Self::Are => 5,
            Self::Hbm => 6,
            Self::Bram => 7,
            Self::Uram => 8,
            Self::StreamingConnection => 9,
            Self::Host => 10,
            Self::Unknown(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_record_fields_fit() {
        assert_eq!(mem::TAG + mem::TAG_LEN, mem::RECORD_SIZE);
    }

    #[test]
    fn test_mem_type_codes() {
        assert_eq!(MemType::from_code(6), MemType::Hbm);
        assert_eq!(MemType::from_code(200), MemType::Unknown(200));
        assert_eq!(MemType::Ddr4.code(), 1);
    }
}
