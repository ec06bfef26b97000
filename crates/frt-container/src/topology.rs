//! Memory topology and connectivity sections
//!
//! Both sections are optional. Together they assign a bank tag to each
//! memory-mapped argument; the tables themselves are not retained.

use crate::args::ArgTable;
use crate::error::{ContainerError, Result};
use crate::reader::ByteReader;
use std::collections::HashMap;
use xclbin_layout::topology::{connectivity, mem, MemType};

/// One `mem_data` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBank {
    /// Position in the topology table
    pub index: usize,

    /// Memory type
    pub memory_type: MemType,

    /// Whether the design uses this bank
    pub used: bool,

    /// Size in KB
    pub size_kb: u64,

    /// Device base address
    pub base_address: u64,

    /// Bank tag, e.g. `DDR[0]` or `HBM[3]`
    pub tag: String,
}

/// One `connection` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Argument index
    pub arg_index: i32,

    /// Compute unit index in `IP_LAYOUT`
    pub ip_layout_index: i32,

    /// Bank index in `MEM_TOPOLOGY`
    pub mem_data_index: i32,
}

/// Decode a `mem_topology` payload located at `base` in the image.
///
/// # Errors
///
/// Returns `Truncated` if the table is shorter than its count claims, and
/// `Metadata` for a negative count.
pub fn read_memory_banks(payload: &[u8], base: usize) -> Result<Vec<MemoryBank>> {
    let reader = ByteReader::at(payload, base);
    let count = table_count(&reader, mem::COUNT, "mem_topology")?;

    (0..count)
        .map(|i| {
            let at = mem::RECORDS + i * mem::RECORD_SIZE;
            reader.bytes(at, mem::RECORD_SIZE, "mem_data")?;
            Ok(MemoryBank {
                index: i,
                memory_type: MemType::from_code(reader.u8(at + mem::TYPE, "m_type")?),
                used: reader.u8(at + mem::USED, "m_used")? != 0,
                size_kb: reader.u64(at + mem::SIZE_KB, "m_size")?,
                base_address: reader.u64(at + mem::BASE_ADDRESS, "m_base_address")?,
                tag: reader.c_str(at + mem::TAG, mem::TAG_LEN, "m_tag")?,
            })
        })
        .collect()
}

/// Decode a `connectivity` payload located at `base` in the image.
///
/// # Errors
///
/// Returns `Truncated` if the table is shorter than its count claims, and
/// `Metadata` for a negative count.
pub fn read_connections(payload: &[u8], base: usize) -> Result<Vec<Connection>> {
    let reader = ByteReader::at(payload, base);
    let count = table_count(&reader, connectivity::COUNT, "connectivity")?;

    (0..count)
        .map(|i| {
            let at = connectivity::RECORDS + i * connectivity::RECORD_SIZE;
            Ok(Connection {
                arg_index: reader.i32(at + connectivity::ARG_INDEX, "arg_index")?,
                ip_layout_index: reader.i32(at + connectivity::IP_LAYOUT_INDEX, "m_ip_layout_index")?,
                mem_data_index: reader.i32(at + connectivity::MEM_DATA_INDEX, "mem_data_index")?,
            })
        })
        .collect()
}

fn table_count(reader: &ByteReader<'_>, offset: usize, what: &'static str) -> Result<usize> {
    let count = reader.i32(offset, what)?;
    usize::try_from(count)
        .map_err(|_| ContainerError::metadata(format!("{what} has negative count {count}")))
}

/// Bank index → tag for the banks marked used.
pub fn used_bank_tags(banks: &[MemoryBank]) -> HashMap<usize, String> {
    banks
        .iter()
        .filter(|b| b.used)
        .map(|b| (b.index, b.tag.clone()))
        .collect()
}

/// Apply connectivity to the argument table. Returns the number of tags set.
///
/// Connections to unused banks or undeclared arguments are skipped.
pub fn assign_bank_tags(
    args: &mut ArgTable,
    tags: &HashMap<usize, String>,
    connections: &[Connection],
) -> usize {
    let mut assigned = 0;

    for c in connections {
        let Some(tag) = usize::try_from(c.mem_data_index).ok().and_then(|i| tags.get(&i)) else {
            tracing::debug!(
                "Connection arg {} → bank {}: bank unused or absent",
                c.arg_index,
                c.mem_data_index
            );
            continue;
        };

        let applied = usize::try_from(c.arg_index)
            .map(|index| args.set_bank_tag(index, tag.clone()))
            .unwrap_or(false);

        if applied {
            tracing::debug!("Argument {} assigned to {tag}", c.arg_index);
            assigned += 1;
        } else {
            tracing::debug!("Connection references undeclared argument {}", c.arg_index);
        }
    }

    assigned
}
