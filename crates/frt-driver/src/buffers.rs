//! Bank-aware buffer management
//!
//! One device buffer per argument index. An argument wired to a memory bank
//! gets an extended-pointer directive carrying that bank's placement flag;
//! access direction decides whether the buffer migrates in the load stage,
//! the store stage, or both.

use crate::api::{BufferHandle, ComputeApi, ContextHandle, ExtPtr, MemFlags};
use crate::error::{Result, RuntimeError};
use frt_container::ArgTable;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use xclbin_layout::bank;

/// Direction a buffer is used in, seen from the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Kernel input: migrated to the device before compute
    ReadOnly,
    /// Kernel output: migrated back to the host after compute
    WriteOnly,
    /// Both directions
    ReadWrite,
}

impl Access {
    /// Allocation flag for this access
    pub const fn mem_flags(self) -> MemFlags {
        match self {
            Self::ReadOnly => MemFlags::READ_ONLY,
            Self::WriteOnly => MemFlags::WRITE_ONLY,
            Self::ReadWrite => MemFlags::READ_WRITE,
        }
    }

    /// Buffer joins the load set
    pub const fn loads(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Buffer joins the store set
    pub const fn stores(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Where a buffer was placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Argument's bank tag mapped to a placement flag
    Bank {
        /// Bank tag from the image
        tag: String,
        /// Placement flag sent with the allocation
        flag: u32,
    },
    /// Argument has a bank tag this runtime cannot map
    Unrecognized {
        /// Bank tag from the image
        tag: String,
    },
    /// Argument is known but not wired to a bank
    Default,
    /// No argument metadata for this index
    Unplaced,
}

impl Placement {
    /// Placement flag sent with the allocation, if any
    pub const fn flag(&self) -> Option<u32> {
        match self {
            Self::Bank { flag, .. } => Some(*flag),
            _ => None,
        }
    }

    /// HBM pseudo-channel, if placed in HBM
    pub fn hbm_channel(&self) -> Option<u32> {
        self.flag().and_then(bank::hbm_channel_of)
    }
}

/// Parameters of one buffer allocation
#[derive(Debug, Clone, Copy)]
pub struct BufferRequest<'a> {
    /// Argument index
    pub index: usize,

    /// Access direction
    pub access: Access,

    /// Extra allocation flags
    pub flags: MemFlags,

    /// Initial host contents, at least `size` bytes
    pub host: Option<&'a [u8]>,

    /// Size in bytes
    pub size: usize,
}

impl<'a> BufferRequest<'a> {
    /// Uninitialized buffer of `size` bytes
    pub const fn new(index: usize, access: Access, size: usize) -> Self {
        Self {
            index,
            access,
            flags: MemFlags::NONE,
            host: None,
            size,
        }
    }

    /// Buffer initialized from `data`, sized to fit it
    pub const fn from_host(index: usize, access: Access, data: &'a [u8]) -> Self {
        Self {
            index,
            access,
            flags: MemFlags::NONE,
            host: Some(data),
            size: data.len(),
        }
    }

    /// Add allocation flags
    #[must_use]
    pub fn with_flags(mut self, flags: MemFlags) -> Self {
        self.flags |= flags;
        self
    }
}

/// A buffer owned by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBuffer {
    /// API handle
    pub handle: BufferHandle,

    /// Size in bytes
    pub size: usize,

    /// Access direction
    pub access: Access,

    /// Bank placement
    pub placement: Placement,
}

/// Buffers by argument index, plus the load and store sets
#[derive(Debug, Clone, Default)]
pub struct BufferManager {
    force_host_ptr: bool,
    buffers: BTreeMap<usize, ManagedBuffer>,
    load: BTreeSet<usize>,
    store: BTreeSet<usize>,
}

impl BufferManager {
    /// Empty manager
    pub fn new(force_host_ptr: bool) -> Self {
        Self {
            force_host_ptr,
            ..Self::default()
        }
    }

    /// Allocate the buffer for `request.index`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Api` if allocation or release of the replaced buffer fails.
    pub fn create_buffer<A: ComputeApi + ?Sized>(
        &mut self,
        api: &mut A,
        context: ContextHandle,
        args: &ArgTable,
        request: BufferRequest<'_>,
    ) -> Result<BufferHandle> {
        let BufferRequest {
            index,
            access,
            host,
            size,
            ..
        } = request;

        let placement = match args.get(index) {
            None => Placement::Unplaced,
            Some(arg) => match &arg.bank_tag {
                None => Placement::Default,
                Some(tag) => match bank::placement_flag(tag) {
                    Some(flag) => Placement::Bank {
                        tag: tag.clone(),
                        flag,
                    },
                    None => {
                        warn!("Argument {index}: unrecognized memory bank '{tag}', using default placement");
                        Placement::Unrecognized { tag: tag.clone() }
                    }
                },
            },
        };

        let mut flags = request.flags | access.mem_flags();
        if self.force_host_ptr {
            flags |= MemFlags::USE_HOST_PTR;
        }
        let ext = match &placement {
            Placement::Bank { .. } | Placement::Unrecognized { .. } => {
                flags |= MemFlags::EXT_PTR_XILINX;
                Some(ExtPtr {
                    flags: placement.flag().unwrap_or(0),
                    host_attached: host.is_some(),
                })
            }
            Placement::Default | Placement::Unplaced => None,
        };

        let handle = api
            .create_buffer(context, flags, size, host, ext)
            .map_err(|s| RuntimeError::api("create_buffer", s))?;
        debug!("Argument {index}: {size}-byte {access:?} buffer, {placement:?}");

        let previous = self.remove(index);
        self.buffers.insert(
            index,
            ManagedBuffer {
                handle,
                size,
                access,
                placement,
            },
        );
        if access.loads() {
            self.load.insert(index);
        }
        if access.stores() {
            self.store.insert(index);
        }

        if let Some(previous) = previous {
            debug!("Argument {index}: replacing buffer {}", previous.handle.id());
            api.release_buffer(previous.handle)
                .map_err(|s| RuntimeError::api("release_buffer", s))?;
        }
        Ok(handle)
    }

    fn remove(&mut self, index: usize) -> Option<ManagedBuffer> {
        self.load.remove(&index);
        self.store.remove(&index);
        self.buffers.remove(&index)
    }

    /// Buffer for an argument index
    pub fn buffer(&self, index: usize) -> Option<&ManagedBuffer> {
        self.buffers.get(&index)
    }

    /// Handle for an argument index
    ///
    /// # Errors
    ///
    /// Returns `UnknownArgument` if no buffer was created for `index`.
    pub fn handle(&self, index: usize) -> Result<BufferHandle> {
        self.buffer(index)
            .map(|b| b.handle)
            .ok_or(RuntimeError::UnknownArgument { index })
    }

    /// Buffers in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ManagedBuffer)> {
        self.buffers.iter().map(|(&i, b)| (i, b))
    }

    /// Number of buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True if no buffers exist
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Handles migrated in the load stage
    pub fn load_handles(&self) -> Vec<BufferHandle> {
        self.handles(&self.load)
    }

    /// Handles migrated in the store stage
    pub fn store_handles(&self) -> Vec<BufferHandle> {
        self.handles(&self.store)
    }

    /// Total bytes migrated in the load stage
    pub fn load_bytes(&self) -> u64 {
        self.bytes(&self.load)
    }

    /// Total bytes migrated in the store stage
    pub fn store_bytes(&self) -> u64 {
        self.bytes(&self.store)
    }

    fn handles(&self, set: &BTreeSet<usize>) -> Vec<BufferHandle> {
        set.iter()
            .filter_map(|i| self.buffers.get(i))
            .map(|b| b.handle)
            .collect()
    }

    fn bytes(&self, set: &BTreeSet<usize>) -> u64 {
        set.iter()
            .filter_map(|i| self.buffers.get(i))
            .map(|b| b.size as u64)
            .sum()
    }

    /// Release every buffer, logging failures. Returns how many were released.
    pub fn release_all<A: ComputeApi + ?Sized>(&mut self, api: &mut A) -> usize {
        self.load.clear();
        self.store.clear();
        let mut released = 0;
        for (index, buffer) in std::mem::take(&mut self.buffers) {
            match api.release_buffer(buffer.handle) {
                Ok(()) => released += 1,
                Err(s) => warn!("Failed to release buffer for argument {index}: {s}"),
            }
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DeviceId;
    use crate::backends::SoftwareApi;
    use frt_container::builder::{BankSpec, XclbinBuilder};
    use frt_container::ContainerMetadata;

    fn setup() -> (SoftwareApi, ContextHandle, ArgTable) {
        let image = XclbinBuilder::new("u280", "krnl")
            .buffer("in", "int*")
            .buffer("out", "int*")
            .buffer("tmp", "int*")
            .buffer("plain", "int*")
            .bank(BankSpec::used("DDR[1]"))
            .bank(BankSpec::used("HBM[3]"))
            .bank(BankSpec::used("PLRAM[0]"))
            .connect(0, 0)
            .connect(1, 1)
            .connect(2, 2)
            .build();
        let args = ContainerMetadata::from_bytes(image).unwrap().into_args();

        let mut api = SoftwareApi::for_device("Xilinx", "u280");
        let context = api.create_context(DeviceId::new(0)).unwrap();
        (api, context, args)
    }

    #[test]
    fn test_access_sets() {
        assert!(Access::ReadOnly.loads() && !Access::ReadOnly.stores());
        assert!(!Access::WriteOnly.loads() && Access::WriteOnly.stores());
        assert!(Access::ReadWrite.loads() && Access::ReadWrite.stores());
    }

    #[test]
    fn test_bank_placement() {
        let (mut api, context, args) = setup();
        let mut buffers = BufferManager::new(true);

        let ddr = buffers
            .create_buffer(&mut api, context, &args, BufferRequest::from_host(0, Access::ReadOnly, &[0u8; 64]))
            .unwrap();
        let hbm = buffers
            .create_buffer(&mut api, context, &args, BufferRequest::new(1, Access::WriteOnly, 64))
            .unwrap();

        let alloc = api.allocation(ddr).unwrap();
        assert_eq!(
            alloc.ext,
            Some(ExtPtr {
                flags: bank::DDR_BANK1,
                host_attached: true
            })
        );
        assert!(alloc.flags.contains(MemFlags::EXT_PTR_XILINX | MemFlags::USE_HOST_PTR | MemFlags::READ_ONLY));

        let alloc = api.allocation(hbm).unwrap();
        assert_eq!(alloc.ext.map(|e| e.flags), Some(3 | bank::MEM_TOPOLOGY));
        assert_eq!(buffers.buffer(1).unwrap().placement.hbm_channel(), Some(3));
    }

    #[test]
    fn test_unrecognized_bank_still_allocates() {
        let (mut api, context, args) = setup();
        let mut buffers = BufferManager::new(false);

        let handle = buffers
            .create_buffer(&mut api, context, &args, BufferRequest::new(2, Access::ReadWrite, 32))
            .unwrap();
        assert_eq!(
            buffers.buffer(2).unwrap().placement,
            Placement::Unrecognized {
                tag: "PLRAM[0]".into()
            }
        );
        let alloc = api.allocation(handle).unwrap();
        assert_eq!(alloc.ext.map(|e| e.flags), Some(0));
        assert!(!alloc.flags.contains(MemFlags::USE_HOST_PTR));
    }

    #[test]
    fn test_default_and_unplaced() {
        let (mut api, context, args) = setup();
        let mut buffers = BufferManager::new(true);

        let plain = buffers
            .create_buffer(&mut api, context, &args, BufferRequest::new(3, Access::ReadOnly, 8))
            .unwrap();
        let extra = buffers
            .create_buffer(
                &mut api,
                context,
                &args,
                BufferRequest::new(9, Access::ReadOnly, 8).with_flags(MemFlags::from_bits(1 << 20)),
            )
            .unwrap();

        assert_eq!(buffers.buffer(3).unwrap().placement, Placement::Default);
        assert_eq!(buffers.buffer(9).unwrap().placement, Placement::Unplaced);
        assert_eq!(api.allocation(plain).unwrap().ext, None);
        let alloc = api.allocation(extra).unwrap();
        assert_eq!(alloc.ext, None);
        assert!(alloc.flags.contains(MemFlags::from_bits(1 << 20)));
    }

    #[test]
    fn test_replacement_updates_sets() {
        let (mut api, context, args) = setup();
        let mut buffers = BufferManager::new(true);

        let first = buffers
            .create_buffer(&mut api, context, &args, BufferRequest::new(0, Access::ReadWrite, 16))
            .unwrap();
        assert_eq!(buffers.load_handles(), vec![first]);
        assert_eq!(buffers.store_handles(), vec![first]);

        let second = buffers
            .create_buffer(&mut api, context, &args, BufferRequest::new(0, Access::ReadOnly, 32))
            .unwrap();
        assert_eq!(buffers.load_handles(), vec![second]);
        assert!(buffers.store_handles().is_empty());
        assert_eq!(buffers.load_bytes(), 32);
        assert_eq!(buffers.len(), 1);
        assert!(api.allocation(first).is_none());
    }

    #[test]
    fn test_release_all() {
        let (mut api, context, args) = setup();
        let mut buffers = BufferManager::new(true);
        for index in 0..3 {
            buffers
                .create_buffer(&mut api, context, &args, BufferRequest::new(index, Access::ReadWrite, 8))
                .unwrap();
        }
        assert_eq!(buffers.release_all(&mut api), 3);
        assert!(buffers.is_empty());
        assert_eq!(api.buffer_count(), 0);
        assert!(matches!(
            buffers.handle(0),
            Err(RuntimeError::UnknownArgument { index: 0 })
        ));
    }
}
