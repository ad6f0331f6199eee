//! Device memory allocation

use super::{handle::Owned, Gpu};
use crate::{Error, Result};
use ash::vk;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::sync::Arc;
use vulkano::{device::physical::PhysicalDevice, memory::MemoryPropertyFlags};

/// What the allocator needs to know about a memory type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryTypeInfo {
    /// Properties of memory allocated from this type
    pub property_flags: MemoryPropertyFlags,

    /// Size of the heap that backs this memory type
    pub heap_size: u64,
}
//
impl MemoryTypeInfo {
    /// Describe every memory type of a physical device, in index order
    pub fn enumerate(device: &PhysicalDevice) -> Box<[Self]> {
        let properties = device.memory_properties();
        properties
            .memory_types
            .iter()
            .map(|ty| Self {
                property_flags: ty.property_flags,
                heap_size: properties.memory_heaps[ty.heap_index as usize].size,
            })
            .collect()
    }
}

/// Pick the memory type for an allocation
///
/// Returns the first memory type that is allowed by `allowed_type_bits`, has
/// all the `required` properties, and whose heap is at least `size` bytes
/// large. No attempt is made to find a better match further down the list.
pub fn select_memory_type(
    types: &[MemoryTypeInfo],
    allowed_type_bits: u32,
    required: MemoryPropertyFlags,
    size: u64,
) -> Option<u32> {
    types
        .iter()
        .enumerate()
        .take(32)
        .find(|(idx, ty)| {
            allowed_type_bits & (1 << idx) != 0
                && ty.property_flags.contains(required)
                && ty.heap_size >= size
        })
        .map(|(idx, _)| idx as u32)
}

/// Device memory allocation
pub(crate) struct Allocation {
    memory: Owned<vk::DeviceMemory>,
    size: u64,
}
//
impl Allocation {
    /// Allocate memory that satisfies some requirements
    pub fn new(
        gpu: &Arc<Gpu>,
        requirements: vk::MemoryRequirements,
        required: MemoryPropertyFlags,
    ) -> Result<Self> {
        let size = requirements.size;
        let type_index =
            select_memory_type(&gpu.memory_types, requirements.memory_type_bits, required, size)
                .ok_or(Error::NoSuitableMemory {
                    flags: required,
                    size,
                })?;
        trace!("Allocating {size} bytes of {required:?} memory from type #{type_index}");
        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(type_index);
        // SAFETY: Valid allocation info, memory is freed by Owned
        let memory = unsafe {
            let raw = gpu
                .raw
                .allocate_memory(&allocate_info, None)
                .map_err(Error::resource("vkAllocateMemory"))?;
            Owned::new(gpu, raw)
        };
        Ok(Self { memory, size })
    }

    /// Raw handle
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory.handle()
    }

    /// Map the first `len` bytes of host-visible memory for the duration of `f`
    ///
    /// The memory is unmapped when `f` returns, or if it panics.
    pub fn with_mapped<R>(&self, len: usize, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        debug_assert!(len as u64 <= self.size);
        let device = &self.memory.gpu().raw;
        let memory = self.memory.handle();
        // SAFETY: Memory is host-visible, not mapped elsewhere (engine lock is
        //         held), and no device work is in flight
        let ptr = unsafe {
            device
                .map_memory(memory, 0, len as u64, vk::MemoryMapFlags::empty())
                .map_err(Error::resource("vkMapMemory"))?
        };
        let _unmap = Unmap { device, memory };
        // SAFETY: The mapping covers len bytes and outlives the slice
        let bytes = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), len) };
        Ok(f(bytes))
    }
}

/// Unmaps device memory when dropped
struct Unmap<'device> {
    device: &'device ash::Device,
    memory: vk::DeviceMemory,
}
//
impl Drop for Unmap<'_> {
    fn drop(&mut self) {
        // SAFETY: Memory was mapped by Allocation::with_mapped
        unsafe { self.device.unmap_memory(self.memory) }
    }
}
