//! Host-visible buffers

use super::{handle::Owned, memory::Allocation, Gpu};
use crate::{Error, Result};
use ash::vk;
use std::sync::Arc;
use vulkano::memory::MemoryPropertyFlags;

/// Buffer that the host can read and write directly
///
/// Used for the staging buffers and the uniform buffer. The buffer is
/// released before its memory.
pub(crate) struct Buffer {
    buffer: Owned<vk::Buffer>,
    memory: Allocation,
    size: usize,
}
//
impl Buffer {
    /// Memory properties of every host-visible buffer
    const MEMORY_FLAGS: MemoryPropertyFlags =
        MemoryPropertyFlags::HOST_VISIBLE.union(MemoryPropertyFlags::HOST_COHERENT);

    /// Create a buffer of `size` bytes
    pub fn new(gpu: &Arc<Gpu>, size: usize, usage: vk::BufferUsageFlags) -> Result<Self> {
        let queue_family_indices = [gpu.queue_family_index];
        let create_info = vk::BufferCreateInfo::builder()
            .size(size as u64)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_family_indices);
        // SAFETY: Valid create info, buffer is destroyed by Owned
        let buffer = unsafe {
            let raw = gpu
                .raw
                .create_buffer(&create_info, None)
                .map_err(Error::resource("vkCreateBuffer"))?;
            Owned::new(gpu, raw)
        };
        // SAFETY: Buffer is valid
        let requirements = unsafe { gpu.raw.get_buffer_memory_requirements(buffer.handle()) };
        let memory = Allocation::new(gpu, requirements, Self::MEMORY_FLAGS)?;
        // SAFETY: Memory was allocated for this buffer's requirements
        unsafe {
            gpu.raw
                .bind_buffer_memory(buffer.handle(), memory.handle(), 0)
                .map_err(Error::resource("vkBindBufferMemory"))?;
        }
        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size in bytes, as requested at creation time
    pub fn size(&self) -> usize {
        self.size
    }

    /// Let `write` fill the buffer
    pub fn write(&self, write: impl FnOnce(&mut [u8])) -> Result<()> {
        self.memory.with_mapped(self.size, write)
    }

    /// Let `read` look at the buffer's contents
    pub fn read(&self, read: impl FnOnce(&[u8])) -> Result<()> {
        self.memory.with_mapped(self.size, |bytes| read(bytes))
    }
}
