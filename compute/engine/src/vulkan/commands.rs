//! Synchronous command submission

use super::{handle::Owned, Gpu};
use crate::{Error, Result};
use ash::vk;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{mem, sync::Arc};

/// Command pool from which one-shot command buffers are allocated
pub(crate) struct CommandPool {
    pool: Owned<vk::CommandPool>,
}
//
impl CommandPool {
    /// Create a pool for the compute queue
    pub fn new(gpu: &Arc<Gpu>) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(gpu.queue_family_index);
        // SAFETY: Valid create info, pool is destroyed by Owned
        let pool = unsafe {
            let raw = gpu
                .raw
                .create_command_pool(&create_info, None)
                .map_err(Error::resource("vkCreateCommandPool"))?;
            Owned::new(gpu, raw)
        };
        Ok(Self { pool })
    }

    /// Record commands into a fresh command buffer, submit it to the compute
    /// queue, and wait for the queue to go idle
    ///
    /// The command buffer is freed on every path, except when waiting for the
    /// queue fails. It may still be pending then, so it is leaked.
    pub fn run(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let gpu = self.pool.gpu();
        let device = &gpu.raw;
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: Pool is valid and only used under the engine lock
        let buffers = unsafe {
            device
                .allocate_command_buffers(&allocate_info)
                .map_err(Error::submission("vkAllocateCommandBuffers"))?
        };
        let free = FreeCommandBuffers {
            device,
            pool: self.pool.handle(),
            buffers: &buffers,
        };
        let command_buffer = buffers[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: Command buffer was just allocated and is in the initial state
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(Error::submission("vkBeginCommandBuffer"))?;
        }
        record(device, command_buffer);
        // SAFETY: Command buffer is in the recording state
        unsafe {
            device
                .end_command_buffer(command_buffer)
                .map_err(Error::submission("vkEndCommandBuffer"))?;
        }

        let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
        // SAFETY: Command buffer is executable, every object it refers to
        //         outlives the wait below
        unsafe {
            device
                .queue_submit(gpu.queue, &[submit_info.build()], vk::Fence::null())
                .map_err(Error::submission("vkQueueSubmit"))?;
            if let Err(result) = device.queue_wait_idle(gpu.queue) {
                // The command buffer may still be pending, it cannot be freed
                warn!("Leaking a command buffer after a failed queue wait");
                mem::forget(free);
                return Err(Error::submission("vkQueueWaitIdle")(result));
            }
        }
        drop(free);
        Ok(())
    }
}

/// Frees command buffers when dropped
struct FreeCommandBuffers<'a> {
    device: &'a ash::Device,
    pool: vk::CommandPool,
    buffers: &'a [vk::CommandBuffer],
}
//
impl Drop for FreeCommandBuffers<'_> {
    fn drop(&mut self) {
        // SAFETY: Buffers come from this pool and are not pending
        unsafe { self.device.free_command_buffers(self.pool, self.buffers) }
    }
}
