//! Scoped ownership of raw device objects

use super::Gpu;
use ash::vk;
use std::sync::Arc;

/// Raw Vulkan object that is destroyed with a single device call
pub(crate) trait DeviceObject: Copy {
    /// Destroy the object
    ///
    /// # Safety
    ///
    /// The object must have been created by `device`, must not be in use by
    /// pending device work, and must not be used afterwards.
    unsafe fn destroy(self, device: &ash::Device);
}
//
macro_rules! device_object {
    ($($handle:ident => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceObject for vk::$handle {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$destroy(self, None)
                }
            }
        )*
    };
}
//
device_object! {
    Buffer => destroy_buffer,
    CommandPool => destroy_command_pool,
    DescriptorPool => destroy_descriptor_pool,
    DescriptorSetLayout => destroy_descriptor_set_layout,
    DeviceMemory => free_memory,
    Image => destroy_image,
    ImageView => destroy_image_view,
    Pipeline => destroy_pipeline,
    PipelineCache => destroy_pipeline_cache,
    PipelineLayout => destroy_pipeline_layout,
    Sampler => destroy_sampler,
    ShaderModule => destroy_shader_module,
}

/// Raw Vulkan object that is destroyed when dropped
///
/// Keeps the device alive for as long as the object exists.
pub(crate) struct Owned<T: DeviceObject> {
    gpu: Arc<Gpu>,
    handle: T,
}
//
impl<T: DeviceObject> Owned<T> {
    /// Take ownership of a freshly created object
    ///
    /// # Safety
    ///
    /// `handle` must have been created from `gpu`'s device, and nothing else
    /// may destroy it.
    pub unsafe fn new(gpu: &Arc<Gpu>, handle: T) -> Self {
        Self {
            gpu: gpu.clone(),
            handle,
        }
    }

    /// Raw handle
    pub fn handle(&self) -> T {
        self.handle
    }

    /// Device that owns this object
    pub fn gpu(&self) -> &Arc<Gpu> {
        &self.gpu
    }
}
//
impl<T: DeviceObject> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: Every submission is waited for, so nothing is in flight
        unsafe { self.handle.destroy(&self.gpu.raw) }
    }
}
