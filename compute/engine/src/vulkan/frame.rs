//! Resources that depend on the frame shape

use super::{
    buffer::Buffer,
    descriptors::{self, DescriptorSet},
    handle::Owned,
    image::DeviceImage,
    pipeline, VulkanBackend,
};
use crate::{layout::ImageRole, ImageInfo, Result};
use ash::vk;

/// Staging buffers, images and pipeline for one frame shape
///
/// Everything is created together and released together. Fields are declared
/// in reverse creation order so that they are released in that order.
pub struct VulkanFrame {
    pub(super) pipeline: Owned<vk::Pipeline>,
    pub(super) pipeline_layout: Owned<vk::PipelineLayout>,
    pub(super) descriptor_set: DescriptorSet,
    _set_layout: Owned<vk::DescriptorSetLayout>,
    pub(super) output: DeviceImage,
    pub(super) input: DeviceImage,
    pub(super) output_staging: Buffer,
    pub(super) input_staging: Buffer,
    info: ImageInfo,
}
//
impl VulkanFrame {
    /// Create every resource needed to process frames of a certain shape
    pub(super) fn new(backend: &VulkanBackend, info: &ImageInfo) -> Result<Self> {
        let gpu = &backend.gpu;
        let size = info.byte_size();
        let input_staging = Buffer::new(gpu, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let output_staging = Buffer::new(gpu, size, vk::BufferUsageFlags::TRANSFER_DST)?;
        let input = DeviceImage::new(gpu, info, ImageRole::Input)?;
        let output = DeviceImage::new(gpu, info, ImageRole::Output)?;
        let set_layout = descriptors::create_set_layout(gpu)?;
        let descriptor_set = DescriptorSet::new(&backend.descriptor_pool, &set_layout)?;
        let pipeline_layout = pipeline::create_layout(gpu, &set_layout)?;
        let pipeline = pipeline::create_compute(
            gpu,
            &backend.shader,
            &pipeline_layout,
            &backend.pipeline_cache,
        )?;
        Ok(Self {
            pipeline,
            pipeline_layout,
            descriptor_set,
            _set_layout: set_layout,
            output,
            input,
            output_staging,
            input_staging,
            info: *info,
        })
    }

    /// Image that plays a certain role
    pub(super) fn image(&self, role: ImageRole) -> &DeviceImage {
        match role {
            ImageRole::Input => &self.input,
            ImageRole::Output => &self.output,
        }
    }

    /// Shape of the frames that these resources were built for
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }
}
