//! Device images and samplers

use super::{handle::Owned, memory::Allocation, vk_format, Gpu};
use crate::{layout::ImageRole, Error, ImageInfo, Result};
use ash::vk;
use std::sync::Arc;
use vulkano::memory::MemoryPropertyFlags;

/// Subresources of every frame image
pub(crate) const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Subresources touched by buffer/image copies
pub(crate) const COLOR_LAYERS: vk::ImageSubresourceLayers = vk::ImageSubresourceLayers {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    mip_level: 0,
    base_array_layer: 0,
    layer_count: 1,
};

/// Device-local 2D image with a view that covers all of it
///
/// Fields are released in declaration order: view, image, then memory.
pub(crate) struct DeviceImage {
    view: Owned<vk::ImageView>,
    image: Owned<vk::Image>,
    _memory: Allocation,
}
//
impl DeviceImage {
    /// Create an image that plays a certain role in frames of a certain shape
    ///
    /// The image starts out in the undefined layout.
    pub fn new(gpu: &Arc<Gpu>, info: &ImageInfo, role: ImageRole) -> Result<Self> {
        let format = vk_format(info.format());
        let [width, height, depth] = info.extent();
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width,
                height,
                depth,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage(role))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        // SAFETY: Valid create info, format support was checked beforehand
        let image = unsafe {
            let raw = gpu
                .raw
                .create_image(&create_info, None)
                .map_err(Error::resource("vkCreateImage"))?;
            Owned::new(gpu, raw)
        };

        // SAFETY: Image is valid
        let requirements = unsafe { gpu.raw.get_image_memory_requirements(image.handle()) };
        let memory = Allocation::new(gpu, requirements, MemoryPropertyFlags::DEVICE_LOCAL)?;
        // SAFETY: Memory was allocated for this image's requirements
        unsafe {
            gpu.raw
                .bind_image_memory(image.handle(), memory.handle(), 0)
                .map_err(Error::resource("vkBindImageMemory"))?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(COLOR_RANGE);
        // SAFETY: Image is bound to memory and compatible with the view
        let view = unsafe {
            let raw = gpu
                .raw
                .create_image_view(&view_info, None)
                .map_err(Error::resource("vkCreateImageView"))?;
            Owned::new(gpu, raw)
        };

        Ok(Self {
            view,
            image,
            _memory: memory,
        })
    }

    /// Raw image handle
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    /// Raw image view handle
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }
}

/// Image usage needed for a certain role
fn usage(role: ImageRole) -> vk::ImageUsageFlags {
    match role {
        ImageRole::Input => vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        ImageRole::Output => vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
    }
}

/// Format features that an image needs to play a certain role
pub(crate) fn required_format_features(role: ImageRole) -> vk::FormatFeatureFlags {
    match role {
        ImageRole::Input => {
            vk::FormatFeatureFlags::SAMPLED_IMAGE
                | vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::TRANSFER_DST
        }
        ImageRole::Output => {
            vk::FormatFeatureFlags::STORAGE_IMAGE | vk::FormatFeatureFlags::TRANSFER_SRC
        }
    }
}

/// Create a sampler with a given filter
///
/// Coordinates are normalized and wrap around.
pub(crate) fn create_sampler(gpu: &Arc<Gpu>, filter: vk::Filter) -> Result<Owned<vk::Sampler>> {
    let create_info = vk::SamplerCreateInfo::builder()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .compare_op(vk::CompareOp::NEVER)
        .min_lod(0.0)
        .max_lod(0.0)
        .border_color(vk::BorderColor::INT_TRANSPARENT_BLACK)
        .unnormalized_coordinates(false);
    // SAFETY: Valid create info, sampler is destroyed by Owned
    unsafe {
        let sampler = gpu
            .raw
            .create_sampler(&create_info, None)
            .map_err(Error::resource("vkCreateSampler"))?;
        Ok(Owned::new(gpu, sampler))
    }
}
