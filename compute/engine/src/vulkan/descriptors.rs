//! Kernel resource bindings

use super::{handle::Owned, Gpu};
use crate::{Error, Result};
use ash::vk;
use std::sync::Arc;

/// Binding of the sampled input image
pub const INPUT_BINDING: u32 = 0;

/// Binding of the output storage image
pub const OUTPUT_BINDING: u32 = 1;

/// Binding of the kernel parameters
pub const PARAMETERS_BINDING: u32 = 2;

/// Descriptor types of every binding, in binding order
const BINDING_TYPES: [vk::DescriptorType; 3] = [
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_BUFFER,
];

/// Create the pool from which the frame's descriptor set is allocated
///
/// Sized for exactly one descriptor set, which must be freed before the next
/// one is allocated.
pub(crate) fn create_pool(gpu: &Arc<Gpu>) -> Result<Owned<vk::DescriptorPool>> {
    let pool_sizes = BINDING_TYPES.map(|ty| vk::DescriptorPoolSize {
        ty,
        descriptor_count: 1,
    });
    let create_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(1)
        .pool_sizes(&pool_sizes);
    // SAFETY: Valid create info, pool is destroyed by Owned
    unsafe {
        let pool = gpu
            .raw
            .create_descriptor_pool(&create_info, None)
            .map_err(Error::resource("vkCreateDescriptorPool"))?;
        Ok(Owned::new(gpu, pool))
    }
}

/// Create the layout of the kernel's only descriptor set
pub(crate) fn create_set_layout(gpu: &Arc<Gpu>) -> Result<Owned<vk::DescriptorSetLayout>> {
    let bindings = [INPUT_BINDING, OUTPUT_BINDING, PARAMETERS_BINDING].map(|binding| {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(BINDING_TYPES[binding as usize])
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .build()
    });
    let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
    // SAFETY: Valid create info, layout is destroyed by Owned
    unsafe {
        let layout = gpu
            .raw
            .create_descriptor_set_layout(&create_info, None)
            .map_err(Error::resource("vkCreateDescriptorSetLayout"))?;
        Ok(Owned::new(gpu, layout))
    }
}

/// Descriptor set that goes back to its pool when dropped
pub(crate) struct DescriptorSet {
    pool: Arc<Owned<vk::DescriptorPool>>,
    set: vk::DescriptorSet,
}
//
impl DescriptorSet {
    /// Allocate a descriptor set with a certain layout
    pub fn new(
        pool: &Arc<Owned<vk::DescriptorPool>>,
        layout: &Owned<vk::DescriptorSetLayout>,
    ) -> Result<Self> {
        let set_layouts = [layout.handle()];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool.handle())
            .set_layouts(&set_layouts);
        // SAFETY: Pool and layout are valid, the pool has room for one set
        let sets = unsafe {
            pool.gpu()
                .raw
                .allocate_descriptor_sets(&allocate_info)
                .map_err(Error::resource("vkAllocateDescriptorSets"))?
        };
        Ok(Self {
            pool: pool.clone(),
            set: sets[0],
        })
    }

    /// Raw handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Point every binding to its resource
    ///
    /// The input image is expected to be sampled in the shader-read-only
    /// layout, the output image to be written in the general layout.
    pub fn write(&mut self, resources: &BoundResources) {
        let input_info = [vk::DescriptorImageInfo {
            sampler: resources.input_sampler,
            image_view: resources.input_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let output_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: resources.output_view,
            image_layout: vk::ImageLayout::GENERAL,
        }];
        let parameters_info = [vk::DescriptorBufferInfo {
            buffer: resources.parameters,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }];
        let write = |binding: u32| {
            vk::WriteDescriptorSet::builder()
                .dst_set(self.set)
                .dst_binding(binding)
                .dst_array_element(0)
                .descriptor_type(BINDING_TYPES[binding as usize])
        };
        let writes = [
            write(INPUT_BINDING).image_info(&input_info).build(),
            write(OUTPUT_BINDING).image_info(&output_info).build(),
            write(PARAMETERS_BINDING)
                .buffer_info(&parameters_info)
                .build(),
        ];
        // SAFETY: The set is not in use by pending device work, and every
        //         resource is valid
        unsafe { self.pool.gpu().raw.update_descriptor_sets(&writes, &[]) }
    }
}
//
impl Drop for DescriptorSet {
    fn drop(&mut self) {
        // SAFETY: Set was allocated from this pool, which allows freeing sets,
        //         and nothing is in flight
        let result = unsafe {
            self.pool
                .gpu()
                .raw
                .free_descriptor_sets(self.pool.handle(), &[self.set])
        };
        if let Err(e) = result {
            log::error!("Failed to free descriptor set: {e}");
        }
    }
}

/// Raw resources that the kernel's bindings point to
pub(crate) struct BoundResources {
    pub input_sampler: vk::Sampler,
    pub input_view: vk::ImageView,
    pub output_view: vk::ImageView,
    pub parameters: vk::Buffer,
}
