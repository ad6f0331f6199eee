//! Vulkan implementation of the engine backend
//!
//! The context (instance, device, queue) is managed by vulkano, while the
//! engine's own objects are created through raw `ash` calls on the same
//! device. This gives full control over image layouts, memory type selection
//! and submission, which is what the engine's contract is about.

mod buffer;
mod cache;
mod commands;
mod descriptors;
mod frame;
mod handle;
mod image;
pub mod memory;
mod pipeline;
mod shader;

pub use self::{frame::VulkanFrame, shader::load_spirv};

use self::{
    buffer::Buffer,
    cache::PersistentPipelineCache,
    commands::CommandPool,
    descriptors::BoundResources,
    handle::Owned,
    image::{COLOR_LAYERS, COLOR_RANGE},
    memory::MemoryTypeInfo,
};
use crate::{
    layout::{Command, ImageLayout, ImageRole},
    Backend, EngineConfig, Error, ImageInfo, PixelFormat, Result, UniformParameters,
};
use ash::vk;
use compute::VulkanContext;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::sync::Arc;
use vulkano::VulkanObject;

/// Vulkan format used for device images of a given pixel format
pub fn vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Rgba16 => vk::Format::R16G16B16A16_UNORM,
        PixelFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
    }
}

/// Device limits that decide which frame shapes can be processed
#[derive(Copy, Clone, Debug)]
struct FrameLimits {
    max_image_dimension: u32,
    max_work_group_count: [u32; 3],
}

/// Logical device, as seen by the raw device objects
///
/// Every [`Owned`] object keeps this alive, so the device is only destroyed
/// once the last object created from it is gone.
pub(crate) struct Gpu {
    /// Raw device function table
    pub raw: ash::Device,

    /// Queue that compute work and transfers are submitted to
    pub queue: vk::Queue,

    /// Family of `queue`
    pub queue_family_index: u32,

    /// Memory types of the physical device, in index order
    pub memory_types: Box<[MemoryTypeInfo]>,

    /// Limits relevant to frame processing
    limits: FrameLimits,

    /// Optimal-tiling features of each pixel format, in [`PixelFormat::ALL`] order
    format_features: [vk::FormatFeatureFlags; PixelFormat::ALL.len()],

    /// Vulkan context that owns the device, released last
    _context: VulkanContext,
}
//
impl Gpu {
    /// Wrap a freshly built Vulkan context
    fn new(context: VulkanContext) -> Self {
        let device = &context.device;
        let physical = context.physical_device();
        let instance = physical.instance();
        // SAFETY: The device was created from this instance and outlives the
        //         function table, which is dropped before the context
        let raw = unsafe { ash::Device::load(&instance.fns().v1_0, device.handle()) };
        let queue = context.compute_queue();

        let properties = physical.properties();
        let limits = FrameLimits {
            max_image_dimension: properties.max_image_dimension2_d,
            max_work_group_count: properties.max_compute_work_group_count,
        };
        let format_features = PixelFormat::ALL.map(|format| {
            let mut properties = vk::FormatProperties::default();
            // SAFETY: Physical device handle is valid, properties is writable
            unsafe {
                (instance.fns().v1_0.get_physical_device_format_properties)(
                    physical.handle(),
                    vk_format(format),
                    &mut properties,
                )
            };
            properties.optimal_tiling_features
        });
        let memory_types = MemoryTypeInfo::enumerate(physical);
        debug!("Device memory types: {memory_types:#?}");

        Self {
            raw,
            queue: queue.handle(),
            queue_family_index: queue.queue_family_index(),
            memory_types,
            limits,
            format_features,
            _context: context,
        }
    }

    /// Check that the device can handle frames of a certain shape
    fn check_frame(&self, info: &ImageInfo) -> Result<()> {
        let unsupported = |reason: String| {
            Err(Error::UnsupportedFrame {
                info: *info,
                reason,
            })
        };

        let max_dimension = self.limits.max_image_dimension;
        if info.width() > max_dimension || info.height() > max_dimension {
            return unsupported(format!("images are limited to {max_dimension} pixels per side"));
        }

        let max_groups = self.limits.max_work_group_count;
        let groups = info.dispatch_size();
        if groups.iter().zip(max_groups).any(|(&req, max)| req > max) {
            return unsupported(format!("dispatches are limited to {max_groups:?} work-groups"));
        }

        let features = self.format_features[info.format() as usize];
        for role in [ImageRole::Input, ImageRole::Output] {
            let required = image::required_format_features(role);
            if !features.contains(required) {
                return unsupported(format!(
                    "{:?} lacks {:?} for the {role:?} image",
                    vk_format(info.format()),
                    required & !features
                ));
            }
        }
        Ok(())
    }
}

/// Vulkan engine backend
///
/// Holds the resources that live as long as the engine. Fields are declared
/// in reverse creation order so that they are released in that order, with
/// the device going last once every object created from it is gone.
pub struct VulkanBackend {
    pipeline_cache: PersistentPipelineCache,
    uniforms: Buffer,
    input_sampler: Owned<vk::Sampler>,
    descriptor_pool: Arc<Owned<vk::DescriptorPool>>,
    commands: CommandPool,
    shader: Owned<vk::ShaderModule>,
    gpu: Arc<Gpu>,
}
//
impl VulkanBackend {
    /// Set up the device and every frame-independent resource
    pub fn new(config: EngineConfig) -> Result<Self> {
        let EngineConfig {
            vulkan,
            shader_path,
            pipeline_cache,
        } = config;

        let context = VulkanContext::new(vulkan)?;
        info!(
            "Setting up compute engine on {}",
            context.physical_device().properties().device_name
        );
        let gpu = Arc::new(Gpu::new(context));

        let code = shader::load_spirv(&shader_path)?;
        let shader = shader::create_module(&gpu, &code)?;
        let commands = CommandPool::new(&gpu)?;
        let descriptor_pool = Arc::new(descriptors::create_pool(&gpu)?);
        let input_sampler = image::create_sampler(&gpu, vk::Filter::LINEAR)?;
        let uniforms = Buffer::new(
            &gpu,
            UniformParameters::GPU_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        let pipeline_cache = PersistentPipelineCache::new(&gpu, pipeline_cache)?;

        Ok(Self {
            pipeline_cache,
            uniforms,
            input_sampler,
            descriptor_pool,
            commands,
            shader,
            gpu,
        })
    }

    /// Record a command into a command buffer
    fn record(
        &self,
        frame: &VulkanFrame,
        command: Command,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
    ) {
        let extent = {
            let [width, height, depth] = frame.info().extent();
            vk::Extent3D {
                width,
                height,
                depth,
            }
        };
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(COLOR_LAYERS)
            .image_offset(vk::Offset3D::default())
            .image_extent(extent)
            .build();

        // SAFETY: Every handle belongs to this device, layouts were checked
        //         by the caller
        unsafe {
            match command {
                Command::Transition { image, from, to } => {
                    let (src_stage, src_access) = sync_scope(from);
                    let (dst_stage, dst_access) = sync_scope(to);
                    let barrier = vk::ImageMemoryBarrier::builder()
                        .src_access_mask(src_access)
                        .dst_access_mask(dst_access)
                        .old_layout(vk_layout(from))
                        .new_layout(vk_layout(to))
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .image(frame.image(image).image())
                        .subresource_range(COLOR_RANGE)
                        .build();
                    device.cmd_pipeline_barrier(
                        command_buffer,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
                Command::CopyBufferToImage => device.cmd_copy_buffer_to_image(
                    command_buffer,
                    frame.input_staging.handle(),
                    frame.input.image(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                ),
                Command::Dispatch { group_count: [x, y, z] } => {
                    device.cmd_bind_pipeline(
                        command_buffer,
                        vk::PipelineBindPoint::COMPUTE,
                        frame.pipeline.handle(),
                    );
                    device.cmd_bind_descriptor_sets(
                        command_buffer,
                        vk::PipelineBindPoint::COMPUTE,
                        frame.pipeline_layout.handle(),
                        0,
                        &[frame.descriptor_set.handle()],
                        &[],
                    );
                    device.cmd_dispatch(command_buffer, x, y, z);
                }
                Command::CopyImageToBuffer => {
                    device.cmd_copy_image_to_buffer(
                        command_buffer,
                        frame.output.image(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        frame.output_staging.handle(),
                        &[region],
                    );
                    let barrier = vk::BufferMemoryBarrier::builder()
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(vk::AccessFlags::HOST_READ)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(frame.output_staging.handle())
                        .offset(0)
                        .size(vk::WHOLE_SIZE)
                        .build();
                    device.cmd_pipeline_barrier(
                        command_buffer,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::HOST,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[barrier],
                        &[],
                    );
                }
            }
        }
    }
}
//
impl Backend for VulkanBackend {
    type Frame = VulkanFrame;

    fn check_frame(&self, info: &ImageInfo) -> Result<()> {
        self.gpu.check_frame(info)
    }

    fn create_frame(&mut self, info: &ImageInfo) -> Result<VulkanFrame> {
        VulkanFrame::new(self, info)
    }

    fn update_descriptor_set(&mut self, frame: &mut VulkanFrame) -> Result<()> {
        let resources = BoundResources {
            input_sampler: self.input_sampler.handle(),
            input_view: frame.input.view(),
            output_view: frame.output.view(),
            parameters: self.uniforms.handle(),
        };
        frame.descriptor_set.write(&resources);
        Ok(())
    }

    fn write_uniforms(&mut self, params: &UniformParameters) -> Result<()> {
        let gpu_params = params.to_gpu();
        self.uniforms
            .write(|bytes| bytes.copy_from_slice(bytemuck::bytes_of(&gpu_params)))
    }

    fn write_input(
        &mut self,
        frame: &mut VulkanFrame,
        write: impl FnOnce(&mut [u8]),
    ) -> Result<()> {
        debug_assert_eq!(frame.input_staging.size(), frame.info().byte_size());
        frame.input_staging.write(write)
    }

    fn read_output(&mut self, frame: &mut VulkanFrame, read: impl FnOnce(&[u8])) -> Result<()> {
        debug_assert_eq!(frame.output_staging.size(), frame.info().byte_size());
        frame.output_staging.read(read)
    }

    fn submit(&mut self, frame: &mut VulkanFrame, command: Command) -> Result<()> {
        self.commands
            .run(|device, command_buffer| self.record(frame, command, device, command_buffer))
    }
}

/// Vulkan equivalent of an image layout
fn vk_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    }
}

/// Pipeline stage and accesses that use an image in a certain layout
fn sync_scope(layout: ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    match layout {
        ImageLayout::Undefined => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        ImageLayout::ShaderReadOnly => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_READ,
        ),
        ImageLayout::General => (
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::SHADER_WRITE,
        ),
        ImageLayout::TransferDst => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        ImageLayout::TransferSrc => (
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_READ,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_have_matching_texel_size() {
        for format in PixelFormat::ALL {
            let expected = match vk_format(format) {
                vk::Format::R8G8B8A8_UNORM => 4,
                vk::Format::R16G16B16A16_UNORM => 8,
                vk::Format::R32G32B32A32_SFLOAT => 16,
                other => panic!("unexpected format {other:?}"),
            };
            assert_eq!(format.bytes_per_pixel(), expected);
        }
    }

    #[test]
    fn every_layout_has_a_sync_scope() {
        assert_eq!(
            sync_scope(ImageLayout::Undefined).1,
            vk::AccessFlags::empty()
        );
        for role in [ImageRole::Input, ImageRole::Output] {
            for layout in [role.resting_layout(), role.transfer_layout()] {
                assert!(!sync_scope(layout).1.is_empty());
                assert_ne!(vk_layout(layout), vk::ImageLayout::UNDEFINED);
            }
        }
    }
}
