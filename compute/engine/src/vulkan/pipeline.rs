//! Compute pipeline

use super::{cache::PersistentPipelineCache, handle::Owned, Gpu};
use crate::{Error, Result};
use ash::vk;
use std::sync::Arc;

/// Create a pipeline layout with a single descriptor set
pub(crate) fn create_layout(
    gpu: &Arc<Gpu>,
    set_layout: &Owned<vk::DescriptorSetLayout>,
) -> Result<Owned<vk::PipelineLayout>> {
    let set_layouts = [set_layout.handle()];
    let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
    // SAFETY: Valid create info, layout is destroyed by Owned
    unsafe {
        let layout = gpu
            .raw
            .create_pipeline_layout(&create_info, None)
            .map_err(Error::resource("vkCreatePipelineLayout"))?;
        Ok(Owned::new(gpu, layout))
    }
}

/// Create a compute pipeline that runs the `main` entry point of a kernel
pub(crate) fn create_compute(
    gpu: &Arc<Gpu>,
    shader: &Owned<vk::ShaderModule>,
    layout: &Owned<vk::PipelineLayout>,
    cache: &PersistentPipelineCache,
) -> Result<Owned<vk::Pipeline>> {
    let stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader.handle())
        .name(c"main");
    let create_info = vk::ComputePipelineCreateInfo::builder()
        .stage(stage.build())
        .layout(layout.handle())
        .base_pipeline_index(-1);
    // SAFETY: Shader and layout are valid and match each other if the kernel
    //         follows the binding conventions
    unsafe {
        let pipelines = gpu
            .raw
            .create_compute_pipelines(cache.handle(), &[create_info.build()], None)
            .map_err(|(_, result)| Error::resource("vkCreateComputePipelines")(result))?;
        Ok(Owned::new(gpu, pipelines[0]))
    }
}
