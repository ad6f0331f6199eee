//! Compute engine configuration

use compute::VulkanConfig;
use directories::ProjectDirs;
use std::path::PathBuf;

/// Settings of a Vulkan-backed [`ComputeEngine`](crate::ComputeEngine)
pub struct EngineConfig {
    /// Vulkan context configuration
    pub vulkan: VulkanConfig,

    /// Compiled SPIR-V compute kernel
    ///
    /// The kernel must use a local size of 1x1x1, sample its input from a
    /// combined image sampler at binding 0, write its output to a storage
    /// image at binding 1, and read its parameters from a uniform buffer at
    /// binding 2.
    pub shader_path: PathBuf,

    /// File where compiled pipelines are persisted across runs
    ///
    /// Set to `None` to keep the pipeline cache in memory only. By default,
    /// this is a file in the per-user cache directory.
    pub pipeline_cache: Option<PathBuf>,
}
//
impl EngineConfig {
    /// Default configuration for a given kernel
    pub fn new(shader_path: impl Into<PathBuf>) -> Self {
        Self {
            vulkan: VulkanConfig::default(),
            shader_path: shader_path.into(),
            pipeline_cache: default_pipeline_cache_path(),
        }
    }
}

/// Location of the on-disk pipeline cache, if a home directory is available
pub fn default_pipeline_cache_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "vkskeleton").map(|dirs| dirs.cache_dir().join("gpu_pipelines.bin"))
}
