//! Vulkan context owned by a compute engine

pub mod config;
mod device;
mod instance;
mod library;

use self::config::VulkanConfig;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::sync::Arc;
use thiserror::Error;
use vulkano::{
    device::{physical::PhysicalDevice, Device, Queue},
    instance::debug::DebugUtilsMessenger,
    ExtensionProperties, LoadingError, Validated, ValidationError, VulkanError,
};

/// Vulkan compute context
///
/// Common setup you need in order to perform any useful computation with
/// Vulkan: an instance, a logical device, and a queue that can run compute
/// work and data transfers.
///
/// Fields are declared in teardown order. The logical device goes first, then
/// the debug messenger, and the instance is released last once nothing refers
/// to it anymore.
///
/// Built using the [`VulkanConfig`] configuration struct
pub struct VulkanContext {
    /// Logical device (used for resource allocation)
    pub device: Arc<Device>,

    /// Command queues (used for command submission)
    ///
    /// The first queue is guaranteed to support compute operations.
    pub queues: Box<[Arc<Queue>]>,

    /// Messenger that sends Vulkan debug messages to the [`log`] crate
    pub(crate) _messenger: Option<DebugUtilsMessenger>,
}
//
impl VulkanContext {
    /// Build a Vulkan context with a certain configuration
    pub fn new(config: VulkanConfig) -> ContextBuildResult<Self> {
        config.build()
    }

    /// Queue to which compute work and data transfers should be submitted
    pub fn compute_queue(&self) -> &Arc<Queue> {
        &self.queues[0]
    }

    /// Physical device that this context runs on
    pub fn physical_device(&self) -> &Arc<PhysicalDevice> {
        self.device.physical_device()
    }
}
//
impl TryFrom<VulkanConfig> for VulkanContext {
    type Error = ContextBuildError;

    fn try_from(config: VulkanConfig) -> ContextBuildResult<Self> {
        config.build()
    }
}
//
impl Drop for VulkanContext {
    fn drop(&mut self) {
        info!(
            "Tearing down Vulkan context on {}",
            self.physical_device().properties().device_name
        );
    }
}

/// Things that can go wrong while setting up a VulkanContext
#[derive(Debug, Error)]
pub enum ContextBuildError {
    #[error("failed to load the Vulkan library")]
    Loading(#[from] LoadingError),

    #[error("validation layers requested, but not available ({0:?})")]
    MissingLayers(Vec<String>),

    #[error("no physical device matches requirements")]
    NoMatchingDevice,

    #[error("no queue suitable for compute work was configured")]
    NoComputeQueue,

    #[error("a Vulkan API call errored out or failed validation ({0})")]
    Vulkan(#[from] Validated<VulkanError>),
}
//
impl ContextBuildError {
    /// Truth that this error means that Vulkan is not usable on this machine,
    /// as opposed to Vulkan rejecting a valid request
    pub fn means_no_vulkan(&self) -> bool {
        matches!(
            self,
            Self::Loading(_)
                | Self::NoMatchingDevice
                | Self::Vulkan(Validated::Error(
                    VulkanError::InitializationFailed | VulkanError::IncompatibleDriver
                ))
        )
    }
}
//
impl From<VulkanError> for ContextBuildError {
    fn from(value: VulkanError) -> Self {
        Self::Vulkan(Validated::Error(value))
    }
}
//
impl From<Box<ValidationError>> for ContextBuildError {
    fn from(value: Box<ValidationError>) -> Self {
        Self::Vulkan(value.into())
    }
}
//
/// Result type associated with VulkanContext setup issues
pub type ContextBuildResult<T> = std::result::Result<T, ContextBuildError>;

/// Format Vulkan extension properties for display
fn format_extension_properties(extension_properties: &[ExtensionProperties]) -> String {
    format!(
        "{:#?}",
        extension_properties
            .iter()
            .map(|ext| format!("{} v{}", ext.extension_name, ext.spec_version))
            .collect::<Vec<_>>()
    )
}
