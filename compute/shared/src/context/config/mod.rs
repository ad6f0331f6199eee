//! Vulkan context configuration

mod defaults;

use super::{
    device,
    instance::{self, DebuggedInstance},
    library, ContextBuildResult, VulkanContext,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{borrow::Cow, cmp::Ordering};
use vulkano::{
    device::{physical::PhysicalDevice, DeviceExtensions, Features, QueueCreateInfo},
    instance::InstanceExtensions,
    VulkanLibrary,
};

/// Vulkan compute context configuration
///
/// A default configuration is provided via the [`default()`] method and
/// documented in the various fields of this struct. You can change these fields
/// to adjust the configuration, check out their documentation to see what their
/// default behavior is.
///
/// Once you're satisfied with the configuration, used the [`build()`] method
/// to set up the Vulkan context.
///
/// [`default()`]: VulkanConfig::default()
/// [`build()`]: VulkanConfig::build()
#[allow(clippy::type_complexity)]
pub struct VulkanConfig {
    /// Decide which Vulkan layers should be enabled
    ///
    /// Every layer returned here must be provided by the Vulkan library,
    /// otherwise context setup fails with
    /// [`ContextBuildError::MissingLayers`](super::ContextBuildError::MissingLayers).
    ///
    /// By default, "VK_LAYER_KHRONOS_validation" is requested on debug builds
    /// and no layer is requested on release builds.
    pub layers: Box<dyn FnOnce(&VulkanLibrary) -> Vec<String> + Send>,

    /// Decide which instance extensions should be enabled
    ///
    /// By default, the ext_debug_utils extension is enabled on debug builds
    /// when the library supports it, so that validation messages end up in
    /// the log.
    pub instance_extensions: Box<dyn FnOnce(&VulkanLibrary) -> InstanceExtensions + Send>,

    /// Truth that Vulkan Portability devices should be enumerated
    ///
    /// Some Vulkan implementations, like MoltenVK on macOS, do not support the
    /// full Vulkan 1.0 specification. By setting this flag, you enable these
    /// devices to be discovered. Enabled by default on macOS only.
    pub enumerate_portability: bool,

    /// Decide which device features and extensions should be enabled
    ///
    /// If the set of features and extensions that you return is not supported
    /// by a device, that device will be discarded at enumeration time.
    ///
    /// By default, the shader_storage_image_write_without_format feature is
    /// required, since the compute kernels write their output image without
    /// declaring its format. The khr_portability_subset extension is enabled
    /// on devices that expose it.
    pub device_features_extensions:
        Box<dyn FnMut(&PhysicalDevice) -> (Features, DeviceExtensions) + Send>,

    /// Impose additional device requirements
    ///
    /// Requirements on the compute device other than features and extensions
    /// to be enabled. Devices without a compute queue family are always
    /// discarded, whatever this callback says.
    ///
    /// By default, no additional requirements are imposed.
    pub other_device_requirements: Box<dyn FnMut(&PhysicalDevice) -> bool + Send>,

    /// Decide which device is best
    ///
    /// In case of a tie, the first device in the order of Vulkan device
    /// enumeration is selected.
    ///
    /// By default, all devices compare equal, so the first suitable device
    /// wins. Setting the `VKSKELETON_PREFER_DEVICE` environment variable to
    /// "discrete", "integrated", "virtual", "cpu" or "other" moves devices of
    /// that type ahead of the others.
    pub device_preference: Box<dyn FnMut(&PhysicalDevice, &PhysicalDevice) -> Ordering + Send>,

    /// Configure command queues
    ///
    /// The first queue that is returned must support compute operations.
    /// Returning no queue at all makes context setup fail.
    ///
    /// By default, a single queue is allocated from the first queue family
    /// with compute support.
    pub queues:
        Box<dyn FnOnce(&PhysicalDevice) -> (Vec<QueueCreateInfo>, Vec<Cow<'static, str>>) + Send>,
}
//
impl Default for VulkanConfig {
    /// Suggested defaults for all configuration items
    ///
    /// You can use struct update syntax to change only some settings, keeping
    /// the others to their default values:
    ///
    /// ```
    /// # use compute::VulkanConfig;
    /// let config = VulkanConfig {
    ///     enumerate_portability: true,
    ///     .. VulkanConfig::default()
    /// };
    /// ```
    fn default() -> Self {
        defaults::config()
    }
}
//
impl VulkanConfig {
    /// Default configuration, except that missing layers are skipped instead
    /// of failing context setup
    ///
    /// Meant for automated tests, which should still exercise the device on
    /// hosts where the validation layer is not installed.
    pub fn with_available_layers() -> Self {
        Self {
            layers: Box::new(defaults::available_layers),
            ..Self::default()
        }
    }

    /// Set up a Vulkan compute context with this configuration
    ///
    /// Objects are created in the following order: instance, debug messenger
    /// (if enabled), logical device and queues.
    pub fn build(mut self) -> ContextBuildResult<VulkanContext> {
        let library = library::load()?;

        let layers = (self.layers)(&library);
        library::check_layers(&library, &layers)?;
        let instance_extensions = instance::select_extensions(
            &library,
            (self.instance_extensions)(&library),
            self.enumerate_portability,
        );
        let instance = DebuggedInstance::new(
            library,
            layers,
            instance_extensions,
            self.enumerate_portability,
        )?;

        let physical_device = device::select_physical(
            &instance,
            &mut self.device_features_extensions,
            self.other_device_requirements,
            self.device_preference,
        )?;

        let (features, extensions) = (self.device_features_extensions)(&physical_device);
        let (device, queues) = device::create_logical(
            physical_device.clone(),
            features,
            extensions,
            (self.queues)(&physical_device),
        )?;

        Ok(VulkanContext {
            _messenger: instance.messenger,
            device,
            queues,
        })
    }
}
