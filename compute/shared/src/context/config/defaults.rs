//! Default Vulkan context configuration

use super::VulkanConfig;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{borrow::Cow, cmp::Ordering, env::VarError};
use vulkano::{
    device::{
        physical::{PhysicalDevice, PhysicalDeviceType},
        DeviceExtensions, Features, QueueCreateInfo, QueueFlags,
    },
    instance::InstanceExtensions,
    VulkanLibrary,
};

/// Environment variable used to favor one type of device
const PREFER_DEVICE_VAR: &str = "VKSKELETON_PREFER_DEVICE";

/// Suggested VulkanConfig
pub fn config() -> VulkanConfig {
    VulkanConfig {
        layers: Box::new(layers),
        instance_extensions: Box::new(instance_extensions),
        enumerate_portability: cfg!(target_os = "macos"),
        device_features_extensions: Box::new(device_features_extensions),
        other_device_requirements: Box::new(other_device_requirements),
        device_preference: Box::new(device_preference),
        queues: Box::new(queues),
    }
}

/// Suggested set of instance layers
#[allow(unused_variables)]
pub fn layers(library: &VulkanLibrary) -> Vec<String> {
    if cfg!(debug_assertions) {
        vec!["VK_LAYER_KHRONOS_validation".to_owned()]
    } else {
        vec![]
    }
}

/// Suggested set of instance layers, minus those that the library lacks
pub fn available_layers(library: &VulkanLibrary) -> Vec<String> {
    let mut requested = layers(library);
    match library.layer_properties() {
        Ok(available) => {
            let available = available
                .map(|layer| layer.name().to_owned())
                .collect::<Vec<_>>();
            requested.retain(|layer| {
                let found = available.contains(layer);
                if !found {
                    warn!("Layer {layer} is not available, running without it");
                }
                found
            });
            requested
        }
        Err(e) => {
            warn!("Could not list Vulkan layers, running without any ({e})");
            Vec::new()
        }
    }
}

/// Suggested set of instance extensions
pub fn instance_extensions(library: &VulkanLibrary) -> InstanceExtensions {
    InstanceExtensions {
        ext_debug_utils: cfg!(debug_assertions) && library.supported_extensions().ext_debug_utils,
        ..Default::default()
    }
}

/// Suggested device features and extensions
pub fn device_features_extensions(device: &PhysicalDevice) -> (Features, DeviceExtensions) {
    let features = Features {
        shader_storage_image_write_without_format: true,
        ..Features::empty()
    };
    let mut extensions = DeviceExtensions::empty();
    if device.supported_extensions().khr_portability_subset {
        extensions.khr_portability_subset = true;
    }
    (features, extensions)
}

/// Suggested other device requirements
#[allow(unused_variables)]
pub fn other_device_requirements(device: &PhysicalDevice) -> bool {
    true
}

/// Suggested device preference
///
/// Keeps enumeration order unless a preferred device type was requested.
pub fn device_preference(device1: &PhysicalDevice, device2: &PhysicalDevice) -> Ordering {
    let Some(preferred) = preferred_device_type() else {
        return Ordering::Equal;
    };
    let is_preferred = |device: &PhysicalDevice| device.properties().device_type == preferred;
    is_preferred(device1).cmp(&is_preferred(device2))
}

/// Device type requested through the environment, if any
fn preferred_device_type() -> Option<PhysicalDeviceType> {
    match std::env::var(PREFER_DEVICE_VAR) {
        Ok(string) => parse_device_type(&string),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(s)) => {
            warn!("Ignoring non-unicode {PREFER_DEVICE_VAR} value {s:?}");
            None
        }
    }
}

/// Translate a device type name into a device type
fn parse_device_type(name: &str) -> Option<PhysicalDeviceType> {
    match name {
        "" => None,
        "discrete" => Some(PhysicalDeviceType::DiscreteGpu),
        "integrated" => Some(PhysicalDeviceType::IntegratedGpu),
        "virtual" => Some(PhysicalDeviceType::VirtualGpu),
        "cpu" => Some(PhysicalDeviceType::Cpu),
        "other" => Some(PhysicalDeviceType::Other),
        unknown => {
            warn!("Ignoring unknown device type {unknown:?} in {PREFER_DEVICE_VAR}");
            None
        }
    }
}

/// Suggested single-queue creation info
///
/// Picks one queue in the first queue family with compute support.
pub fn queues(device: &PhysicalDevice) -> (Vec<QueueCreateInfo>, Vec<Cow<'static, str>>) {
    let compute_family = device
        .queue_family_properties()
        .iter()
        .position(|family| family.queue_flags.contains(QueueFlags::COMPUTE));
    match compute_family {
        Some(idx) => (
            vec![QueueCreateInfo {
                queue_family_index: idx as u32,
                ..Default::default()
            }],
            vec!["Compute queue".into()],
        ),
        None => (Vec::new(), Vec::new()),
    }
}
