//! Device management

use super::{ContextBuildError, ContextBuildResult};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{borrow::Cow, cmp::Ordering, sync::Arc};
use vulkano::{
    device::{
        physical::PhysicalDevice, Device, DeviceCreateInfo, DeviceExtensions, Features, Queue,
        QueueCreateInfo, QueueFlags,
    },
    instance::{Instance, Version},
};

/// Pick the physical device that the engine will run on
///
/// A device is usable if it has at least one queue family with compute
/// support, supports every feature and extension returned by the
/// `features_extensions` callback, and passes the `other_requirements` check.
///
/// Among usable devices, the `preference` callback decides. If several
/// devices compare equal, the first one in enumeration order is selected, so
/// a preference that always returns `Ordering::Equal` yields first-fit
/// selection.
pub fn select_physical(
    instance: &Arc<Instance>,
    mut features_extensions: impl FnMut(&PhysicalDevice) -> (Features, DeviceExtensions),
    mut other_requirements: impl FnMut(&PhysicalDevice) -> bool,
    mut preference: impl FnMut(&PhysicalDevice, &PhysicalDevice) -> Ordering,
) -> ContextBuildResult<Arc<PhysicalDevice>> {
    let selected_device = instance
        .enumerate_physical_devices()?
        .filter(|device| {
            info!("Found physical device {}", device.properties().device_name);
            log_description(device);

            let (features, extensions) = (features_extensions)(device);
            let can_use = has_compute_queue(device)
                && device.supported_features().contains(&features)
                && device.supported_extensions().contains(&extensions)
                && (other_requirements)(device);

            if can_use {
                info!("=> Device meets requirements");
            } else {
                info!("=> Device does NOT meet requirements");
            }
            can_use
        })
        // Using minimum ensures we pick the first device given equal preference
        .min_by(|a, b| preference(a, b).reverse());
    if let Some(device) = selected_device {
        info!("Selected device {}", device.properties().device_name);
        Ok(device)
    } else {
        Err(ContextBuildError::NoMatchingDevice)
    }
}

/// Truth that a device has a queue family that can run compute work
pub fn has_compute_queue(device: &PhysicalDevice) -> bool {
    device
        .queue_family_properties()
        .iter()
        .any(|family| family.queue_flags.contains(QueueFlags::COMPUTE))
}

/// Log a description of the device at higher log levels
fn log_description(device: &PhysicalDevice) {
    trace!("- With {:#?}", device.properties());
    trace!(
        "- With device extensions {}",
        super::format_extension_properties(device.extension_properties())
    );
    trace!("- With features {:#?}", device.supported_features());
    trace!("- With {:#?}", device.memory_properties());
    trace!(
        "- With queue families {:#?}",
        device.queue_family_properties()
    );
    if device.api_version() >= Version::V1_3 || device.supported_extensions().ext_tooling_info {
        if let Ok(tools) = device.tool_properties() {
            trace!("- With tools {tools:#?}");
        }
    }
}

/// Create a logical device and associated command queues
///
/// This is the point where optional core Vulkan features and extensions are
/// enabled, and where the desired queue configuration is specified.
pub fn create_logical(
    physical_device: Arc<PhysicalDevice>,
    enabled_features: Features,
    enabled_extensions: DeviceExtensions,
    (queue_create_infos, queue_names): (Vec<QueueCreateInfo>, Vec<Cow<'static, str>>),
) -> ContextBuildResult<(Arc<Device>, Box<[Arc<Queue>]>)> {
    if queue_create_infos.is_empty() {
        return Err(ContextBuildError::NoComputeQueue);
    }
    let create_info = DeviceCreateInfo {
        enabled_features,
        enabled_extensions,
        queue_create_infos,
        ..Default::default()
    };
    info!("Will now create a logical device with {create_info:#?}");
    let (device, queues) = Device::new(physical_device, create_info)?;

    // Do not rename device (its default name is very good), but do name queues
    let queues = queues.collect::<Box<[_]>>();
    if cfg!(feature = "gpu-debug-utils") {
        for (queue, name) in queues.iter().zip(queue_names) {
            device.set_debug_utils_object_name(queue, Some(name.as_ref()))?;
        }
    }
    Ok((device, queues))
}
