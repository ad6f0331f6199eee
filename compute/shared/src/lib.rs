//! Vulkan device context shared by the compute engine and its tests

#![allow(clippy::result_large_err)]

pub mod context;

pub use self::context::{config::VulkanConfig, ContextBuildError, ContextBuildResult, VulkanContext};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| env_logger::init());
    }

    #[test]
    fn setup_vulkan() -> ContextBuildResult<()> {
        init_logger();
        let context = match VulkanConfig::with_available_layers().build() {
            Ok(context) => context,
            Err(e) if e.means_no_vulkan() => {
                log::warn!("Skipping Vulkan context test: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let family = context.compute_queue().queue_family_index() as usize;
        let families = context.physical_device().queue_family_properties();
        assert!(families[family]
            .queue_flags
            .contains(vulkano::device::QueueFlags::COMPUTE));
        Ok(())
    }

    #[test]
    fn missing_layers_are_not_skipped() {
        assert!(ContextBuildError::NoMatchingDevice.means_no_vulkan());
        assert!(!ContextBuildError::NoComputeQueue.means_no_vulkan());
        let missing = ContextBuildError::MissingLayers(vec!["VK_LAYER_KHRONOS_validation".to_owned()]);
        assert!(!missing.means_no_vulkan());
    }
}
