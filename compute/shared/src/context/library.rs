//! Vulkan library loading

use super::{ContextBuildError, ContextBuildResult};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{collections::HashSet, sync::Arc};
use vulkano::VulkanLibrary;

/// Load the Vulkan library
pub fn load() -> ContextBuildResult<Arc<VulkanLibrary>> {
    let library = VulkanLibrary::new()?;
    info!("Loaded Vulkan library");
    trace!("- Supports Vulkan v{}", library.api_version());
    trace!(
        "- Supports instance extensions {}",
        super::format_extension_properties(library.extension_properties())
    );
    trace!(
        "- Supports layers {:#?}",
        library
            .layer_properties()?
            .map(|layer| {
                format!(
                    "{} v{} for Vulkan >= {}",
                    layer.name(),
                    layer.implementation_version(),
                    layer.vulkan_version()
                )
            })
            .collect::<Vec<_>>()
    );
    Ok(library)
}

/// Check that every requested layer is provided by the Vulkan library
///
/// Instance creation would fail anyway if a layer were missing, but with an
/// error that does not tell which layer is at fault.
pub fn check_layers(library: &VulkanLibrary, requested: &[String]) -> ContextBuildResult<()> {
    let available = library
        .layer_properties()?
        .map(|layer| layer.name().to_owned())
        .collect::<HashSet<_>>();
    let missing = requested
        .iter()
        .filter(|layer| !available.contains(layer.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        debug!("All requested layers {requested:?} are available");
        Ok(())
    } else {
        error!("Requested layers {missing:?} are not available");
        Err(ContextBuildError::MissingLayers(missing))
    }
}
