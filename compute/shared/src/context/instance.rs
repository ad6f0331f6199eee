//! Vulkan instance

use super::ContextBuildResult;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{ops::Deref, sync::Arc};
use vulkano::{
    instance::{
        debug::{
            DebugUtilsMessageSeverity, DebugUtilsMessageType, DebugUtilsMessenger,
            DebugUtilsMessengerCallback, DebugUtilsMessengerCallbackData,
            DebugUtilsMessengerCreateInfo,
        },
        Instance, InstanceCreateFlags, InstanceCreateInfo, InstanceExtensions,
    },
    VulkanLibrary,
};

/// Adjust the instance extensions requested by the configuration
///
/// Debug utils are forced on when object naming is enabled, and portability
/// enumeration is enabled whenever portability devices are requested.
pub fn select_extensions(
    library: &VulkanLibrary,
    mut extensions: InstanceExtensions,
    enumerate_portability: bool,
) -> InstanceExtensions {
    let supported = library.supported_extensions();
    if cfg!(feature = "gpu-debug-utils") {
        extensions.ext_debug_utils = true;
    }
    if enumerate_portability && supported.khr_portability_enumeration {
        extensions.khr_portability_enumeration = true;
    }
    extensions
}

/// Vulkan instance with debug logging
///
/// Logging will stop once this struct is dropped, even if there are
/// other Arc<Instance> remaining in flight
pub struct DebuggedInstance {
    /// Vulkan instance
    instance: Arc<Instance>,

    /// Messenger that logs instance debug messages
    pub(super) messenger: Option<DebugUtilsMessenger>,
}
//
impl DebuggedInstance {
    /// Set up a Vulkan instance
    ///
    /// A debug messenger is attached if and only if the `ext_debug_utils`
    /// extension is enabled, which the default configuration only does in
    /// debug builds.
    ///
    /// If you set `enumerate_portability` to `true` here, you will be able to
    /// use devices that do not fully conform to the Vulkan specification, like
    /// MoltenVK on macOS.
    pub fn new(
        library: Arc<VulkanLibrary>,
        enabled_layers: Vec<String>,
        enabled_extensions: InstanceExtensions,
        enumerate_portability: bool,
    ) -> ContextBuildResult<DebuggedInstance> {
        let unsupported_extensions = *library.supported_extensions()
            - library
                .supported_extensions_with_layers(enabled_layers.iter().map(String::as_ref))?;
        if unsupported_extensions != InstanceExtensions::empty() {
            debug!(
                "Selected layer(s) {enabled_layers:?} do NOT support extensions {unsupported_extensions:#?}"
            );
        }

        let messenger_info = enabled_extensions
            .ext_debug_utils
            .then(messenger_create_info);

        let mut flags = InstanceCreateFlags::default();
        if enumerate_portability {
            flags |= InstanceCreateFlags::ENUMERATE_PORTABILITY;
        }
        let create_info = InstanceCreateInfo {
            flags,
            enabled_extensions,
            enabled_layers,
            debug_utils_messengers: messenger_info.clone().into_iter().collect(),
            ..InstanceCreateInfo::application_from_cargo_toml()
        };
        info!("Will now create a Vulkan instance with {create_info:#?}");
        let instance = Instance::new(library, create_info)?;
        trace!(
            "Vulkan instance supports Vulkan v{}",
            instance.api_version()
        );

        let messenger = messenger_info
            .map(|info| DebugUtilsMessenger::new(instance.clone(), info))
            .transpose()?;
        Ok(Self {
            instance,
            messenger,
        })
    }
}
//
impl Deref for DebuggedInstance {
    type Target = Arc<Instance>;

    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

/// Configure a debug messenger that forwards Vulkan messages to [`log`]
fn messenger_create_info() -> DebugUtilsMessengerCreateInfo {
    let mut message_type = DebugUtilsMessageType::GENERAL;
    if cfg!(debug_assertions) {
        message_type |= DebugUtilsMessageType::VALIDATION | DebugUtilsMessageType::PERFORMANCE;
    }
    let info = DebugUtilsMessengerCreateInfo {
        message_severity: statically_enabled_severities(),
        message_type,
        // SAFETY: The callback only logs, it does not call into Vulkan
        ..DebugUtilsMessengerCreateInfo::user_callback(unsafe {
            DebugUtilsMessengerCallback::new(|severity, ty, data| log_message(severity, ty, data))
        })
    };
    info!("Setting up debug utils with {info:#?}");
    info
}

/// Log level associated with a Vulkan message severity
fn level(severity: DebugUtilsMessageSeverity) -> log::Level {
    match severity {
        DebugUtilsMessageSeverity::ERROR => log::Level::Error,
        DebugUtilsMessageSeverity::WARNING => log::Level::Warn,
        DebugUtilsMessageSeverity::INFO => log::Level::Debug,
        DebugUtilsMessageSeverity::VERBOSE => log::Level::Trace,
        _ => log::Level::Info,
    }
}

/// Message severities that can reach the log given its compile-time filter
fn statically_enabled_severities() -> DebugUtilsMessageSeverity {
    [
        DebugUtilsMessageSeverity::ERROR,
        DebugUtilsMessageSeverity::WARNING,
        DebugUtilsMessageSeverity::INFO,
        DebugUtilsMessageSeverity::VERBOSE,
    ]
    .into_iter()
    .filter(|&severity| log::STATIC_MAX_LEVEL >= level(severity))
    .fold(DebugUtilsMessageSeverity::empty(), |acc, severity| {
        acc | severity
    })
}

/// Forward one Vulkan debug message to the log
fn log_message(
    severity: DebugUtilsMessageSeverity,
    ty: DebugUtilsMessageType,
    data: DebugUtilsMessengerCallbackData<'_>,
) {
    let level = level(severity);
    if level > log::max_level() {
        return;
    }
    let target = match data.message_id_name {
        Some(id_name) => format!("Vulkan {ty:?} {id_name}"),
        None => format!("Vulkan {ty:?}"),
    };
    let objects = data
        .objects
        .map(|obj| match obj.object_name {
            Some(name) => format!("{:?} #{} named \"{name}\"", obj.object_type, obj.object_handle),
            None => format!("{:?} #{}", obj.object_type, obj.object_handle),
        })
        .collect::<Vec<_>>();
    log!(
        target: &target,
        level,
        "{} (id: {}, objects: {:?})",
        data.message,
        data.message_id_number,
        objects,
    );
}
