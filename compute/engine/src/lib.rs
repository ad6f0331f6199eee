//! GPU compute engine that filters one frame at a time
//!
//! The [`ComputeEngine`] owns every device object needed to run a compute
//! kernel over a frame. On each [`ComputeEngine::process()`] call, it makes
//! sure that its frame-dependent resources match the incoming frame shape,
//! uploads the kernel parameters, lets the caller fill the input staging
//! buffer, runs the kernel, and lets the caller read back the output staging
//! buffer. Every device-side step is submitted on its own and waited for
//! before the next one starts.

#![allow(clippy::result_large_err)]

mod backend;
mod config;
mod engine;
pub mod layout;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod vulkan;

pub use self::{
    backend::Backend,
    config::{default_pipeline_cache_path, EngineConfig},
    engine::ComputeEngine,
    vulkan::VulkanBackend,
};
pub use compute::{ContextBuildError, VulkanConfig};
pub use data::{ImageInfo, PixelFormat, UniformParameters};

use self::layout::{ImageLayout, ImageRole};
use ash::vk;
use std::{io, path::PathBuf};
use thiserror::Error;
use vulkano::memory::MemoryPropertyFlags;

/// Broad classes of engine errors
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The engine could not be set up
    Setup,

    /// A device object could not be created or allocated
    Resource,

    /// Device work could not be recorded, submitted or waited for
    Submission,

    /// The engine was used in a state where it cannot do anything
    Unusable,
}

/// Things that can go wrong while setting up or running the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to set up the Vulkan context ({0})")]
    Context(#[from] ContextBuildError),

    #[error("failed to load compute shader from {} ({source})", .path.display())]
    ShaderFile {
        path: PathBuf,
        #[source]
        source: ShaderFileError,
    },

    #[error("no memory type provides {flags:?} for a {size}-byte allocation")]
    NoSuitableMemory {
        flags: MemoryPropertyFlags,
        size: u64,
    },

    #[error("{operation} failed ({result})")]
    Resource {
        operation: &'static str,
        result: vk::Result,
    },

    #[error("{info} frames are not supported by the device ({reason})")]
    UnsupportedFrame { info: ImageInfo, reason: String },

    #[error("{operation} failed while submitting device work ({result})")]
    Submission {
        operation: &'static str,
        result: vk::Result,
    },

    #[error("{image:?} image is in {actual:?} layout where {expected:?} is required")]
    Layout {
        image: ImageRole,
        expected: ImageLayout,
        actual: ImageLayout,
    },

    #[error("engine is unusable after a failed call ({0})")]
    Poisoned(String),

    #[error("engine has been torn down")]
    TornDown,
}
//
impl Error {
    /// Broad class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Context(_) | Self::ShaderFile { .. } => ErrorKind::Setup,
            Self::NoSuitableMemory { .. } | Self::Resource { .. } | Self::UnsupportedFrame { .. } => {
                ErrorKind::Resource
            }
            Self::Submission { .. } | Self::Layout { .. } => ErrorKind::Submission,
            Self::Poisoned(_) | Self::TornDown => ErrorKind::Unusable,
        }
    }

    /// Build a closure that turns a failed device object operation into an error
    pub(crate) fn resource(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Resource { operation, result }
    }

    /// Build a closure that turns a failed submission step into an error
    pub(crate) fn submission(operation: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Submission { operation, result }
    }
}

/// Reasons why a compute shader binary cannot be used
#[derive(Debug, Error)]
pub enum ShaderFileError {
    #[error("could not read the file")]
    Io(#[from] io::Error),

    #[error("the file is empty")]
    Empty,

    #[error("{0} bytes is not a whole number of 32-bit words")]
    Misaligned(usize),
}

/// Result type associated with compute engine operations
pub type Result<T> = std::result::Result<T, Error>;
