//! Device-facing half of the compute engine

use crate::{layout::Command, ImageInfo, Result, UniformParameters};

/// Device resources driven by the [`ComputeEngine`](crate::ComputeEngine)
///
/// A backend owns the resources that live as long as the engine (device,
/// kernel, command pool, uniform buffer...) and knows how to build the
/// resources that depend on the frame shape. The engine decides when to
/// build frame resources, in which order commands are submitted, and keeps
/// track of image layouts.
///
/// Every method is called with the engine lock held, so implementations do
/// not need to synchronize anything themselves.
pub trait Backend {
    /// Resources whose size or format depends on the frame shape
    ///
    /// They are created together by [`create_frame()`](Self::create_frame)
    /// and released together when dropped.
    type Frame;

    /// Check that frames of a given shape can be processed at all
    ///
    /// Called before the resources of the previous frame shape are released,
    /// so that an unsupported frame leaves them untouched.
    fn check_frame(&self, _info: &ImageInfo) -> Result<()> {
        Ok(())
    }

    /// Create the resources for frames of a given shape
    ///
    /// Images are expected to start in the undefined layout.
    fn create_frame(&mut self, info: &ImageInfo) -> Result<Self::Frame>;

    /// Point the kernel's bindings to the resources of `frame` and to the
    /// uniform buffer, overwriting every binding
    fn update_descriptor_set(&mut self, frame: &mut Self::Frame) -> Result<()>;

    /// Copy the kernel parameters into the uniform buffer
    fn write_uniforms(&mut self, params: &UniformParameters) -> Result<()>;

    /// Expose the input staging buffer to `write`
    ///
    /// The slice covers exactly the frame's byte size and is only valid for
    /// the duration of the callback.
    fn write_input(&mut self, frame: &mut Self::Frame, write: impl FnOnce(&mut [u8]))
        -> Result<()>;

    /// Expose the output staging buffer to `read`
    ///
    /// The slice covers exactly the frame's byte size and is only valid for
    /// the duration of the callback.
    fn read_output(&mut self, frame: &mut Self::Frame, read: impl FnOnce(&[u8])) -> Result<()>;

    /// Record `command` into a fresh command buffer, submit it, and block
    /// until the device has finished executing it
    fn submit(&mut self, frame: &mut Self::Frame, command: Command) -> Result<()>;
}
