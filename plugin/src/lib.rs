//! Image filter plugin driven by a compositing host
//!
//! The host talks to the plugin through three entry points, mirroring the
//! plugin's lifecycle:
//!
//! - [`Plugin::global_setup()`] builds the compute engine once, from the
//!   kernel found in the plugin's resource directory.
//! - [`Plugin::render()`] filters one host frame into another, using the
//!   current value of the plugin's only slider.
//! - [`Plugin::global_setdown()`] releases every GPU resource.
//!
//! Host frames store ARGB pixels with a row stride, while the GPU works on
//! tightly packed RGBA pixels. The [`pixels`] module converts between the two.

#![allow(clippy::result_large_err)]

pub mod host;
pub mod params;
pub mod pixels;
pub mod resources;

pub use self::{
    host::{HostFrame, HostPixelFormat},
    resources::Kernel,
};

use compute_engine::{Backend, ComputeEngine, EngineConfig, ImageInfo, VulkanBackend};
use data::ImageInfoError;
use log::LevelFilter;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::path::Path;
use syslog::Facility;
use thiserror::Error;

/// Image filter plugin instance
///
/// Holds the compute engine that every render goes through. Renders from
/// several host threads are serialized by the engine.
pub struct Plugin<B: Backend = VulkanBackend> {
    engine: ComputeEngine<B>,
}
//
impl Plugin {
    /// Set up the plugin with the kernel from a resource directory
    ///
    /// Installs the syslog logger first unless a logger is already active.
    pub fn global_setup(resource_dir: &Path) -> Result<Self> {
        init_syslog();
        Self::params_setup();
        Self::with_kernel(resource_dir, Kernel::Invert)
    }

    /// Register the plugin's sliders, after the input layer
    pub fn params_setup() {
        for (index, slider) in params::SLIDERS {
            info!("Registering slider {}", slider.describe(index));
        }
    }

    /// Set up the plugin with a specific bundled kernel
    pub fn with_kernel(resource_dir: &Path, kernel: Kernel) -> Result<Self> {
        let shader_path = resources::shader_path(resource_dir, kernel);
        info!("Setting up plugin with kernel {}", shader_path.display());
        Self::with_config(EngineConfig::new(shader_path))
    }

    /// Set up the plugin with a custom engine configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            engine: ComputeEngine::with_config(config)?,
        })
    }
}
//
impl<B: Backend> Plugin<B> {
    /// Wrap an existing compute engine
    pub fn with_engine(engine: ComputeEngine<B>) -> Self {
        Self { engine }
    }

    /// Filter `input` into `output`
    ///
    /// Both frames must have the same width, height and pixel format. The
    /// `slider` value is clamped into the slider's range.
    pub fn render<In, Out>(
        &self,
        input: &HostFrame<In>,
        output: &mut HostFrame<Out>,
        slider: f64,
    ) -> Result<()>
    where
        In: AsRef<[u8]>,
        Out: AsRef<[u8]> + AsMut<[u8]>,
    {
        if input.shape() != output.shape() {
            return Err(Error::ShapeMismatch {
                input: input.shape(),
                output: output.shape(),
            });
        }
        let info = ImageInfo::new(input.width(), input.height(), input.format().into())?;
        let params = params::uniform_parameters(slider);
        trace!("Rendering {info} frame with slider at {slider}");
        self.engine.process(
            &info,
            &params,
            |staging| pixels::copy_to_staging(input, staging),
            |staging| pixels::copy_from_staging(staging, output),
        )?;
        Ok(())
    }

    /// Release every GPU resource
    pub fn global_setdown(self) -> Result<()> {
        info!("Shutting down plugin");
        self.engine.tear_down()?;
        Ok(())
    }

    /// Compute engine that renders go through
    pub fn engine(&self) -> &ComputeEngine<B> {
        &self.engine
    }
}

/// Send logs to syslog, unless a logger is already installed
pub fn init_syslog() {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = syslog::init(Facility::default(), level, Some("vkskeleton")) {
        warn!("Keeping the existing logger, could not switch to syslog: {e}");
    }
}

/// Things that can go wrong while rendering through the plugin
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] compute_engine::Error),

    #[error("host frame is not valid ({0})")]
    Frame(#[from] host::FrameError),

    #[error("frame shape is not supported ({0})")]
    Shape(#[from] ImageInfoError),

    #[error("input frame is {input:?} but output frame is {output:?}")]
    ShapeMismatch {
        input: (u32, u32, HostPixelFormat),
        output: (u32, u32, HostPixelFormat),
    },
}

/// Result type associated with plugin operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use compute_engine::mock::{MockBackend, MockKernel, MockProbe};
    use std::sync::Once;

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| env_logger::init());
    }

    fn mock_plugin(kernel: MockKernel) -> (Plugin<MockBackend>, MockProbe) {
        init_logger();
        let (backend, probe) = MockBackend::new(kernel);
        (Plugin::with_engine(ComputeEngine::with_backend(backend)), probe)
    }

    fn frame(width: u32, height: u32, format: HostPixelFormat, padding: usize) -> HostFrame<Vec<u8>> {
        let row_bytes = width as usize * format.bytes_per_pixel() + padding;
        HostFrame::new(width, height, row_bytes, format, vec![0; row_bytes * height as usize]).unwrap()
    }

    #[test]
    fn renders_through_engine() -> Result<()> {
        let (plugin, probe) = mock_plugin(MockKernel::PassThrough);
        let mut input = frame(5, 3, HostPixelFormat::Argb32, 12);
        for (idx, byte) in input.data_mut().iter_mut().enumerate() {
            *byte = idx as u8;
        }
        let mut output = frame(5, 3, HostPixelFormat::Argb32, 4);
        plugin.render(&input, &mut output, 0.25)?;
        for y in 0..3 {
            assert_eq!(input.row(y), output.row(y));
        }
        assert_eq!(probe.frames_created(), 1);
        Ok(())
    }

    #[test]
    fn slider_reaches_kernel_clamped() -> Result<()> {
        let (plugin, _probe) = mock_plugin(MockKernel::PivotProbe);
        let input = frame(2, 2, HostPixelFormat::Argb128, 0);
        let mut output = frame(2, 2, HostPixelFormat::Argb128, 0);
        for (slider, expected) in [(0.75, 0.75f32), (3.0, 1.0), (-1.0, 0.0)] {
            plugin.render(&input, &mut output, slider)?;
            for word in output.data().chunks_exact(4) {
                assert_eq!(f32::from_ne_bytes(word.try_into().unwrap()), expected);
            }
        }
        Ok(())
    }

    #[test]
    fn rejects_mismatched_frames() {
        let (plugin, probe) = mock_plugin(MockKernel::PassThrough);
        let input = frame(4, 4, HostPixelFormat::Argb32, 0);
        let mut wrong_size = frame(4, 5, HostPixelFormat::Argb32, 0);
        let mut wrong_format = frame(4, 4, HostPixelFormat::Argb64, 0);
        assert!(matches!(
            plugin.render(&input, &mut wrong_size, 0.0),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            plugin.render(&input, &mut wrong_format, 0.0),
            Err(Error::ShapeMismatch { .. })
        ));
        assert_eq!(probe.frames_created(), 0);
        assert!(!plugin.engine().is_poisoned());
    }

    #[test]
    fn rejects_empty_frames() {
        let (plugin, probe) = mock_plugin(MockKernel::PassThrough);
        let input = frame(0, 4, HostPixelFormat::Argb32, 0);
        let mut output = frame(0, 4, HostPixelFormat::Argb32, 0);
        assert!(matches!(
            plugin.render(&input, &mut output, 0.0),
            Err(Error::Shape(ImageInfoError::Empty { .. }))
        ));
        assert_eq!(probe.frames_created(), 0);
    }

    #[test]
    fn setdown_releases_resources() -> Result<()> {
        let (plugin, probe) = mock_plugin(MockKernel::PassThrough);
        let input = frame(3, 3, HostPixelFormat::Argb64, 2);
        let mut output = frame(3, 3, HostPixelFormat::Argb64, 2);
        plugin.render(&input, &mut output, 0.5)?;
        assert_eq!(probe.frames_alive(), 1);
        plugin.global_setdown()?;
        assert_eq!(probe.frames_alive(), 0);
        Ok(())
    }
}
