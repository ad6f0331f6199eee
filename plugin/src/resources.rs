//! Location of the plugin's bundled files

use std::path::{Path, PathBuf};

/// Compute kernels bundled with the plugin
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kernel {
    /// The plugin's effect: blend colors with their negative
    Invert,

    /// Copy input pixels to the output unchanged
    PassThrough,

    /// Fill the output with the pivot parameter
    PivotProbe,
}
//
impl Kernel {
    /// Base name of the kernel's files
    pub fn name(self) -> &'static str {
        match self {
            Self::Invert => "invert",
            Self::PassThrough => "passthrough",
            Self::PivotProbe => "pivot_probe",
        }
    }
}

/// Path to the compiled binary of a kernel within a resource directory
pub fn shader_path(resource_dir: &Path, kernel: Kernel) -> PathBuf {
    resource_dir
        .join("shaders")
        .join(kernel.name())
        .with_extension("spv")
}

/// Resource directory filled by the build script
///
/// Useful when running from the build tree. Installed plugins should use
/// the resource directory that the host points them to.
pub fn bundled_resource_dir() -> &'static Path {
    Path::new(env!("OUT_DIR"))
}
