//! Per-dispatch parameters

#[cfg(feature = "gpu-parameters")]
use crevice::std140::AsStd140;

/// Scalar parameters that the compute kernel reads from its uniform buffer
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "gpu-parameters", derive(AsStd140))]
pub struct UniformParameters {
    /// Blend factor between the input and its inverse
    pub pivot: f32,
}

/// GPU-readable version of the parameters
#[cfg(feature = "gpu-parameters")]
pub type GpuUniformParameters = <UniformParameters as AsStd140>::Output;

#[cfg(feature = "gpu-parameters")]
impl UniformParameters {
    /// Size of the uniform buffer that holds these parameters
    pub const GPU_SIZE: usize = std::mem::size_of::<GpuUniformParameters>();

    /// Version of the parameters to be copied into the uniform buffer
    pub fn to_gpu(self) -> GpuUniformParameters {
        self.as_std140()
    }
}
