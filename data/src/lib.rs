//! Data formats shared by the GPU image filter and its hosts

pub mod image;
pub mod parameters;

pub use self::{
    image::{ImageInfo, ImageInfoError, PixelFormat},
    parameters::UniformParameters,
};
