//! Frame shape and pixel formats

use std::fmt;
use thiserror::Error;

/// Pixel storage format of a frame
///
/// All formats have four channels, stored in RGBA order on the device side.
/// They only differ by the width of each channel.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum PixelFormat {
    /// 8-bit normalized unsigned integer channels
    Rgba8,

    /// 16-bit normalized unsigned integer channels
    Rgba16,

    /// 32-bit floating-point channels
    Rgba32Float,
}
//
impl PixelFormat {
    /// Every supported pixel format
    pub const ALL: [Self; 3] = [Self::Rgba8, Self::Rgba16, Self::Rgba32Float];

    /// Number of channels per pixel
    pub const CHANNELS: usize = 4;

    /// Size of one channel in bytes
    #[inline]
    pub const fn bytes_per_channel(self) -> usize {
        match self {
            Self::Rgba8 => 1,
            Self::Rgba16 => 2,
            Self::Rgba32Float => 4,
        }
    }

    /// Size of one pixel in bytes
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        Self::CHANNELS * self.bytes_per_channel()
    }
}
//
impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgba8 => "RGBA 8-bit",
            Self::Rgba16 => "RGBA 16-bit",
            Self::Rgba32Float => "RGBA 32-bit float",
        };
        f.write_str(name)
    }
}

/// Shape of a frame
///
/// Two frames with equal `ImageInfo` can be processed by the same set of GPU
/// resources. Any difference, however small, requires new resources.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ImageInfo {
    width: u32,
    height: u32,
    format: PixelFormat,
}
//
impl ImageInfo {
    /// Describe a frame, checking that it is not empty and that its byte
    /// size can be represented on the host
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, ImageInfoError> {
        if width == 0 || height == 0 {
            return Err(ImageInfoError::Empty { width, height });
        }
        let info = Self {
            width,
            height,
            format,
        };
        info.checked_byte_size()
            .ok_or(ImageInfoError::TooLarge { width, height, format })?;
        Ok(info)
    }

    /// Frame width in pixels
    #[inline]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    #[inline]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format
    #[inline]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Number of pixels in the frame
    #[inline]
    pub const fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one tightly packed row of pixels in bytes
    #[inline]
    pub const fn row_size(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Size of the tightly packed frame in bytes
    #[inline]
    pub fn byte_size(&self) -> usize {
        // Checked at construction time
        self.pixels() * self.format.bytes_per_pixel()
    }

    /// Image extent in Vulkan's [width, height, depth] layout
    #[inline]
    pub const fn extent(&self) -> [u32; 3] {
        [self.width, self.height, 1]
    }

    /// Compute dispatch size, when each work-group processes one pixel
    #[inline]
    pub const fn dispatch_size(&self) -> [u32; 3] {
        self.extent()
    }

    fn checked_byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.bytes_per_pixel())
    }
}
//
impl fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// Errors that can occur while describing a frame
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ImageInfoError {
    #[error("frames must contain at least one pixel (got {width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("a {width}x{height} {format} frame does not fit in host memory")]
    TooLarge {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}
