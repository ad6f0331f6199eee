//! Frames as the host hands them over

use data::PixelFormat;
use thiserror::Error;

/// Pixel format of a host frame
///
/// Host pixels store their channels in alpha, red, green, blue order.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum HostPixelFormat {
    /// 8-bit unsigned integer channels
    Argb32,

    /// 16-bit unsigned integer channels
    Argb64,

    /// 32-bit floating-point channels
    Argb128,
}
//
impl HostPixelFormat {
    /// Pick the host format with a given channel depth
    pub fn from_bits_per_channel(bits: u32) -> Result<Self, FrameError> {
        match bits {
            8 => Ok(Self::Argb32),
            16 => Ok(Self::Argb64),
            32 => Ok(Self::Argb128),
            _ => Err(FrameError::UnsupportedDepth(bits)),
        }
    }

    /// Size of one channel in bytes
    pub fn bytes_per_channel(self) -> usize {
        PixelFormat::from(self).bytes_per_channel()
    }

    /// Size of one pixel in bytes
    pub fn bytes_per_pixel(self) -> usize {
        PixelFormat::from(self).bytes_per_pixel()
    }
}
//
impl From<HostPixelFormat> for PixelFormat {
    fn from(format: HostPixelFormat) -> Self {
        match format {
            HostPixelFormat::Argb32 => Self::Rgba8,
            HostPixelFormat::Argb64 => Self::Rgba16,
            HostPixelFormat::Argb128 => Self::Rgba32Float,
        }
    }
}
//
impl From<PixelFormat> for HostPixelFormat {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Rgba8 => Self::Argb32,
            PixelFormat::Rgba16 => Self::Argb64,
            PixelFormat::Rgba32Float => Self::Argb128,
        }
    }
}

/// Frame stored in host memory
///
/// Rows are `row_bytes` apart, which may be more than the size of a row of
/// pixels. Bytes between the end of a row and the start of the next one are
/// never read or written.
#[derive(Clone, Debug)]
pub struct HostFrame<Data> {
    width: u32,
    height: u32,
    row_bytes: usize,
    format: HostPixelFormat,
    data: Data,
}
//
impl<Data: AsRef<[u8]>> HostFrame<Data> {
    /// Wrap host pixel data, checking that it is large enough
    pub fn new(
        width: u32,
        height: u32,
        row_bytes: usize,
        format: HostPixelFormat,
        data: Data,
    ) -> Result<Self, FrameError> {
        let pixel_bytes = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(FrameError::TooLarge)?;
        if row_bytes < pixel_bytes {
            return Err(FrameError::RowTooShort {
                row_bytes,
                pixel_bytes,
            });
        }
        let needed = match height {
            0 => 0,
            h => (h as usize - 1)
                .checked_mul(row_bytes)
                .and_then(|rows| rows.checked_add(pixel_bytes))
                .ok_or(FrameError::TooLarge)?,
        };
        let actual = data.as_ref().len();
        if actual < needed {
            return Err(FrameError::DataTooShort { needed, actual });
        }
        Ok(Self {
            width,
            height,
            row_bytes,
            format,
            data,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Distance between the start of two consecutive rows in bytes
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    /// Pixel format
    pub fn format(&self) -> HostPixelFormat {
        self.format
    }

    /// Width, height and pixel format
    pub fn shape(&self) -> (u32, u32, HostPixelFormat) {
        (self.width, self.height, self.format)
    }

    /// Raw pixel data, including row padding
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Pixels of row `y`, without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.row_bytes;
        &self.data()[start..start + self.pixel_bytes()]
    }

    /// Give back the pixel data
    pub fn into_data(self) -> Data {
        self.data
    }

    /// Size of a row of pixels in bytes
    fn pixel_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }
}
//
impl<Data: AsRef<[u8]> + AsMut<[u8]>> HostFrame<Data> {
    /// Raw pixel data, including row padding
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Pixels of row `y`, without padding
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.row_bytes;
        let len = self.pixel_bytes();
        &mut self.data_mut()[start..start + len]
    }
}

/// Reasons why host pixel data cannot be used
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FrameError {
    #[error("{0}-bit channels are not supported")]
    UnsupportedDepth(u32),

    #[error("rows are {row_bytes} bytes apart, but hold {pixel_bytes} bytes of pixels")]
    RowTooShort { row_bytes: usize, pixel_bytes: usize },

    #[error("frame needs {needed} bytes of data, but only {actual} were provided")]
    DataTooShort { needed: usize, actual: usize },

    #[error("frame does not fit in the address space")]
    TooLarge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_mapping() {
        for format in PixelFormat::ALL {
            let host = HostPixelFormat::from(format);
            assert_eq!(PixelFormat::from(host), format);
            assert_eq!(host.bytes_per_pixel(), format.bytes_per_pixel());
        }
        for (bits, host) in [
            (8, HostPixelFormat::Argb32),
            (16, HostPixelFormat::Argb64),
            (32, HostPixelFormat::Argb128),
        ] {
            assert_eq!(HostPixelFormat::from_bits_per_channel(bits), Ok(host));
            assert_eq!(host.bytes_per_channel() * 8, bits as usize);
        }
        assert_eq!(
            HostPixelFormat::from_bits_per_channel(12),
            Err(FrameError::UnsupportedDepth(12))
        );
    }

    #[test]
    fn frame_validation() {
        let format = HostPixelFormat::Argb64;
        assert!(HostFrame::new(4, 3, 32, format, [0u8; 96]).is_ok());
        // Last row does not need padding
        assert!(HostFrame::new(4, 3, 40, format, [0u8; 112]).is_ok());
        assert_eq!(
            HostFrame::new(4, 3, 40, format, [0u8; 111]).unwrap_err(),
            FrameError::DataTooShort {
                needed: 112,
                actual: 111
            }
        );
        assert_eq!(
            HostFrame::new(4, 3, 31, format, [0u8; 96]).unwrap_err(),
            FrameError::RowTooShort {
                row_bytes: 31,
                pixel_bytes: 32
            }
        );
        assert!(HostFrame::new(0, 0, 0, format, [0u8; 0]).is_ok());
    }

    #[test]
    fn rows_skip_padding() {
        let data = (0..30).collect::<Vec<u8>>();
        let mut frame = HostFrame::new(2, 3, 10, HostPixelFormat::Argb32, data).unwrap();
        assert_eq!(frame.row(1), &(10..18).collect::<Vec<u8>>()[..]);
        frame.row_mut(2).fill(0);
        assert_eq!(&frame.data()[18..20], &[18, 19]);
        assert!(frame.data()[20..28].iter().all(|&byte| byte == 0));
        assert_eq!(frame.into_data()[28..], [28, 29]);
    }
}
