//! Conversion between host frames and staging buffers
//!
//! Staging buffers hold tightly packed rows of RGBA pixels, while host frames
//! hold padded rows of ARGB pixels. Channels are moved as opaque groups of
//! bytes, so the same code handles every channel width.

use crate::host::HostFrame;

/// Copy a host frame into a staging buffer
///
/// The staging buffer must hold exactly one frame worth of pixels.
pub fn copy_to_staging(frame: &HostFrame<impl AsRef<[u8]>>, staging: &mut [u8]) {
    let channel = frame.format().bytes_per_channel();
    let row_size = frame.width() as usize * frame.format().bytes_per_pixel();
    debug_assert_eq!(staging.len(), row_size * frame.height() as usize);
    if row_size == 0 {
        return;
    }
    for (y, staging_row) in (0..frame.height()).zip(staging.chunks_exact_mut(row_size)) {
        staging_row.copy_from_slice(frame.row(y));
        for pixel in staging_row.chunks_exact_mut(4 * channel) {
            // ARGB -> RGBA
            pixel.rotate_left(channel);
        }
    }
}

/// Copy a staging buffer into a host frame
///
/// The staging buffer must hold exactly one frame worth of pixels.
pub fn copy_from_staging(staging: &[u8], frame: &mut HostFrame<impl AsRef<[u8]> + AsMut<[u8]>>) {
    let channel = frame.format().bytes_per_channel();
    let row_size = frame.width() as usize * frame.format().bytes_per_pixel();
    debug_assert_eq!(staging.len(), row_size * frame.height() as usize);
    if row_size == 0 {
        return;
    }
    for (y, staging_row) in (0..frame.height()).zip(staging.chunks_exact(row_size)) {
        let frame_row = frame.row_mut(y);
        frame_row.copy_from_slice(staging_row);
        for pixel in frame_row.chunks_exact_mut(4 * channel) {
            // RGBA -> ARGB
            pixel.rotate_right(channel);
        }
    }
}
