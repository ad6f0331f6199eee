use bytemuck::Pod;
use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use image::{DynamicImage, ImageBuffer, Pixel, Primitive, Rgba};
use indicatif::{ProgressBar, ProgressFinish, ProgressIterator, ProgressStyle};
use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::Duration,
};
use vkskeleton::{
    params::PIVOT_SLIDER, pixels, resources::bundled_resource_dir, HostFrame, HostPixelFormat,
    Plugin,
};

/// Apply the GPU filter plugin to a PNG image, the way a compositing host would
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input PNG image
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the output PNG image
    #[arg(short, long)]
    output: PathBuf,

    /// Value of the pivot slider, from 0 (unchanged) to 1 (negative)
    #[arg(short, long, default_value_t = PIVOT_SLIDER.default)]
    pivot: f64,

    /// Bits per channel of the frames handed to the plugin (8, 16 or 32)
    #[arg(short, long, default_value_t = 8)]
    bits: u32,

    /// Number of times the frame is rendered
    #[arg(short, long, default_value_t = NonZeroUsize::MIN)]
    repeat: NonZeroUsize,

    /// Plugin resource directory, containing the compiled kernels
    ///
    /// Defaults to the kernels that were built along with this program.
    #[arg(long)]
    resource_dir: Option<PathBuf>,
}
//
impl Args {
    /// Directory where the plugin should look for its kernels
    fn resource_dir(&self) -> &Path {
        match &self.resource_dir {
            Some(dir) => dir.as_path(),
            None => bundled_resource_dir(),
        }
    }
}

/// Hosts usually align rows of pixels, give the plugin the same treatment
const ROW_ALIGNMENT: usize = 64;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();
    let format = HostPixelFormat::from_bits_per_channel(args.bits)?;

    // Set up the plugin, this also enables logging to syslog
    let plugin =
        Plugin::global_setup(args.resource_dir()).wrap_err("failed to set up the plugin")?;

    // Load the input frame and allocate the output frame
    let input = load_frame(&args.input, format)?;
    let mut output = HostFrame::new(
        input.width(),
        input.height(),
        input.row_bytes(),
        format,
        vec![0u8; input.data().len()],
    )?;

    // Set up progress reporting
    let progress = ProgressBar::new(args.repeat.get() as u64)
        .with_message("Rendering frame")
        .with_style(ProgressStyle::with_template(
            "{msg} {pos}/{len} {wide_bar} {elapsed}/~{duration}",
        )?)
        .with_finish(ProgressFinish::AndClear);
    progress.enable_steady_tick(Duration::from_millis(100));

    // Render the frame
    for _ in (0..args.repeat.get()).progress_with(progress) {
        plugin.render(&input, &mut output, args.pivot)?;
    }

    // Save the result and release GPU resources
    save_frame(&output, &args.output)?;
    plugin.global_setdown()?;
    Ok(())
}

/// Load a PNG image into a host frame of a certain pixel format
fn load_frame(path: &Path, format: HostPixelFormat) -> Result<HostFrame<Vec<u8>>> {
    let image =
        image::open(path).wrap_err_with(|| format!("failed to load {}", path.display()))?;
    let (width, height) = (image.width(), image.height());
    let row_bytes = (width as usize * format.bytes_per_pixel()).next_multiple_of(ROW_ALIGNMENT);
    let mut frame = HostFrame::new(
        width,
        height,
        row_bytes,
        format,
        vec![0u8; row_bytes * height as usize],
    )?;
    match format {
        HostPixelFormat::Argb32 => pixels::copy_from_staging(&image.into_rgba8(), &mut frame),
        HostPixelFormat::Argb64 => {
            let rgba = image.into_rgba16().into_raw();
            pixels::copy_from_staging(bytemuck::cast_slice(&rgba), &mut frame)
        }
        HostPixelFormat::Argb128 => {
            let rgba = image.into_rgba32f().into_raw();
            pixels::copy_from_staging(bytemuck::cast_slice(&rgba), &mut frame)
        }
    }
    Ok(frame)
}

/// Save a host frame as a PNG image
///
/// PNG has no floating-point channels, so 32-bit frames are saved with 16-bit
/// channels.
fn save_frame(frame: &HostFrame<Vec<u8>>, path: &Path) -> Result<()> {
    let image = match frame.format() {
        HostPixelFormat::Argb32 => to_image::<u8>(frame).map(DynamicImage::from),
        HostPixelFormat::Argb64 => to_image::<u16>(frame).map(DynamicImage::from),
        HostPixelFormat::Argb128 => to_image::<f32>(frame)
            .map(|image| DynamicImage::from(DynamicImage::from(image).to_rgba16())),
    }
    .ok_or_else(|| eyre!("rendered frame does not match its own dimensions"))?;
    image
        .save(path)
        .wrap_err_with(|| format!("failed to save {}", path.display()))
}

/// Convert a host frame to an RGBA image with the same channel type
fn to_image<P: Primitive + Pod>(frame: &HostFrame<Vec<u8>>) -> Option<ImageBuffer<Rgba<P>, Vec<P>>>
where
    Rgba<P>: Pixel<Subpixel = P>,
{
    let len = frame.width() as usize * frame.height() as usize * 4;
    let mut rgba = vec![P::zeroed(); len];
    pixels::copy_to_staging(frame, bytemuck::cast_slice_mut(&mut rgba));
    ImageBuffer::from_raw(frame.width(), frame.height(), rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_dir_override() {
        let args = Args::parse_from(["render", "-i", "in.png", "-o", "out.png"]);
        assert_eq!(args.resource_dir(), bundled_resource_dir());
        let args = Args::parse_from([
            "render",
            "-i",
            "in.png",
            "-o",
            "out.png",
            "--resource-dir",
            "/opt/kernels",
        ]);
        assert_eq!(args.resource_dir(), Path::new("/opt/kernels"));
    }
}
