//! End-to-end tests on a real Vulkan device, using the bundled kernels
//!
//! Every test is skipped with a warning on hosts without a usable device.

use compute_engine::{
    ComputeEngine, EngineConfig, Error as EngineError, ErrorKind, ImageInfo, PixelFormat,
    UniformParameters, VulkanBackend, VulkanConfig,
};
use log::warn;
use std::{path::Path, sync::Once};
use vkskeleton::{
    resources::{bundled_resource_dir, shader_path},
    Error, HostFrame, HostPixelFormat, Kernel, Plugin,
};

fn init_logger() {
    static INIT_LOGGER: Once = Once::new();
    INIT_LOGGER.call_once(|| env_logger::init());
}

fn test_config(kernel: Kernel) -> EngineConfig {
    let mut config = EngineConfig::new(shader_path(bundled_resource_dir(), kernel));
    config.vulkan = VulkanConfig::with_available_layers();
    config.pipeline_cache = None;
    config
}

/// Set up a plugin, or return `None` if no Vulkan device is available
fn plugin(kernel: Kernel) -> Option<Plugin> {
    init_logger();
    match Plugin::with_config(test_config(kernel)) {
        Ok(plugin) => Some(plugin),
        Err(Error::Engine(EngineError::Context(e))) if e.means_no_vulkan() => {
            warn!("Skipping GPU test: {e}");
            None
        }
        Err(e) => panic!("failed to set up plugin: {e}"),
    }
}

/// Set up a bare engine, or return `None` if no Vulkan device is available
fn engine(kernel: Kernel) -> Option<ComputeEngine<VulkanBackend>> {
    init_logger();
    match ComputeEngine::with_config(test_config(kernel)) {
        Ok(engine) => Some(engine),
        Err(EngineError::Context(e)) if e.means_no_vulkan() => {
            warn!("Skipping GPU test: {e}");
            None
        }
        Err(e) => panic!("failed to set up engine: {e}"),
    }
}

/// Host frame filled with a deterministic pattern of valid pixel values
fn patterned_frame(width: u32, height: u32, format: HostPixelFormat) -> HostFrame<Vec<u8>> {
    let row_bytes = width as usize * format.bytes_per_pixel() + 8;
    let len = row_bytes * height as usize;
    let data = match format {
        HostPixelFormat::Argb128 => (0..len / 4)
            .flat_map(|idx| ((idx % 97) as f32 / 96.0).to_ne_bytes())
            .collect(),
        _ => (0..len).map(|idx| (idx * 13 % 256) as u8).collect(),
    };
    HostFrame::new(width, height, row_bytes, format, data).unwrap()
}

fn blank_frame(width: u32, height: u32, format: HostPixelFormat) -> HostFrame<Vec<u8>> {
    let row_bytes = width as usize * format.bytes_per_pixel();
    HostFrame::new(width, height, row_bytes, format, vec![0; row_bytes * height as usize]).unwrap()
}

#[test]
fn pass_through_preserves_pixels() -> vkskeleton::Result<()> {
    let Some(plugin) = plugin(Kernel::PassThrough) else {
        return Ok(());
    };
    for format in [
        HostPixelFormat::Argb32,
        HostPixelFormat::Argb64,
        HostPixelFormat::Argb128,
    ] {
        for (width, height) in [(1, 1), (7, 3), (64, 48)] {
            let input = patterned_frame(width, height, format);
            let mut output = blank_frame(width, height, format);
            match plugin.render(&input, &mut output, 0.5) {
                Err(Error::Engine(e @ EngineError::UnsupportedFrame { .. })) => {
                    warn!("Skipping unsupported frame: {e}");
                    continue;
                }
                other => other?,
            }
            for y in 0..height {
                assert_eq!(input.row(y), output.row(y), "{format:?} row {y} differs");
            }
        }
    }
    plugin.global_setdown()
}

#[test]
fn kernel_sees_latest_pivot() -> vkskeleton::Result<()> {
    let Some(plugin) = plugin(Kernel::PivotProbe) else {
        return Ok(());
    };
    let input = blank_frame(5, 4, HostPixelFormat::Argb128);
    let mut output = blank_frame(5, 4, HostPixelFormat::Argb128);
    for slider in [0.0, 0.25, 0.75, 0.75, 1.0, 0.5] {
        plugin.render(&input, &mut output, slider)?;
        for word in output.data().chunks_exact(4) {
            let value = f32::from_ne_bytes(word.try_into().unwrap());
            assert_eq!(value, slider as f32);
        }
    }
    plugin.global_setdown()
}

#[test]
fn invert_blends_towards_negative() -> vkskeleton::Result<()> {
    let Some(plugin) = plugin(Kernel::Invert) else {
        return Ok(());
    };
    let format = HostPixelFormat::Argb32;
    let pixel = [200u8, 0, 255, 100];
    let input = HostFrame::new(2, 1, 8, format, [pixel, pixel].concat()).unwrap();
    let mut output = blank_frame(2, 1, format);

    // No pivot leaves colors alone, full pivot negates them
    plugin.render(&input, &mut output, 0.0)?;
    assert_eq!(output.row(0), input.row(0));
    plugin.render(&input, &mut output, 1.0)?;
    assert_eq!(&output.row(0)[..4], &[200, 255, 0, 155]);

    // Half pivot lands halfway, alpha is left alone
    plugin.render(&input, &mut output, 0.5)?;
    let half = &output.row(0)[..4];
    assert_eq!(half[0], 200);
    for &channel in &half[1..] {
        assert!((127..=128).contains(&channel), "{channel} is not halfway");
    }
    plugin.global_setdown()
}

#[test]
fn resources_follow_frame_shape() -> compute_engine::Result<()> {
    let Some(engine) = engine(Kernel::PassThrough) else {
        return Ok(());
    };
    let run = |info: &ImageInfo| -> compute_engine::Result<Vec<u8>> {
        let mut output = Vec::new();
        engine.process(
            info,
            &UniformParameters { pivot: 0.5 },
            |input| input.fill(128),
            |bytes| output.extend_from_slice(bytes),
        )?;
        Ok(output)
    };

    // First call builds resources for the frame shape
    let square = ImageInfo::new(64, 64, PixelFormat::Rgba8).unwrap();
    let output = run(&square)?;
    assert_eq!(output.len(), 16384);
    assert!(output.iter().all(|&byte| byte == 128));
    assert_eq!(engine.current_frame(), Some(square));

    // Same shape keeps them
    assert_eq!(run(&square)?.len(), 16384);
    assert_eq!(engine.current_frame(), Some(square));

    // New shape replaces them
    let wide = ImageInfo::new(128, 64, PixelFormat::Rgba8).unwrap();
    let output = run(&wide)?;
    assert_eq!(output.len(), 32768);
    assert!(output.iter().all(|&byte| byte == 128));
    assert_eq!(engine.current_frame(), Some(wide));

    assert!(!engine.is_poisoned());
    engine.tear_down()
}

#[test]
fn oversized_frame_is_rejected() -> compute_engine::Result<()> {
    let Some(engine) = engine(Kernel::PassThrough) else {
        return Ok(());
    };
    let huge = ImageInfo::new(u32::MAX / 4, 1, PixelFormat::Rgba8).unwrap();
    let result = engine.process(&huge, &UniformParameters::default(), |_| {}, |_| {});
    assert!(matches!(result, Err(EngineError::UnsupportedFrame { .. })));
    assert!(!engine.is_poisoned());
    engine.tear_down()
}

#[test]
fn missing_shader_fails_setup() {
    init_logger();
    let config = EngineConfig {
        vulkan: VulkanConfig::with_available_layers(),
        pipeline_cache: None,
        ..EngineConfig::new(Path::new("/nonexistent/shaders/invert.spv"))
    };
    match ComputeEngine::with_config(config) {
        Err(EngineError::Context(e)) if e.means_no_vulkan() => {
            warn!("Skipping GPU test: {e}");
        }
        Err(e @ EngineError::ShaderFile { .. }) => assert_eq!(e.kind(), ErrorKind::Setup),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("engine set up without a shader"),
    }
}
