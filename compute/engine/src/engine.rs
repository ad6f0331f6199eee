//! Frame processing orchestration

use crate::{
    layout::{Command, FrameLayouts, ImageLayout, ImageRole},
    Backend, EngineConfig, Error, ImageInfo, Result, UniformParameters, VulkanBackend,
};
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{
    mem,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

/// GPU compute engine
///
/// Owns a [`Backend`] and the resources of the most recent frame shape.
/// [`process()`](Self::process) calls are serialized by an internal lock that
/// is held for their full duration, so only one frame is ever in flight.
///
/// A call that fails after taking the lock poisons the engine: every later
/// call fails with [`Error::Poisoned`] until the engine is torn down and a
/// new one is set up. Frames that the device cannot handle at all are the
/// exception, they are rejected before any resource is touched.
pub struct ComputeEngine<B: Backend = VulkanBackend> {
    state: Mutex<EngineState<B>>,
}
//
impl ComputeEngine<VulkanBackend> {
    /// Set up a Vulkan engine that runs the compiled kernel at `shader_path`,
    /// with default settings
    pub fn set_up(shader_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(EngineConfig::new(shader_path))
    }

    /// Set up a Vulkan engine with a custom configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Ok(Self::with_backend(VulkanBackend::new(config)?))
    }
}
//
impl<B: Backend> ComputeEngine<B> {
    /// Wrap an already set up backend
    pub fn with_backend(backend: B) -> Self {
        Self {
            state: Mutex::new(EngineState::Ready(Core {
                frame: None,
                backend,
            })),
        }
    }

    /// Run the kernel over one frame
    ///
    /// `write` receives the input staging buffer and must fill it with
    /// `info.byte_size()` bytes of tightly packed pixels. Once the kernel has
    /// run, `read` receives the output staging buffer, which has the same
    /// size. Neither slice may escape its callback.
    ///
    /// If `info` differs from the shape of the previous frame, the resources
    /// of the previous frame shape are released before new ones are created.
    pub fn process(
        &self,
        info: &ImageInfo,
        params: &UniformParameters,
        write: impl FnOnce(&mut [u8]),
        read: impl FnOnce(&[u8]),
    ) -> Result<()> {
        let mut state = self.lock();
        let result = match &mut *state {
            EngineState::Ready(core) => core.process(info, params, write, read),
            EngineState::Poisoned { reason, .. } => return Err(Error::Poisoned(reason.clone())),
            EngineState::TornDown => return Err(Error::TornDown),
        };
        match &result {
            Err(e @ Error::UnsupportedFrame { .. }) => warn!("Rejected frame: {e}"),
            Err(e) => {
                error!("Failed to process {info} frame, engine is now unusable: {e}");
                state.poison(e.to_string());
            }
            Ok(()) => {}
        }
        result
    }

    /// Release every device resource
    ///
    /// Frame resources go first, then the backend's own resources in reverse
    /// creation order. Fails if the engine was already torn down.
    pub fn tear_down(&self) -> Result<()> {
        let mut state = self.lock();
        match mem::replace(&mut *state, EngineState::TornDown) {
            EngineState::Ready(core) | EngineState::Poisoned { core, .. } => {
                info!("Tearing down compute engine");
                drop(core);
                Ok(())
            }
            EngineState::TornDown => Err(Error::TornDown),
        }
    }

    /// Truth that a failed call left the engine unusable
    pub fn is_poisoned(&self) -> bool {
        matches!(*self.lock(), EngineState::Poisoned { .. })
    }

    /// Shape of the frames that the current resources were built for
    pub fn current_frame(&self) -> Option<ImageInfo> {
        match &*self.lock() {
            EngineState::Ready(core) | EngineState::Poisoned { core, .. } => {
                core.frame.as_ref().map(|slot| slot.info)
            }
            EngineState::TornDown => None,
        }
    }

    /// Acquire the engine lock
    ///
    /// A panic in a previous call, e.g. in a pixel callback, may have left the
    /// device halfway through a frame, so it poisons the engine.
    fn lock(&self) -> MutexGuard<'_, EngineState<B>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            let mut state = poisoned.into_inner();
            state.poison("a previous call panicked".to_owned());
            state
        })
    }
}

/// Lifecycle of the engine
enum EngineState<B: Backend> {
    /// Ready to process frames
    Ready(Core<B>),

    /// A call failed, resources are only kept around to be torn down
    Poisoned { core: Core<B>, reason: String },

    /// All resources have been released
    TornDown,
}
//
impl<B: Backend> EngineState<B> {
    /// Mark a ready engine as unusable
    fn poison(&mut self, reason: String) {
        *self = match mem::replace(self, Self::TornDown) {
            Self::Ready(core) => Self::Poisoned { core, reason },
            other => other,
        };
    }
}

/// Backend and current frame resources
///
/// The frame is declared first so that it is released before the backend.
struct Core<B: Backend> {
    frame: Option<FrameSlot<B::Frame>>,
    backend: B,
}
//
impl<B: Backend> Core<B> {
    /// Process one frame, see [`ComputeEngine::process()`]
    fn process(
        &mut self,
        info: &ImageInfo,
        params: &UniformParameters,
        write: impl FnOnce(&mut [u8]),
        read: impl FnOnce(&[u8]),
    ) -> Result<()> {
        let backend = &mut self.backend;
        let slot = regenerate(backend, &mut self.frame, info)?;
        trace!("Processing {info} frame with {params:?}");

        backend.write_uniforms(params)?;
        backend.write_input(&mut slot.resources, write)?;

        slot.transition(backend, ImageRole::Input, ImageLayout::TransferDst)?;
        slot.submit(backend, Command::CopyBufferToImage)?;
        slot.transition(backend, ImageRole::Input, ImageLayout::ShaderReadOnly)?;

        slot.submit(
            backend,
            Command::Dispatch {
                group_count: info.dispatch_size(),
            },
        )?;

        slot.transition(backend, ImageRole::Output, ImageLayout::TransferSrc)?;
        slot.submit(backend, Command::CopyImageToBuffer)?;
        slot.transition(backend, ImageRole::Output, ImageLayout::General)?;

        backend.read_output(&mut slot.resources, read)
    }
}

/// Make sure that `frame` holds resources for `info`-shaped frames
///
/// Old resources are released before new ones are allocated, so that both
/// never coexist in device memory. If creation fails, no frame resources are
/// left at all.
fn regenerate<'frame, B: Backend>(
    backend: &mut B,
    frame: &'frame mut Option<FrameSlot<B::Frame>>,
    info: &ImageInfo,
) -> Result<&'frame mut FrameSlot<B::Frame>> {
    let reuse = frame.as_ref().is_some_and(|slot| slot.info == *info);
    if !reuse {
        backend.check_frame(info)?;
    }
    let slot = match frame.take() {
        Some(slot) if reuse => slot,
        old => {
            if let Some(old) = old {
                debug!("Releasing GPU resources of {} frames", old.info);
                drop(old);
            }
            info!("Allocating GPU resources for {info} frames");
            let mut resources = backend.create_frame(info)?;
            backend.update_descriptor_set(&mut resources)?;
            let mut slot = FrameSlot {
                info: *info,
                layouts: FrameLayouts::new(),
                resources,
            };
            for image in [ImageRole::Input, ImageRole::Output] {
                slot.transition(backend, image, image.resting_layout())?;
            }
            slot
        }
    };
    Ok(frame.insert(slot))
}

/// Frame resources along with the shape they were built for and the layout
/// of their images
struct FrameSlot<F> {
    info: ImageInfo,
    layouts: FrameLayouts,
    resources: F,
}
//
impl<F> FrameSlot<F> {
    /// Submit a command, after checking that image layouts allow it
    fn submit<B: Backend<Frame = F>>(&mut self, backend: &mut B, command: Command) -> Result<()> {
        self.layouts.check(&command)?;
        trace!("Submitting {command:?}");
        backend.submit(&mut self.resources, command)?;
        self.layouts.apply(&command);
        Ok(())
    }

    /// Move an image to another layout
    fn transition<B: Backend<Frame = F>>(
        &mut self,
        backend: &mut B,
        image: ImageRole,
        to: ImageLayout,
    ) -> Result<()> {
        let command = self.layouts.transition_to(image, to);
        self.submit(backend, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockBackend, MockEventKind, MockKernel, MockProbe},
        ErrorKind, PixelFormat,
    };
    use std::{sync::Once, thread, time::Duration};

    fn init_logger() {
        static INIT_LOGGER: Once = Once::new();
        INIT_LOGGER.call_once(|| env_logger::init());
    }

    fn mock_engine(kernel: MockKernel) -> (ComputeEngine<MockBackend>, MockProbe) {
        init_logger();
        let (backend, probe) = MockBackend::new(kernel);
        (ComputeEngine::with_backend(backend), probe)
    }

    fn info(width: u32, height: u32) -> ImageInfo {
        ImageInfo::new(width, height, PixelFormat::Rgba8).unwrap()
    }

    /// Run one frame where the input is filled with `fill`, return the output
    fn run(
        engine: &ComputeEngine<MockBackend>,
        info: &ImageInfo,
        pivot: f32,
        fill: u8,
    ) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        engine.process(
            info,
            &UniformParameters { pivot },
            |input| input.fill(fill),
            |bytes| output.extend_from_slice(bytes),
        )?;
        Ok(output)
    }

    fn count(probe: &MockProbe, pred: impl Fn(&MockEventKind) -> bool) -> usize {
        probe.event_kinds().iter().filter(|kind| pred(kind)).count()
    }

    #[test]
    fn scenarios_first_same_then_resized() -> Result<()> {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);

        // First call allocates resources
        let square = info(64, 64);
        let output = run(&engine, &square, 0.5, 128)?;
        assert_eq!(output.len(), 16384);
        assert!(output.iter().all(|&byte| byte == 128));
        assert_eq!(probe.frames_created(), 1);
        let dispatches = probe
            .event_kinds()
            .into_iter()
            .filter_map(|kind| match kind {
                MockEventKind::Submitted(Command::Dispatch { group_count }) => Some(group_count),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(dispatches, [[64, 64, 1]]);

        // Same shape reuses them
        let output = run(&engine, &square, 0.5, 7)?;
        assert_eq!(output.len(), 16384);
        assert_eq!(probe.frames_created(), 1);

        // New shape replaces them
        let wide = info(128, 64);
        let output = run(&engine, &wide, 0.5, 9)?;
        assert_eq!(output.len(), 32768);
        assert_eq!(probe.frames_created(), 2);
        assert_eq!(probe.frames_alive(), 1);
        assert_eq!(engine.current_frame(), Some(wide));
        Ok(())
    }

    #[test]
    fn regenerates_iff_shape_changes() -> Result<()> {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        let shapes = [
            ImageInfo::new(8, 8, PixelFormat::Rgba8).unwrap(),
            ImageInfo::new(8, 8, PixelFormat::Rgba8).unwrap(),
            ImageInfo::new(8, 8, PixelFormat::Rgba16).unwrap(),
            ImageInfo::new(8, 8, PixelFormat::Rgba16).unwrap(),
            ImageInfo::new(8, 9, PixelFormat::Rgba16).unwrap(),
            ImageInfo::new(9, 9, PixelFormat::Rgba16).unwrap(),
            ImageInfo::new(9, 9, PixelFormat::Rgba32Float).unwrap(),
            ImageInfo::new(9, 9, PixelFormat::Rgba32Float).unwrap(),
            ImageInfo::new(9, 9, PixelFormat::Rgba32Float).unwrap(),
            ImageInfo::new(8, 8, PixelFormat::Rgba8).unwrap(),
        ];
        let mut previous = None;
        let mut expected_creations = 0;
        for shape in shapes {
            if previous != Some(shape) {
                expected_creations += 1;
            }
            run(&engine, &shape, 0.0, 1)?;
            assert_eq!(probe.frames_created(), expected_creations);
            assert_eq!(probe.frames_alive(), 1);
            previous = Some(shape);
        }
        assert_eq!(
            count(&probe, |kind| matches!(kind, MockEventKind::DescriptorSetUpdated)),
            expected_creations
        );
        Ok(())
    }

    #[test]
    fn callbacks_see_exact_byte_size() -> Result<()> {
        let (engine, _probe) = mock_engine(MockKernel::PassThrough);
        for format in PixelFormat::ALL {
            for (width, height) in [(1, 1), (3, 5), (17, 2), (64, 64)] {
                let info = ImageInfo::new(width, height, format).unwrap();
                let (mut written, mut read) = (0, 0);
                engine.process(
                    &info,
                    &UniformParameters::default(),
                    |input| written = input.len(),
                    |output| read = output.len(),
                )?;
                let expected = width as usize * height as usize * format.bytes_per_pixel();
                assert_eq!((written, read), (expected, expected));
            }
        }
        Ok(())
    }

    #[test]
    fn pass_through_round_trip() -> Result<()> {
        let (engine, _probe) = mock_engine(MockKernel::PassThrough);
        let info = ImageInfo::new(13, 7, PixelFormat::Rgba16).unwrap();
        let pattern = (0..info.byte_size())
            .map(|idx| (idx * 31 % 251) as u8)
            .collect::<Vec<_>>();
        let mut output = Vec::new();
        engine.process(
            &info,
            &UniformParameters { pivot: 0.3 },
            |input| input.copy_from_slice(&pattern),
            |bytes| output.extend_from_slice(bytes),
        )?;
        assert_eq!(output, pattern);
        Ok(())
    }

    #[test]
    fn kernel_sees_latest_uniforms() -> Result<()> {
        let (engine, _probe) = mock_engine(MockKernel::PivotProbe);
        let info = ImageInfo::new(4, 4, PixelFormat::Rgba32Float).unwrap();
        for pivot in [0.0, 0.25, 1.0, 0.5, 0.5, 0.75] {
            let output = run(&engine, &info, pivot, 0)?;
            assert!(output
                .chunks_exact(4)
                .all(|word| word == pivot.to_ne_bytes()));
        }
        Ok(())
    }

    #[test]
    fn command_sequence() -> Result<()> {
        use ImageLayout::*;
        use ImageRole::*;
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        let info = info(2, 3);
        run(&engine, &info, 0.5, 0)?;

        let transition =
            |image, from, to| MockEventKind::Submitted(Command::Transition { image, from, to });
        let frame_steps = [
            MockEventKind::UniformsWritten(UniformParameters { pivot: 0.5 }),
            MockEventKind::InputWritten { bytes: 24 },
            transition(Input, ShaderReadOnly, TransferDst),
            MockEventKind::Submitted(Command::CopyBufferToImage),
            transition(Input, TransferDst, ShaderReadOnly),
            MockEventKind::Submitted(Command::Dispatch {
                group_count: [2, 3, 1],
            }),
            transition(Output, General, TransferSrc),
            MockEventKind::Submitted(Command::CopyImageToBuffer),
            transition(Output, TransferSrc, General),
            MockEventKind::OutputRead { bytes: 24 },
        ];
        let mut expected = vec![
            MockEventKind::FrameCreated(info),
            MockEventKind::DescriptorSetUpdated,
            transition(Input, Undefined, ShaderReadOnly),
            transition(Output, Undefined, General),
        ];
        expected.extend(frame_steps.iter().cloned());
        assert_eq!(probe.event_kinds(), expected);

        probe.clear_events();
        run(&engine, &info, 0.5, 0)?;
        assert_eq!(probe.event_kinds(), frame_steps);
        Ok(())
    }

    #[test]
    fn old_resources_released_before_new_ones() -> Result<()> {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        let (small, large) = (info(4, 4), info(8, 8));
        run(&engine, &small, 0.0, 0)?;
        probe.clear_events();
        run(&engine, &large, 0.0, 0)?;
        let kinds = probe.event_kinds();
        assert_eq!(kinds[0], MockEventKind::FrameDestroyed(small));
        assert_eq!(kinds[1], MockEventKind::FrameCreated(large));
        Ok(())
    }

    #[test]
    fn calls_never_interleave() {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        let shapes = [info(4, 4), info(8, 4)];
        thread::scope(|scope| {
            for worker in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    for call in 0..10 {
                        let shape = &shapes[(worker + call) % shapes.len()];
                        engine
                            .process(
                                shape,
                                &UniformParameters::default(),
                                |input| {
                                    thread::sleep(Duration::from_micros(100));
                                    input.fill(worker as u8);
                                },
                                |output| {
                                    thread::sleep(Duration::from_micros(100));
                                    assert!(output.iter().all(|&byte| byte == worker as u8));
                                },
                            )
                            .unwrap();
                    }
                });
            }
        });

        // Every call is a contiguous run of events from a single thread,
        // starting with an optional regeneration and ending with a readback
        let events = probe.events();
        let mut calls = 0;
        let mut current = None;
        for event in &events {
            match current {
                None => current = Some(event.thread),
                Some(thread) => assert_eq!(thread, event.thread, "interleaved calls"),
            }
            if let MockEventKind::OutputRead { .. } = event.kind {
                calls += 1;
                current = None;
            }
        }
        assert_eq!(calls, 40);
        assert!(current.is_none());
    }

    #[test]
    fn failed_regeneration_poisons() -> Result<()> {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        run(&engine, &info(4, 4), 0.0, 0)?;

        probe.fail_frame_creation(true);
        let err = run(&engine, &info(8, 8), 0.0, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(engine.is_poisoned());
        assert_eq!(probe.frames_alive(), 0);
        assert_eq!(engine.current_frame(), None);

        // Even a call that would not need new resources is refused
        probe.fail_frame_creation(false);
        assert!(matches!(
            run(&engine, &info(4, 4), 0.0, 0),
            Err(Error::Poisoned(_))
        ));
        assert_eq!(probe.frames_created(), 1);

        engine.tear_down()?;
        assert!(!engine.is_poisoned());
        Ok(())
    }

    #[test]
    fn panicking_callback_poisons() {
        let (engine, _probe) = mock_engine(MockKernel::PassThrough);
        let shape = info(4, 4);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.process(
                &shape,
                &UniformParameters::default(),
                |_| panic!("host failed to provide pixels"),
                |_| {},
            )
        }));
        assert!(outcome.is_err());
        assert!(engine.is_poisoned());
        assert!(matches!(
            run(&engine, &shape, 0.0, 0),
            Err(Error::Poisoned(_))
        ));
    }

    #[test]
    fn failed_submission_poisons() -> Result<()> {
        use ImageLayout::*;
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        let shape = info(4, 4);
        run(&engine, &shape, 0.0, 0)?;
        probe.clear_events();

        probe.fail_submission(Command::CopyImageToBuffer);
        let mut read_called = false;
        let err = engine
            .process(
                &shape,
                &UniformParameters::default(),
                |input| input.fill(1),
                |_| read_called = true,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Submission);
        assert!(!read_called);
        assert!(engine.is_poisoned());

        // Nothing was submitted after the failed command
        assert_eq!(
            probe.event_kinds().last(),
            Some(&MockEventKind::Submitted(Command::Transition {
                image: ImageRole::Output,
                from: General,
                to: TransferSrc,
            }))
        );

        assert!(matches!(
            run(&engine, &shape, 0.0, 0),
            Err(Error::Poisoned(_))
        ));
        engine.tear_down()?;
        assert_eq!(probe.frames_alive(), 0);
        Ok(())
    }

    #[test]
    fn failed_mapping_poisons() {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        probe.fail_map(true);
        let (mut write_called, mut read_called) = (false, false);
        let err = engine
            .process(
                &info(4, 4),
                &UniformParameters::default(),
                |_| write_called = true,
                |_| read_called = true,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(!write_called);
        assert!(!read_called);
        assert!(engine.is_poisoned());

        probe.fail_map(false);
        assert!(matches!(
            run(&engine, &info(4, 4), 0.0, 0),
            Err(Error::Poisoned(_))
        ));
    }

    #[test]
    fn unsupported_frame_keeps_resources() -> Result<()> {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        probe.set_max_dimension(16);
        run(&engine, &info(16, 16), 0.0, 0)?;
        let err = run(&engine, &info(32, 16), 0.0, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFrame { .. }));
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(probe.frames_alive(), 1);
        assert!(!probe
            .event_kinds()
            .iter()
            .any(|kind| matches!(kind, MockEventKind::FrameDestroyed(_))));

        // The engine is still usable with the previous resources
        assert!(!engine.is_poisoned());
        run(&engine, &info(16, 16), 0.0, 0)?;
        assert_eq!(probe.frames_created(), 1);
        Ok(())
    }

    #[test]
    fn tear_down_is_terminal() -> Result<()> {
        let (engine, probe) = mock_engine(MockKernel::PassThrough);
        run(&engine, &info(4, 4), 0.0, 0)?;
        engine.tear_down()?;
        assert_eq!(probe.frames_alive(), 0);
        assert!(matches!(engine.tear_down(), Err(Error::TornDown)));
        assert!(matches!(
            run(&engine, &info(4, 4), 0.0, 0),
            Err(Error::TornDown)
        ));
        assert_eq!(engine.current_frame(), None);
        Ok(())
    }
}
