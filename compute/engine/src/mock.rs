//! In-memory backend that records every device interaction
//!
//! [`MockBackend`] emulates staging buffers, images and the uniform buffer
//! with byte vectors, and runs a software version of a few test kernels on
//! dispatch. A [`MockProbe`] shares its event log and counters, so tests can
//! inspect what the engine did after handing the backend over.

use crate::{layout::Command, Backend, Error, ImageInfo, Result, UniformParameters};
use ash::vk;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, ThreadId},
};

/// Kernel emulated on dispatch
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MockKernel {
    /// Output image is a copy of the input image
    PassThrough,

    /// Every 32-bit word of the output image is the `pivot` parameter
    PivotProbe,
}

/// Device interaction recorded by the mock
#[derive(Clone, Debug, PartialEq)]
pub enum MockEventKind {
    FrameCreated(ImageInfo),
    FrameDestroyed(ImageInfo),
    DescriptorSetUpdated,
    UniformsWritten(UniformParameters),
    InputWritten { bytes: usize },
    Submitted(Command),
    OutputRead { bytes: usize },
}

/// Device interaction along with the thread that caused it
#[derive(Clone, Debug, PartialEq)]
pub struct MockEvent {
    pub thread: ThreadId,
    pub kind: MockEventKind,
}

/// State shared between the backend, its frames and the probe
#[derive(Debug)]
struct Shared {
    events: Mutex<Vec<MockEvent>>,
    frames_created: AtomicUsize,
    frames_alive: AtomicUsize,
    fail_frame_creation: AtomicBool,
    fail_submission: Mutex<Option<Command>>,
    fail_map: AtomicBool,
    max_dimension: AtomicU32,
}
//
impl Shared {
    fn record(&self, kind: MockEventKind) {
        let event = MockEvent {
            thread: thread::current().id(),
            kind,
        };
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Truth that submitting `command` should fail, consuming the failure
    fn take_submission_failure(&self, command: &Command) -> bool {
        let mut fail = self
            .fail_submission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if fail.as_ref() == Some(command) {
            *fail = None;
            true
        } else {
            false
        }
    }

    /// Error reported when mapping a staging buffer, if mapping should fail
    fn map_failure(&self) -> Result<()> {
        if self.fail_map.load(Ordering::Relaxed) {
            Err(Error::Resource {
                operation: "vkMapMemory",
                result: vk::Result::ERROR_MEMORY_MAP_FAILED,
            })
        } else {
            Ok(())
        }
    }
}

/// Handle used by tests to observe and steer a [`MockBackend`]
#[derive(Clone, Debug)]
pub struct MockProbe(Arc<Shared>);
//
impl MockProbe {
    /// Every device interaction so far, in order
    pub fn events(&self) -> Vec<MockEvent> {
        self.0
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds of every device interaction so far, in order
    pub fn event_kinds(&self) -> Vec<MockEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }

    /// Forget about past device interactions
    pub fn clear_events(&self) {
        self.0
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of frame resource groups created so far
    pub fn frames_created(&self) -> usize {
        self.0.frames_created.load(Ordering::Relaxed)
    }

    /// Number of frame resource groups currently alive
    pub fn frames_alive(&self) -> usize {
        self.0.frames_alive.load(Ordering::Relaxed)
    }

    /// Make subsequent frame creations fail like an out-of-memory device
    pub fn fail_frame_creation(&self, fail: bool) {
        self.0.fail_frame_creation.store(fail, Ordering::Relaxed);
    }

    /// Make the next submission of `command` fail like a lost device
    pub fn fail_submission(&self, command: Command) {
        *self
            .0
            .fail_submission
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(command);
    }

    /// Make subsequent staging buffer mappings fail
    pub fn fail_map(&self, fail: bool) {
        self.0.fail_map.store(fail, Ordering::Relaxed);
    }

    /// Largest width or height that the emulated device accepts
    pub fn set_max_dimension(&self, max: u32) {
        self.0.max_dimension.store(max, Ordering::Relaxed);
    }
}

/// Backend that emulates the device in host memory
#[derive(Debug)]
pub struct MockBackend {
    shared: Arc<Shared>,
    kernel: MockKernel,
    uniforms: Vec<u8>,
}
//
impl MockBackend {
    /// Set up a mock backend along with its probe
    pub fn new(kernel: MockKernel) -> (Self, MockProbe) {
        let shared = Arc::new(Shared {
            events: Mutex::new(Vec::new()),
            frames_created: AtomicUsize::new(0),
            frames_alive: AtomicUsize::new(0),
            fail_frame_creation: AtomicBool::new(false),
            fail_submission: Mutex::new(None),
            fail_map: AtomicBool::new(false),
            max_dimension: AtomicU32::new(u32::MAX),
        });
        let backend = Self {
            shared: shared.clone(),
            kernel,
            uniforms: vec![0; UniformParameters::GPU_SIZE],
        };
        (backend, MockProbe(shared))
    }

    /// Value of the pivot parameter, as the kernel would read it
    fn pivot(&self) -> f32 {
        let mut word = [0; 4];
        word.copy_from_slice(&self.uniforms[..4]);
        f32::from_ne_bytes(word)
    }
}
//
impl Backend for MockBackend {
    type Frame = MockFrame;

    fn check_frame(&self, info: &ImageInfo) -> Result<()> {
        let max = self.shared.max_dimension.load(Ordering::Relaxed);
        if info.width() > max || info.height() > max {
            return Err(Error::UnsupportedFrame {
                info: *info,
                reason: format!("dimensions are limited to {max}"),
            });
        }
        Ok(())
    }

    fn create_frame(&mut self, info: &ImageInfo) -> Result<MockFrame> {
        if self.shared.fail_frame_creation.load(Ordering::Relaxed) {
            return Err(Error::Resource {
                operation: "vkAllocateMemory",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }
        self.shared.frames_created.fetch_add(1, Ordering::Relaxed);
        self.shared.frames_alive.fetch_add(1, Ordering::Relaxed);
        self.shared.record(MockEventKind::FrameCreated(*info));
        let size = info.byte_size();
        Ok(MockFrame {
            shared: self.shared.clone(),
            info: *info,
            input_staging: vec![0; size],
            input_image: vec![0; size],
            output_image: vec![0; size],
            output_staging: vec![0; size],
            bound: false,
        })
    }

    fn update_descriptor_set(&mut self, frame: &mut MockFrame) -> Result<()> {
        frame.bound = true;
        self.shared.record(MockEventKind::DescriptorSetUpdated);
        Ok(())
    }

    fn write_uniforms(&mut self, params: &UniformParameters) -> Result<()> {
        self.shared.map_failure()?;
        self.uniforms
            .copy_from_slice(bytemuck::bytes_of(&params.to_gpu()));
        self.shared.record(MockEventKind::UniformsWritten(*params));
        Ok(())
    }

    fn write_input(&mut self, frame: &mut MockFrame, write: impl FnOnce(&mut [u8])) -> Result<()> {
        self.shared.map_failure()?;
        write(&mut frame.input_staging);
        self.shared.record(MockEventKind::InputWritten {
            bytes: frame.input_staging.len(),
        });
        Ok(())
    }

    fn read_output(&mut self, frame: &mut MockFrame, read: impl FnOnce(&[u8])) -> Result<()> {
        self.shared.map_failure()?;
        read(&frame.output_staging);
        self.shared.record(MockEventKind::OutputRead {
            bytes: frame.output_staging.len(),
        });
        Ok(())
    }

    fn submit(&mut self, frame: &mut MockFrame, command: Command) -> Result<()> {
        if self.shared.take_submission_failure(&command) {
            return Err(Error::Submission {
                operation: "vkQueueWaitIdle",
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        self.shared.record(MockEventKind::Submitted(command));
        match command {
            Command::Transition { .. } => {}
            Command::CopyBufferToImage => frame.input_image.copy_from_slice(&frame.input_staging),
            Command::Dispatch { group_count } => {
                assert!(frame.bound, "dispatch before descriptor set update");
                assert_eq!(group_count, frame.info.dispatch_size());
                match self.kernel {
                    MockKernel::PassThrough => {
                        frame.output_image.copy_from_slice(&frame.input_image)
                    }
                    MockKernel::PivotProbe => {
                        let pivot = self.pivot().to_ne_bytes();
                        for word in frame.output_image.chunks_exact_mut(4) {
                            word.copy_from_slice(&pivot);
                        }
                    }
                }
            }
            Command::CopyImageToBuffer => frame.output_staging.copy_from_slice(&frame.output_image),
        }
        Ok(())
    }
}

/// Emulated frame resources
#[derive(Debug)]
pub struct MockFrame {
    shared: Arc<Shared>,
    info: ImageInfo,
    input_staging: Vec<u8>,
    input_image: Vec<u8>,
    output_image: Vec<u8>,
    output_staging: Vec<u8>,
    bound: bool,
}
//
impl Drop for MockFrame {
    fn drop(&mut self) {
        self.shared.frames_alive.fetch_sub(1, Ordering::Relaxed);
        self.shared.record(MockEventKind::FrameDestroyed(self.info));
    }
}
