//! Image layout tracking and the device commands that depend on it
//!
//! Each frame owns two device images. The input image rests in
//! [`ImageLayout::ShaderReadOnly`] so that the kernel can sample it, and only
//! visits [`ImageLayout::TransferDst`] while pixels are copied into it. The
//! output image rests in [`ImageLayout::General`] so that the kernel can write
//! it, and only visits [`ImageLayout::TransferSrc`] while pixels are copied
//! out of it. Freshly created images start in [`ImageLayout::Undefined`].
//!
//! [`FrameLayouts`] mirrors the layout of both images on the host, refuses
//! any command that the current layouts do not allow, and is only updated
//! once the command has been executed.

use crate::{Error, Result};

/// Which of the two frame images a command refers to
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ImageRole {
    /// Image that the kernel samples from
    Input,

    /// Image that the kernel writes to
    Output,
}
//
impl ImageRole {
    /// Layout in which the image sits between frame processing steps
    pub const fn resting_layout(self) -> ImageLayout {
        match self {
            Self::Input => ImageLayout::ShaderReadOnly,
            Self::Output => ImageLayout::General,
        }
    }

    /// Layout in which the image is copied to or from a staging buffer
    pub const fn transfer_layout(self) -> ImageLayout {
        match self {
            Self::Input => ImageLayout::TransferDst,
            Self::Output => ImageLayout::TransferSrc,
        }
    }

    /// Truth that this image may go from layout `from` to layout `to`
    pub fn allows_transition(self, from: ImageLayout, to: ImageLayout) -> bool {
        let (resting, transfer) = (self.resting_layout(), self.transfer_layout());
        (from == ImageLayout::Undefined && to == resting)
            || (from == resting && to == transfer)
            || (from == transfer && to == resting)
    }
}

/// Subset of Vulkan image layouts used by the engine
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ImageLayout {
    Undefined,
    ShaderReadOnly,
    General,
    TransferDst,
    TransferSrc,
}

/// Device-side step of frame processing
///
/// Each command is recorded into its own command buffer, submitted, and
/// waited for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Move an image to another layout
    Transition {
        image: ImageRole,
        from: ImageLayout,
        to: ImageLayout,
    },

    /// Copy the input staging buffer into the input image
    CopyBufferToImage,

    /// Run the kernel over a grid of work-groups
    Dispatch { group_count: [u32; 3] },

    /// Copy the output image into the output staging buffer
    CopyImageToBuffer,
}

/// Host-side record of the layout of both frame images
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameLayouts {
    input: ImageLayout,
    output: ImageLayout,
}
//
impl FrameLayouts {
    /// Layouts of freshly created images
    pub const fn new() -> Self {
        Self {
            input: ImageLayout::Undefined,
            output: ImageLayout::Undefined,
        }
    }

    /// Current layout of an image
    pub const fn get(&self, image: ImageRole) -> ImageLayout {
        match image {
            ImageRole::Input => self.input,
            ImageRole::Output => self.output,
        }
    }

    /// Command that moves `image` from its current layout to `to`
    pub fn transition_to(&self, image: ImageRole, to: ImageLayout) -> Command {
        Command::Transition {
            image,
            from: self.get(image),
            to,
        }
    }

    /// Check that `command` can be executed given the current layouts
    pub fn check(&self, command: &Command) -> Result<()> {
        match *command {
            Command::Transition { image, from, to } => {
                self.require(image, from)?;
                if image.allows_transition(from, to) {
                    Ok(())
                } else {
                    Err(Error::Layout {
                        image,
                        expected: Self::expected_before(image, to),
                        actual: from,
                    })
                }
            }
            Command::CopyBufferToImage => self.require(ImageRole::Input, ImageLayout::TransferDst),
            Command::Dispatch { .. } => {
                self.require(ImageRole::Input, ImageLayout::ShaderReadOnly)?;
                self.require(ImageRole::Output, ImageLayout::General)
            }
            Command::CopyImageToBuffer => self.require(ImageRole::Output, ImageLayout::TransferSrc),
        }
    }

    /// Record the effect of a command that was executed successfully
    pub fn apply(&mut self, command: &Command) {
        if let Command::Transition { image, to, .. } = *command {
            match image {
                ImageRole::Input => self.input = to,
                ImageRole::Output => self.output = to,
            }
        }
    }

    /// Check that an image is in a certain layout
    fn require(&self, image: ImageRole, expected: ImageLayout) -> Result<()> {
        let actual = self.get(image);
        if actual == expected {
            Ok(())
        } else {
            Err(Error::Layout {
                image,
                expected,
                actual,
            })
        }
    }

    /// Layout that an image must be in before it can go to layout `to`
    fn expected_before(image: ImageRole, to: ImageLayout) -> ImageLayout {
        if to == image.transfer_layout() {
            image.resting_layout()
        } else {
            image.transfer_layout()
        }
    }
}
//
impl Default for FrameLayouts {
    fn default() -> Self {
        Self::new()
    }
}
