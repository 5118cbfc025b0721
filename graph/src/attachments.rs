//! Framebuffer attachment declarations.

use crate::handle::ImageViewHandle;
use smallvec::SmallVec;
use vermeil_rhi::{LoadOp, StoreOp};

/// Design-time cap on color attachments per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

#[derive(Copy, Clone, Debug)]
pub struct Attachment {
    pub view: ImageViewHandle,
    pub load: LoadOp,
    pub store: StoreOp,
}

/// The render-target block of a raster pass: an ordered list of color
/// render-target views plus an optional depth-stencil view. Dimensions are
/// derived from the first attachment's (mip-adjusted) extent at compile
/// time; every other attachment must match.
#[derive(Clone, Debug, Default)]
pub struct FramebufferAttachments {
    pub(crate) color: SmallVec<[Attachment; MAX_COLOR_ATTACHMENTS]>,
    pub(crate) depth_stencil: Option<Attachment>,
}

impl FramebufferAttachments {
    pub fn new() -> FramebufferAttachments {
        Default::default()
    }

    pub fn color(mut self, view: ImageViewHandle, load: LoadOp, store: StoreOp) -> Self {
        self.color.push(Attachment { view, load, store });
        self
    }

    pub fn depth_stencil(mut self, view: ImageViewHandle, load: LoadOp, store: StoreOp) -> Self {
        self.depth_stencil = Some(Attachment { view, load, store });
        self
    }

    pub fn color_attachments(&self) -> &[Attachment] {
        &self.color
    }

    pub fn depth_stencil_attachment(&self) -> Option<&Attachment> {
        self.depth_stencil.as_ref()
    }
}
