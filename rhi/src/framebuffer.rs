//! Render-pass attachment operations.

use smallvec::SmallVec;

/// Value an attachment is cleared to when its load op is `Clear`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LoadOp {
    Load,
    Clear(ClearValue),
    DontCare,
}

impl LoadOp {
    /// Discriminant for structural hashing; the clear value itself does
    /// not affect pipeline compatibility.
    pub fn tag(&self) -> u32 {
        match self {
            LoadOp::Load => 0,
            LoadOp::Clear(_) => 1,
            LoadOp::DontCare => 2,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AttachmentOps {
    pub load: LoadOp,
    pub store: StoreOp,
}

/// Everything the recorder needs to begin a render pass against an
/// already-created framebuffer.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPassBeginInfo {
    pub color_ops: SmallVec<[AttachmentOps; 8]>,
    pub depth_stencil_ops: Option<AttachmentOps>,
    pub width: u32,
    pub height: u32,
}
