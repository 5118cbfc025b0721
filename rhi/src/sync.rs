//! Resource states, barrier masks and CPU-side synchronization.

use crate::image::ImageViewRange;
use crate::traits::{RhiBuffer, RhiImage};
use bitflags::bitflags;
use std::sync::{Condvar, Mutex};

bitflags! {
    /// Pipeline stages referenced by barrier halves.
    pub struct PipelineStageFlags: u32
    {
        const TOP_OF_PIPE                  = 0x0000_0001;
        const VERTEX_INPUT                 = 0x0000_0004;
        const VERTEX_SHADER                = 0x0000_0008;
        const FRAGMENT_SHADER              = 0x0000_0080;
        const EARLY_FRAGMENT_TESTS         = 0x0000_0100;
        const LATE_FRAGMENT_TESTS          = 0x0000_0200;
        const COLOR_ATTACHMENT_OUTPUT      = 0x0000_0400;
        const COMPUTE_SHADER               = 0x0000_0800;
        const TRANSFER                     = 0x0000_1000;
        const BOTTOM_OF_PIPE               = 0x0000_2000;
        const HOST                         = 0x0000_4000;
        const ALL_GRAPHICS                 = 0x0000_8000;
        const ALL_COMMANDS                 = 0x0001_0000;
        const RAY_TRACING_SHADER           = 0x0020_0000;
        const ACCELERATION_STRUCTURE_BUILD = 0x0200_0000;
    }
}

bitflags! {
    /// Memory access kinds referenced by barrier halves.
    pub struct AccessFlags: u32
    {
        const INDEX_READ                     = 0x0000_0002;
        const VERTEX_ATTRIBUTE_READ          = 0x0000_0004;
        const UNIFORM_READ                   = 0x0000_0008;
        const SHADER_READ                    = 0x0000_0020;
        const SHADER_WRITE                   = 0x0000_0040;
        const COLOR_ATTACHMENT_READ          = 0x0000_0080;
        const COLOR_ATTACHMENT_WRITE         = 0x0000_0100;
        const DEPTH_STENCIL_ATTACHMENT_READ  = 0x0000_0200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x0000_0400;
        const TRANSFER_READ                  = 0x0000_0800;
        const TRANSFER_WRITE                 = 0x0000_1000;
        const HOST_READ                      = 0x0000_2000;
        const HOST_WRITE                     = 0x0000_4000;
        const MEMORY_READ                    = 0x0000_8000;
        const MEMORY_WRITE                   = 0x0001_0000;
        const ACCELERATION_STRUCTURE_READ    = 0x0020_0000;
    }
}

bitflags! {
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL  = 0b0001;
        const HOST_VISIBLE  = 0b0010;
        const HOST_COHERENT = 0b0100;
    }
}

/// Layout/usage state a resource can be in between passes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResourceState {
    Undefined,
    /// Read-write shader access (storage image / storage buffer).
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    /// Uniform reads of a constant buffer.
    ConstantBuffer,
    TransferSrc,
    TransferDst,
    Present,
}

impl ResourceState {
    /// Pipeline stages that produce or consume the resource in this state.
    pub fn stage_mask(self) -> PipelineStageFlags {
        match self {
            ResourceState::Undefined => PipelineStageFlags::TOP_OF_PIPE,
            ResourceState::General => {
                PipelineStageFlags::COMPUTE_SHADER | PipelineStageFlags::FRAGMENT_SHADER
            }
            ResourceState::ColorAttachment => PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ResourceState::DepthStencilAttachment => {
                PipelineStageFlags::EARLY_FRAGMENT_TESTS | PipelineStageFlags::LATE_FRAGMENT_TESTS
            }
            ResourceState::ShaderReadOnly | ResourceState::ConstantBuffer => {
                PipelineStageFlags::VERTEX_SHADER
                    | PipelineStageFlags::FRAGMENT_SHADER
                    | PipelineStageFlags::COMPUTE_SHADER
            }
            ResourceState::TransferSrc | ResourceState::TransferDst => PipelineStageFlags::TRANSFER,
            ResourceState::Present => PipelineStageFlags::BOTTOM_OF_PIPE,
        }
    }

    /// Memory accesses performed on the resource in this state.
    pub fn access_mask(self) -> AccessFlags {
        match self {
            ResourceState::Undefined => AccessFlags::empty(),
            ResourceState::General => AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            ResourceState::ColorAttachment => {
                AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            ResourceState::DepthStencilAttachment => {
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            ResourceState::ShaderReadOnly => AccessFlags::SHADER_READ,
            ResourceState::ConstantBuffer => AccessFlags::UNIFORM_READ,
            ResourceState::TransferSrc => AccessFlags::TRANSFER_READ,
            ResourceState::TransferDst => AccessFlags::TRANSFER_WRITE,
            ResourceState::Present => AccessFlags::empty(),
        }
    }

    /// Whether the state implies writes, and therefore hazards against any
    /// following access in the same state.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::General
                | ResourceState::ColorAttachment
                | ResourceState::DepthStencilAttachment
                | ResourceState::TransferDst
        )
    }
}

/// One barrier handed to [`CommandRecorder::pipeline_barrier`].
///
/// [`CommandRecorder::pipeline_barrier`]: crate::traits::CommandRecorder::pipeline_barrier
#[derive(Copy, Clone)]
pub enum BarrierDesc<'a> {
    Image {
        image: &'a dyn RhiImage,
        old_state: ResourceState,
        new_state: ResourceState,
        src_stages: PipelineStageFlags,
        src_access: AccessFlags,
        dst_stages: PipelineStageFlags,
        dst_access: AccessFlags,
        range: ImageViewRange,
    },
    Buffer {
        buffer: &'a dyn RhiBuffer,
        old_state: ResourceState,
        new_state: ResourceState,
        src_stages: PipelineStageFlags,
        src_access: AccessFlags,
        dst_stages: PipelineStageFlags,
        dst_access: AccessFlags,
    },
}

/// Signal-once / wait-many / reset fence for CPU-side coordination with
/// GPU completion. No internal timeout; callers layer timeouts above.
pub struct ThreadFence {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl ThreadFence {
    pub fn new() -> ThreadFence {
        Self::with_signaled(false)
    }

    pub fn with_signaled(signaled: bool) -> ThreadFence {
        ThreadFence {
            signaled: Mutex::new(signaled),
            condvar: Condvar::new(),
        }
    }

    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock().unwrap()
    }

    pub fn signal(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        if *signaled {
            log::warn!("ThreadFence signaled twice without a reset");
        }
        *signaled = true;
        self.condvar.notify_all();
    }

    /// Blocks until the fence is signaled.
    pub fn wait_signaled(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.condvar.wait(signaled).unwrap();
        }
    }

    /// Blocks until the fence is reset.
    pub fn wait_not_signaled(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while *signaled {
            signaled = self.condvar.wait(signaled).unwrap();
        }
    }

    pub fn reset(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        if !*signaled {
            log::warn!("resetting a ThreadFence that was never signaled");
        }
        *signaled = false;
        self.condvar.notify_all();
    }
}

impl Default for ThreadFence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fence_signal_wakes_waiters() {
        let fence = Arc::new(ThreadFence::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let f = fence.clone();
            handles.push(thread::spawn(move || f.wait_signaled()));
        }
        fence.signal();
        for h in handles {
            h.join().unwrap();
        }
        assert!(fence.is_signaled());
        fence.reset();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn write_states() {
        assert!(ResourceState::General.is_write());
        assert!(ResourceState::ColorAttachment.is_write());
        assert!(!ResourceState::ShaderReadOnly.is_write());
        assert!(!ResourceState::ConstantBuffer.is_write());
    }
}
