//! Backend-erased rendering hardware interface.
//!
//! This crate holds everything both sides of the renderer agree on: resource
//! and sampler descriptions, resource states and barrier masks, shader
//! reflection records, fixed-function pipeline state, descriptor layout
//! records, and the [`Device`] / [`CommandRecorder`] capability traits that
//! concrete backends implement. The render graph (the `vermeil-graph`
//! crate) is written entirely against these types and never names a
//! concrete backend.

pub mod buffer;
pub mod descriptor;
pub mod error;
pub mod format;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
pub mod reflect;
pub mod sync;
pub mod traits;

pub use self::buffer::*;
pub use self::descriptor::*;
pub use self::error::*;
pub use self::format::*;
pub use self::framebuffer::*;
pub use self::image::*;
pub use self::pipeline::*;
pub use self::reflect::*;
pub use self::sync::*;
pub use self::traits::*;

/// Graphics API a backend instance is built on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GraphicsApi {
    Vulkan,
    DirectX12,
}

/// Options consumed by backend instance creation.
#[derive(Clone, Debug)]
pub struct RendererOptions {
    pub graphics_api: GraphicsApi,
    pub application_name: String,
    pub application_version: (u32, u32, u32),
    pub validation_enabled: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        RendererOptions {
            graphics_api: GraphicsApi::Vulkan,
            application_name: String::new(),
            application_version: (0, 1, 0),
            validation_enabled: cfg!(debug_assertions),
        }
    }
}
